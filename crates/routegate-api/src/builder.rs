//! Explicit route registration
//!
//! Each route is declared with its path, its method set and the
//! capabilities it needs. The builder records that metadata and forwards
//! the handler to the axum router with the matching layers applied.

use axum::{
    Json, Router,
    handler::Handler,
    http::Method,
    middleware,
    routing::{MethodFilter, MethodRouter, get},
};
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use thiserror::Error;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::trace::TraceLayer;
use tracing::{debug, info};

use crate::auth::require_basic_auth;
use crate::rate_limit::{RateLimit, RouteLimiter, enforce_rate_limit};
use crate::routes;
use crate::state::{AppState, MetricsHandle};

#[derive(Error, Debug)]
pub enum BuilderError {
    #[error("Route path cannot be empty")]
    EmptyPath,

    #[error("Route {0} has no HTTP methods")]
    NoMethods(String),

    #[error("Unsupported HTTP method: {0}")]
    UnsupportedMethod(String),

    #[error("Route {0} is reserved by the builder")]
    ReservedPath(String),

    #[error("Route {method} {path} is already registered")]
    DuplicateRoute { method: Method, path: String },

    #[error("Invalid rate limit: {0}")]
    RateLimit(#[from] crate::rate_limit::RateLimitParseError),
}

/// API-wide settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiConfig {
    pub title: String,
    /// When set, every route uses `methods_default` regardless of what it declares
    pub methods_automatic: bool,
    pub methods_default: Vec<Method>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            title: "Routegate API".to_string(),
            methods_automatic: true,
            methods_default: vec![Method::GET],
        }
    }
}

/// Something a route requires beyond its handler
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Capability {
    RequiresAuth,
    RateLimited(RateLimit),
}

/// Declaration of a route before registration
#[derive(Debug, Clone)]
pub struct RouteSpec {
    path: String,
    methods: Option<Vec<Method>>,
    capabilities: Vec<Capability>,
}

impl RouteSpec {
    /// Declare a route; a missing leading `/` is added
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            methods: None,
            capabilities: Vec::new(),
        }
    }

    pub fn methods(mut self, methods: impl IntoIterator<Item = Method>) -> Self {
        self.methods = Some(methods.into_iter().collect());
        self
    }

    pub fn requires_auth(mut self) -> Self {
        self.capabilities.push(Capability::RequiresAuth);
        self
    }

    pub fn rate_limit(mut self, limit: RateLimit) -> Self {
        self.capabilities.push(Capability::RateLimited(limit));
        self
    }
}

/// Metadata recorded for a registered route
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteInfo {
    pub path: String,
    pub methods: Vec<Method>,
    pub capabilities: Vec<Capability>,
}

impl RouteInfo {
    pub fn requires_auth(&self) -> bool {
        self.capabilities.contains(&Capability::RequiresAuth)
    }

    pub fn rate_limit(&self) -> Option<RateLimit> {
        self.capabilities.iter().find_map(|c| match c {
            Capability::RateLimited(limit) => Some(*limit),
            Capability::RequiresAuth => None,
        })
    }
}

/// Paths served by the builder itself
const RESERVED_PATHS: &[&str] = &["/health", "/healthz", "/metrics"];

fn normalize_path(path: &str) -> Result<String, BuilderError> {
    let path = path.trim();
    if path.is_empty() {
        return Err(BuilderError::EmptyPath);
    }
    Ok(format!("/{}", path.trim_start_matches('/')))
}

/// Builds the application router from explicitly registered routes
pub struct ApiBuilder {
    state: AppState,
    config: ApiConfig,
    routes: Vec<RouteInfo>,
    router: Router<AppState>,
    metrics: Option<Arc<MetricsHandle>>,
}

impl ApiBuilder {
    pub fn new(state: AppState) -> Self {
        Self {
            state,
            config: ApiConfig::default(),
            routes: Vec::new(),
            router: Router::new(),
            metrics: None,
        }
    }

    /// Replace the API-wide settings
    ///
    /// Method defaults apply to routes registered afterwards; the title is
    /// read when the router is built.
    pub fn configure_api(&mut self, config: ApiConfig) -> &mut Self {
        debug!("Configuring API: {:?}", config);
        self.config = config;
        self
    }

    pub fn config(&self) -> &ApiConfig {
        &self.config
    }

    /// Expose Prometheus metrics at `/metrics`
    pub fn with_metrics(&mut self, handle: Arc<MetricsHandle>) -> &mut Self {
        self.metrics = Some(handle);
        self
    }

    /// Register `handler` under the route described by `spec`
    pub fn api_route<H, T>(&mut self, spec: RouteSpec, handler: H) -> Result<&RouteInfo, BuilderError>
    where
        H: Handler<T, AppState>,
        T: 'static,
    {
        let path = normalize_path(&spec.path)?;
        if RESERVED_PATHS.contains(&path.as_str()) {
            return Err(BuilderError::ReservedPath(path));
        }

        let methods = match spec.methods {
            Some(methods) if !self.config.methods_automatic => methods,
            _ => self.config.methods_default.clone(),
        };
        if methods.is_empty() {
            return Err(BuilderError::NoMethods(path));
        }

        let mut filter: Option<MethodFilter> = None;
        for method in &methods {
            if self.is_registered(&path, method) {
                return Err(BuilderError::DuplicateRoute {
                    method: method.clone(),
                    path,
                });
            }
            let next = MethodFilter::try_from(method.clone())
                .map_err(|_| BuilderError::UnsupportedMethod(method.to_string()))?;
            filter = Some(filter.map_or(next, |f| f.or(next)));
        }
        let Some(filter) = filter else {
            return Err(BuilderError::NoMethods(path));
        };

        let mut method_router: MethodRouter<AppState> = MethodRouter::new().on(filter, handler);

        // Layers wrap in reverse order: rate limiting runs before auth
        if spec.capabilities.contains(&Capability::RequiresAuth) {
            method_router = method_router.route_layer(middleware::from_fn_with_state(
                self.state.credentials.clone(),
                require_basic_auth,
            ));
        }
        for capability in &spec.capabilities {
            if let Capability::RateLimited(limit) = capability {
                method_router = method_router.route_layer(middleware::from_fn_with_state(
                    RouteLimiter::new(*limit),
                    enforce_rate_limit,
                ));
            }
        }

        self.router = std::mem::take(&mut self.router).route(&path, method_router);

        info!(
            "Registered route {} {:?} {:?}",
            path, methods, spec.capabilities
        );
        self.routes.push(RouteInfo {
            path,
            methods,
            capabilities: spec.capabilities,
        });

        let last = self.routes.len() - 1;
        Ok(&self.routes[last])
    }

    /// Routes registered so far, in registration order
    pub fn routes(&self) -> &[RouteInfo] {
        &self.routes
    }

    fn is_registered(&self, path: &str, method: &Method) -> bool {
        self.routes
            .iter()
            .any(|r| r.path == path && r.methods.contains(method))
    }

    /// Produce the final router
    ///
    /// Adds the welcome route at `/` (unless one was registered), health
    /// checks, the JSON 404 and 405 fallbacks, panic recovery and request
    /// tracing.
    pub fn build(self) -> Router {
        let mut router = self.router.merge(routes::health::routes());

        if !self.routes.iter().any(|r| r.path == "/" && r.methods.contains(&Method::GET)) {
            let welcome = json!({
                "Hello": format!("Welcome to the {} API!", self.config.title)
            });
            router = router.route(
                "/",
                get(move || {
                    let welcome = welcome.clone();
                    async move { Json(welcome) }
                }),
            );
        }

        let mut router = router.fallback(routes::not_found).with_state(self.state);

        if let Some(handle) = self.metrics {
            router = router.merge(routes::metrics::routes(handle));
        }

        // Must follow every merge; it only reaches routes already present
        router
            .method_not_allowed_fallback(routes::method_not_allowed)
            .layer(CatchPanicLayer::custom(routes::handle_panic))
            .layer(TraceLayer::new_for_http())
    }

    /// Serve the API on `addr` until Ctrl-C
    pub async fn run(self, addr: SocketAddr) -> std::io::Result<()> {
        let title = self.config.title.clone();
        let app = self.build();

        let listener = tokio::net::TcpListener::bind(addr).await?;
        info!("{} listening on {}", title, listener.local_addr()?);

        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(shutdown_signal())
        .await?;

        info!("Server stopped");
        Ok(())
    }
}

/// Wait for shutdown signal
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for CTRL+C: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::test_state;

    async fn ok() -> &'static str {
        "ok"
    }

    #[test]
    fn test_normalize_path() {
        assert_eq!(normalize_path("diff").unwrap(), "/diff");
        assert_eq!(normalize_path("/diff").unwrap(), "/diff");
        assert_eq!(normalize_path("/").unwrap(), "/");
        assert!(matches!(normalize_path(""), Err(BuilderError::EmptyPath)));
        assert!(matches!(normalize_path("   "), Err(BuilderError::EmptyPath)));
    }

    #[test]
    fn test_records_route_metadata() {
        let (state, _dir) = test_state();
        let mut builder = ApiBuilder::new(state);

        let info = builder
            .api_route(
                RouteSpec::new("rate").rate_limit("2/hour".parse().unwrap()),
                ok,
            )
            .unwrap()
            .clone();

        assert_eq!(info.path, "/rate");
        assert_eq!(info.methods, vec![Method::GET]);
        assert!(!info.requires_auth());
        assert_eq!(info.rate_limit().unwrap().to_string(), "2/hour");

        builder
            .api_route(RouteSpec::new("protected").requires_auth(), ok)
            .unwrap();
        assert_eq!(builder.routes().len(), 2);
        assert!(builder.routes()[1].requires_auth());
    }

    #[test]
    fn test_automatic_methods_override_declared() {
        let (state, _dir) = test_state();
        let mut builder = ApiBuilder::new(state);

        let info = builder
            .api_route(RouteSpec::new("a").methods([Method::POST]), ok)
            .unwrap();
        assert_eq!(info.methods, vec![Method::GET]);
    }

    #[test]
    fn test_explicit_methods_when_not_automatic() {
        let (state, _dir) = test_state();
        let mut builder = ApiBuilder::new(state);
        builder.configure_api(ApiConfig {
            title: "Custom".to_string(),
            methods_automatic: false,
            methods_default: vec![Method::GET, Method::HEAD],
        });

        let info = builder
            .api_route(RouteSpec::new("a").methods([Method::POST, Method::PUT]), ok)
            .unwrap();
        assert_eq!(info.methods, vec![Method::POST, Method::PUT]);

        let info = builder.api_route(RouteSpec::new("b"), ok).unwrap();
        assert_eq!(info.methods, vec![Method::GET, Method::HEAD]);
        assert_eq!(builder.config().title, "Custom");
    }

    #[test]
    fn test_duplicate_route_rejected() {
        let (state, _dir) = test_state();
        let mut builder = ApiBuilder::new(state);
        builder.configure_api(ApiConfig {
            methods_automatic: false,
            ..ApiConfig::default()
        });

        builder.api_route(RouteSpec::new("diff"), ok).unwrap();
        let err = builder.api_route(RouteSpec::new("/diff"), ok).unwrap_err();
        assert!(matches!(err, BuilderError::DuplicateRoute { .. }));

        // Same path, different method is fine
        builder
            .api_route(RouteSpec::new("diff").methods([Method::POST]), ok)
            .unwrap();
    }

    #[test]
    fn test_reserved_paths_rejected() {
        let (state, _dir) = test_state();
        let mut builder = ApiBuilder::new(state);

        for path in ["health", "/healthz", "metrics"] {
            let err = builder.api_route(RouteSpec::new(path), ok).unwrap_err();
            assert!(matches!(err, BuilderError::ReservedPath(_)));
        }
        assert!(builder.routes().is_empty());
    }

    #[test]
    fn test_invalid_methods_rejected() {
        let (state, _dir) = test_state();
        let mut builder = ApiBuilder::new(state);
        builder.configure_api(ApiConfig {
            methods_automatic: false,
            ..ApiConfig::default()
        });

        let err = builder
            .api_route(RouteSpec::new("x").methods(Vec::new()), ok)
            .unwrap_err();
        assert!(matches!(err, BuilderError::NoMethods(_)));

        let custom = Method::from_bytes(b"PURGE").unwrap();
        let err = builder
            .api_route(RouteSpec::new("y").methods([custom]), ok)
            .unwrap_err();
        assert!(matches!(err, BuilderError::UnsupportedMethod(_)));
        assert!(builder.routes().is_empty());
    }
}
