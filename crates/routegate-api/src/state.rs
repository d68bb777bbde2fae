//! Application state

use axum::extract::FromRef;
use routegate_auth::SharedCredentials;

/// Prometheus handle used to render the `/metrics` endpoint
pub type MetricsHandle = metrics_exporter_prometheus::PrometheusHandle;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub credentials: SharedCredentials,
}

impl AppState {
    pub fn new(credentials: SharedCredentials) -> Self {
        Self { credentials }
    }
}

impl FromRef<AppState> for SharedCredentials {
    fn from_ref(state: &AppState) -> Self {
        state.credentials.clone()
    }
}
