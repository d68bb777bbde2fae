//! Routegate REST API
//!
//! This crate provides the Axum-based route builder for Routegate:
//! explicit route registration with per-route capabilities (basic
//! authentication, rate limiting), uniform JSON error responses, and
//! the example routes served by the binary.

pub mod auth;
pub mod builder;
pub mod error;
pub mod extract;
pub mod rate_limit;
pub mod routes;
pub mod state;

#[cfg(test)]
mod test_support;

pub use auth::{AuthUser, CurrentUser};
pub use builder::{ApiBuilder, ApiConfig, BuilderError, Capability, RouteInfo, RouteSpec};
pub use error::ApiError;
pub use extract::ValidatedQuery;
pub use rate_limit::{RateLimit, RateLimitParseError, RateUnit};
pub use state::{AppState, MetricsHandle};
