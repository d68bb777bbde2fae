//! API routes

pub mod demo;
pub mod health;
pub mod metrics;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use std::any::Any;
use tracing::error;

use crate::error::ApiError;

/// Fallback for unmatched paths
pub(crate) async fn not_found() -> ApiError {
    ApiError::NotFound
}

/// Fallback for known paths hit with an unregistered method
pub(crate) async fn method_not_allowed() -> ApiError {
    ApiError::http(StatusCode::METHOD_NOT_ALLOWED, "Method Not Allowed")
}

/// Turn a handler panic into the generic 500 response
pub(crate) fn handle_panic(err: Box<dyn Any + Send + 'static>) -> Response {
    let message = err
        .downcast_ref::<String>()
        .map(String::as_str)
        .or_else(|| err.downcast_ref::<&str>().copied())
        .unwrap_or("unknown panic payload");

    error!("Handler panicked: {}", message);
    ApiError::Internal(format!("handler panicked: {}", message)).into_response()
}
