//! API error types
//!
//! Every error reaches the client as a JSON object with a single
//! `detail` field.

use axum::extract::rejection::QueryRejection;
use axum::http::{StatusCode, header::RETRY_AFTER};
use axum::response::{IntoResponse, Response};
use serde_json::json;
use std::time::Duration;
use thiserror::Error;
use tracing::error;

pub const INTERNAL_ERROR_DETAIL: &str = "An internal server error occurred.";
pub const RATE_LIMIT_DETAIL: &str = "You have exceeded the rate limit.";

#[derive(Error, Debug)]
pub enum ApiError {
    /// Handler-raised error with an explicit status
    #[error("{detail}")]
    Http { status: StatusCode, detail: String },

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Rate limit exceeded")]
    RateLimited { retry_after: Duration },

    #[error("Not found")]
    NotFound,

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Auth error: {0}")]
    Auth(#[from] routegate_auth::AuthError),
}

impl ApiError {
    pub fn http(status: StatusCode, detail: impl Into<String>) -> Self {
        ApiError::Http {
            status,
            detail: detail.into(),
        }
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError::Validation(rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, detail) = match self {
            ApiError::Http { status, detail } => (status, json!(detail)),
            ApiError::Validation(msg) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                json!([{ "loc": ["query"], "msg": msg, "type": "value_error" }]),
            ),
            ApiError::RateLimited { retry_after } => {
                // Partial seconds round up
                let secs = retry_after.as_secs() + u64::from(retry_after.subsec_nanos() > 0);
                let body = axum::Json(json!({ "detail": RATE_LIMIT_DETAIL }));
                return (
                    StatusCode::TOO_MANY_REQUESTS,
                    [(RETRY_AFTER, secs.to_string())],
                    body,
                )
                    .into_response();
            }
            ApiError::NotFound => (StatusCode::NOT_FOUND, json!("Not Found")),
            ApiError::Internal(msg) => {
                error!("Internal error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, json!(INTERNAL_ERROR_DETAIL))
            }
            ApiError::Auth(e) => return e.into_response(),
        };

        let body = axum::Json(json!({ "detail": detail }));

        (status, body).into_response()
    }
}
