//! Authentication error types

use axum::http::{StatusCode, header::WWW_AUTHENTICATE};
use axum::response::{IntoResponse, Response};
use serde_json::json;
use std::path::PathBuf;
use thiserror::Error;

/// Detail returned to clients whose credentials were rejected
pub const INCORRECT_CREDENTIALS: &str = "Incorrect username or password";

#[derive(Error, Debug)]
pub enum AuthError {
    #[error("Incorrect username or password")]
    InvalidCredentials,

    #[error("Missing authorization header")]
    MissingAuthHeader,

    #[error("Invalid authorization header format")]
    InvalidAuthHeader,

    #[error("Password hashing error: {0}")]
    PasswordHash(String),

    #[error("Failed to write credential store {}: {source}", path.display())]
    StorageWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to read credential store {}: {source}", path.display())]
    StorageRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Credential store {} is corrupt: {source}", path.display())]
    StorageCorrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Background task failed: {0}")]
    Task(String),
}

impl AuthError {
    /// Whether this error is a rejection of the caller rather than a server fault
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            AuthError::InvalidCredentials
                | AuthError::MissingAuthHeader
                | AuthError::InvalidAuthHeader
        )
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        if !self.is_rejection() {
            tracing::error!("Authentication backend failure: {}", self);
            let body = axum::Json(json!({
                "detail": "An internal server error occurred."
            }));
            return (StatusCode::INTERNAL_SERVER_ERROR, body).into_response();
        }

        let detail = match &self {
            AuthError::MissingAuthHeader => "Not authenticated",
            AuthError::InvalidAuthHeader => "Invalid authentication credentials",
            _ => INCORRECT_CREDENTIALS,
        };

        let body = axum::Json(json!({ "detail": detail }));

        (
            StatusCode::UNAUTHORIZED,
            [(WWW_AUTHENTICATE, "Basic")],
            body,
        )
            .into_response()
    }
}
