//! Basic authentication for routes that require it

use axum::{
    extract::{FromRequestParts, Request, State},
    http::{header::AUTHORIZATION, request::Parts},
    middleware::Next,
    response::Response,
};
use routegate_auth::{AuthError, BasicCredentials, SharedCredentials};
use tracing::{debug, warn};

use crate::error::ApiError;

/// User authenticated for the current request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthUser {
    pub username: String,
}

/// Middleware validating `Authorization: Basic` against the credential store
///
/// On success the [`AuthUser`] is added to request extensions. On failure
/// the client gets 401 with a `WWW-Authenticate: Basic` challenge.
pub async fn require_basic_auth(
    State(credentials): State<SharedCredentials>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let header = match request.headers().get(AUTHORIZATION) {
        Some(value) => Some(value.to_str().map_err(|_| AuthError::InvalidAuthHeader)?),
        None => None,
    };
    let BasicCredentials { username, password } = BasicCredentials::from_header(header)?;

    let valid = credentials
        .validate_user_async(username.clone(), password)
        .await?;

    if !valid {
        metrics::counter!("routegate_auth_failures_total").increment(1);
        warn!("Rejected credentials for user {}", username);
        return Err(AuthError::InvalidCredentials.into());
    }

    metrics::counter!("routegate_auth_success_total").increment(1);
    debug!("Authenticated user: {}", username);

    request.extensions_mut().insert(AuthUser { username });
    Ok(next.run(request).await)
}

/// Extractor for the authenticated user
///
/// Only meaningful on routes registered with the auth capability; anywhere
/// else it always rejects.
pub struct CurrentUser(pub AuthUser);

impl<S> FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthUser>()
            .cloned()
            .map(CurrentUser)
            .ok_or(ApiError::Auth(AuthError::MissingAuthHeader))
    }
}
