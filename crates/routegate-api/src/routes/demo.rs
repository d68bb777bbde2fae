//! Example routes showing each capability

use axum::Json;
use serde::Deserialize;

use crate::auth::CurrentUser;
use crate::builder::{ApiBuilder, BuilderError, RouteSpec};
use crate::error::ApiError;
use crate::extract::ValidatedQuery;

/// Two integer operands read from the query string
#[derive(Debug, Deserialize)]
pub struct Operands {
    pub a: i64,
    pub b: i64,
}

/// GET /addition?a=&b=
async fn addition(ValidatedQuery(ops): ValidatedQuery<Operands>) -> Result<Json<i64>, ApiError> {
    ops.a
        .checked_add(ops.b)
        .map(Json)
        .ok_or_else(|| ApiError::Validation("result out of range".to_string()))
}

/// GET /diff?a=&b=
async fn difference(ValidatedQuery(ops): ValidatedQuery<Operands>) -> Result<Json<i64>, ApiError> {
    ops.a
        .checked_sub(ops.b)
        .map(Json)
        .ok_or_else(|| ApiError::Validation("result out of range".to_string()))
}

/// GET /rate, limited to two requests per hour per client
async fn rate_limited() -> Json<&'static str> {
    Json("Rate-limited route.")
}

/// GET /protected, authenticated users only
async fn protected_data(CurrentUser(user): CurrentUser) -> Json<String> {
    Json(format!("Hello, {}", user.username))
}

/// Register the example routes
pub fn register(builder: &mut ApiBuilder) -> Result<(), BuilderError> {
    builder.api_route(RouteSpec::new("diff"), difference)?;
    builder.api_route(RouteSpec::new("addition"), addition)?;
    builder.api_route(
        RouteSpec::new("rate").rate_limit("2/hour".parse()?),
        rate_limited,
    )?;
    builder.api_route(RouteSpec::new("protected").requires_auth(), protected_data)?;
    Ok(())
}
