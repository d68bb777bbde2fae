//! Per-route, per-client rate limiting
//!
//! The limiting algorithm itself is governor's GCRA. This module parses
//! limits written as `"2/hour"` or `"10 per minute"`, keys clients by
//! address, and turns rejections into 429 responses.

use axum::{
    extract::{ConnectInfo, Request, State},
    middleware::Next,
    response::Response,
};
use governor::{
    DefaultKeyedRateLimiter, Quota, RateLimiter,
    clock::{Clock, DefaultClock},
};
use std::fmt;
use std::net::SocketAddr;
use std::num::NonZeroU32;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

use crate::error::ApiError;

/// Tracked client keys above which stale entries are pruned
const MAX_TRACKED_CLIENTS: usize = 10_000;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RateLimitParseError {
    #[error("Rate limit must look like \"<count>/<unit>\", got {0:?}")]
    Format(String),

    #[error("Rate limit count must be a positive integer, got {0:?}")]
    Count(String),

    #[error("Unknown rate limit unit {0:?} (expected second, minute, hour or day)")]
    Unit(String),

    #[error("Rate limit {0:?} is too frequent to enforce")]
    TooFrequent(String),
}

/// Time unit of a rate limit window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateUnit {
    Second,
    Minute,
    Hour,
    Day,
}

impl RateUnit {
    pub fn duration(self) -> Duration {
        match self {
            RateUnit::Second => Duration::from_secs(1),
            RateUnit::Minute => Duration::from_secs(60),
            RateUnit::Hour => Duration::from_secs(60 * 60),
            RateUnit::Day => Duration::from_secs(24 * 60 * 60),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RateUnit::Second => "second",
            RateUnit::Minute => "minute",
            RateUnit::Hour => "hour",
            RateUnit::Day => "day",
        }
    }
}

impl FromStr for RateUnit {
    type Err = RateLimitParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let unit = s.trim().to_ascii_lowercase();
        match unit.trim_end_matches('s') {
            "second" | "sec" => Ok(RateUnit::Second),
            "minute" | "min" => Ok(RateUnit::Minute),
            "hour" => Ok(RateUnit::Hour),
            "day" => Ok(RateUnit::Day),
            _ => Err(RateLimitParseError::Unit(s.trim().to_string())),
        }
    }
}

/// At most `count` requests per `unit` from one client
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimit {
    count: NonZeroU32,
    unit: RateUnit,
    quota: Quota,
}

impl RateLimit {
    pub fn new(count: NonZeroU32, unit: RateUnit) -> Result<Self, RateLimitParseError> {
        let replenish = unit.duration() / count.get();
        let quota = Quota::with_period(replenish)
            .ok_or_else(|| RateLimitParseError::TooFrequent(format!("{}/{}", count, unit.as_str())))?
            .allow_burst(count);

        Ok(Self { count, unit, quota })
    }

    pub fn count(&self) -> u32 {
        self.count.get()
    }

    pub fn unit(&self) -> RateUnit {
        self.unit
    }

    /// Governor quota: a burst of `count`, replenished evenly over the window
    pub fn quota(&self) -> Quota {
        self.quota
    }
}

impl FromStr for RateLimit {
    type Err = RateLimitParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (count, unit) = s
            .split_once('/')
            .or_else(|| s.split_once(" per "))
            .ok_or_else(|| RateLimitParseError::Format(s.to_string()))?;

        let count = count
            .trim()
            .parse::<NonZeroU32>()
            .map_err(|_| RateLimitParseError::Count(count.trim().to_string()))?;
        let unit = unit.parse::<RateUnit>()?;

        Self::new(count, unit)
    }
}

impl fmt::Display for RateLimit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.count, self.unit.as_str())
    }
}

/// Keyed limiter attached to a single route
#[derive(Clone)]
pub struct RouteLimiter {
    limit: RateLimit,
    limiter: Arc<DefaultKeyedRateLimiter<String>>,
}

impl RouteLimiter {
    pub fn new(limit: RateLimit) -> Self {
        Self {
            limit,
            limiter: Arc::new(RateLimiter::keyed(limit.quota())),
        }
    }

    pub fn limit(&self) -> RateLimit {
        self.limit
    }

    /// Record a request from `client`; on rejection returns how long to wait
    pub fn check(&self, client: &str) -> Result<(), Duration> {
        let key = client.to_string();
        let outcome = self
            .limiter
            .check_key(&key)
            .map_err(|not_until| not_until.wait_time_from(DefaultClock::default().now()));

        if self.limiter.len() > MAX_TRACKED_CLIENTS {
            self.limiter.retain_recent();
        }

        outcome
    }
}

/// Identify the calling client
///
/// Prefers the peer address of the connection, then the first
/// `X-Forwarded-For` entry.
pub fn client_key(request: &Request) -> String {
    if let Some(ConnectInfo(addr)) = request.extensions().get::<ConnectInfo<SocketAddr>>() {
        return addr.ip().to_string();
    }

    request
        .headers()
        .get("x-forwarded-for")
        .and_then(|h| h.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| "unknown".to_string())
}

/// Middleware rejecting requests over the route's limit with 429
pub async fn enforce_rate_limit(
    State(limiter): State<RouteLimiter>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let client = client_key(&request);

    if let Err(retry_after) = limiter.check(&client) {
        metrics::counter!("routegate_rate_limited_total").increment(1);
        warn!(
            "Rate limit {} exceeded by {} on {}",
            limiter.limit(),
            client,
            request.uri().path()
        );
        return Err(ApiError::RateLimited { retry_after });
    }

    debug!("Rate limit check passed for {}", client);
    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_slash_form() {
        let limit: RateLimit = "2/hour".parse().unwrap();
        assert_eq!(limit.count(), 2);
        assert_eq!(limit.unit(), RateUnit::Hour);
        assert_eq!(limit.to_string(), "2/hour");
    }

    #[test]
    fn test_parse_per_form_and_plurals() {
        let limit: RateLimit = "10 per Minutes".parse().unwrap();
        assert_eq!(limit.count(), 10);
        assert_eq!(limit.unit(), RateUnit::Minute);

        let limit: RateLimit = " 5 / seconds ".parse().unwrap();
        assert_eq!(limit.unit(), RateUnit::Second);
        assert_eq!(limit.to_string(), "5/second");
    }

    #[test]
    fn test_parse_errors() {
        assert!(matches!(
            "hourly".parse::<RateLimit>(),
            Err(RateLimitParseError::Format(_))
        ));
        assert!(matches!(
            "0/hour".parse::<RateLimit>(),
            Err(RateLimitParseError::Count(_))
        ));
        assert!(matches!(
            "-3/hour".parse::<RateLimit>(),
            Err(RateLimitParseError::Count(_))
        ));
        assert!(matches!(
            "3/fortnight".parse::<RateLimit>(),
            Err(RateLimitParseError::Unit(_))
        ));
    }

    #[test]
    fn test_burst_then_reject() {
        let limiter = RouteLimiter::new("2/hour".parse().unwrap());

        assert!(limiter.check("10.0.0.1").is_ok());
        assert!(limiter.check("10.0.0.1").is_ok());

        let wait = limiter.check("10.0.0.1").unwrap_err();
        assert!(wait > Duration::from_secs(60));
        assert!(wait <= Duration::from_secs(30 * 60));
    }

    #[test]
    fn test_clients_are_limited_independently() {
        let limiter = RouteLimiter::new("1/day".parse().unwrap());

        assert!(limiter.check("a").is_ok());
        assert!(limiter.check("a").is_err());
        assert!(limiter.check("b").is_ok());
    }

    #[test]
    fn test_client_key_sources() {
        let request = axum::http::Request::builder()
            .header("x-forwarded-for", "203.0.113.7, 10.0.0.1")
            .body(axum::body::Body::empty())
            .unwrap();
        assert_eq!(client_key(&request), "203.0.113.7");

        let mut request = axum::http::Request::builder().body(axum::body::Body::empty()).unwrap();
        assert_eq!(client_key(&request), "unknown");

        request
            .extensions_mut()
            .insert(ConnectInfo(SocketAddr::from(([192, 0, 2, 1], 4000))));
        assert_eq!(client_key(&request), "192.0.2.1");
    }
}
