//! HTTP handlers exposing the rate limiter.

use axum::extract::{Path, State};
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

use super::dto::{CheckRequest, CheckResponse};
use super::error::ApiError;
use crate::ratelimit::{
    validate_identifier, KeyStatus, LimiterStats, PolicyOverride, RateLimiter, RulesConfig,
};

const REMAINING_HEADER: &str = "x-ratelimit-remaining";
const RESET_HEADER: &str = "x-ratelimit-reset";

/// Decide whether a request may proceed.
///
/// Answers 200 when admitted and 429 when denied; both carry the decision
/// in the body. A denied-while-blocked decision also sets `Retry-After`.
#[instrument(
    skip_all,
    fields(
        identifier = %request.identifier,
        endpoint = ?request.endpoint
    )
)]
pub async fn check(
    State(limiter): State<Arc<RateLimiter>>,
    Json(request): Json<CheckRequest>,
) -> Result<Response, ApiError> {
    if let Err(e) = validate_identifier(&request.identifier) {
        warn!("Received rate limit check with empty identifier");
        return Err(e.into());
    }

    let overrides = request
        .policy
        .map(PolicyOverride::try_from)
        .transpose()
        .map_err(|e| {
            warn!(error = %e, "Received rate limit check with invalid policy override");
            ApiError::from(e)
        })?;

    let result = match request.endpoint.as_deref() {
        Some(endpoint) if !endpoint.trim().is_empty() => {
            limiter.check_endpoint_with(&request.identifier, endpoint, overrides.as_ref())
        }
        _ => limiter.check_limit(&request.identifier, overrides.as_ref()),
    };

    let mut headers = HeaderMap::new();
    headers.insert(REMAINING_HEADER, HeaderValue::from(result.remaining));
    headers.insert(RESET_HEADER, HeaderValue::from(result.reset_time.div_ceil(1000)));

    let status = if result.allowed {
        StatusCode::OK
    } else {
        if let Some(retry_after) = result.retry_after {
            let secs = retry_after.as_millis().div_ceil(1000) as u64;
            headers.insert(header::RETRY_AFTER, HeaderValue::from(secs));
        }
        StatusCode::TOO_MANY_REQUESTS
    };

    debug!(
        allowed = result.allowed,
        remaining = result.remaining,
        "Rate limit decision made"
    );

    Ok((status, headers, Json(CheckResponse::from(result))).into_response())
}

/// Current state of one key.
pub async fn key_status(
    State(limiter): State<Arc<RateLimiter>>,
    Path(identifier): Path<String>,
) -> Result<Json<KeyStatus>, ApiError> {
    limiter
        .status(&identifier)
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("no rate limit state for {}", identifier)))
}

/// Drop all state for one key, lifting any block.
pub async fn clear_key(
    State(limiter): State<Arc<RateLimiter>>,
    Path(identifier): Path<String>,
) -> StatusCode {
    info!(identifier = %identifier, "Administrative unblock requested");
    limiter.clear(Some(&identifier));
    StatusCode::NO_CONTENT
}

/// Drop all state.
pub async fn clear_all(State(limiter): State<Arc<RateLimiter>>) -> StatusCode {
    limiter.clear(None);
    StatusCode::NO_CONTENT
}

pub async fn stats(State(limiter): State<Arc<RateLimiter>>) -> Json<LimiterStats> {
    Json(limiter.stats())
}

/// The resolved endpoint policy table.
pub async fn policies(State(limiter): State<Arc<RateLimiter>>) -> Json<RulesConfig> {
    Json(limiter.policies().to_rules())
}

pub async fn health() -> &'static str {
    "ok"
}
