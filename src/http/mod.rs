//! HTTP sidecar exposing the rate limiter to out-of-process callers.

pub mod dto;
mod error;
mod handlers;
mod server;

pub use error::ApiError;
pub use server::HttpServer;

use axum::routing::{delete, get, post};
use axum::Router;
use std::sync::Arc;

use crate::ratelimit::RateLimiter;

/// Build the sidecar's routes over a shared limiter.
pub fn router(rate_limiter: Arc<RateLimiter>) -> Router {
    Router::new()
        .route("/healthz", get(handlers::health))
        .route("/v1/check", post(handlers::check))
        .route("/v1/keys", delete(handlers::clear_all))
        .route(
            "/v1/keys/{identifier}",
            get(handlers::key_status).delete(handlers::clear_key),
        )
        .route("/v1/stats", get(handlers::stats))
        .route("/v1/policies", get(handlers::policies))
        .with_state(rate_limiter)
}
