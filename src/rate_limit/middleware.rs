//! Axum middleware enforcing a [`SlidingWindowRateLimiter`].
//!
//! ```rust,no_run
//! # use axum::{middleware, routing::get, Router};
//! # use bulwark_core::rate_limit::{enforce_rate_limit, SlidingWindowRateLimiter};
//! # use std::sync::Arc;
//! # fn app(limiter: Arc<SlidingWindowRateLimiter>) -> Router {
//! Router::new()
//!     .route("/api/analyze", get(|| async { "ok" }))
//!     .layer(middleware::from_fn_with_state(limiter, enforce_rate_limit))
//! # }
//! ```

use super::errors::{apply_rate_limit_headers, RateLimitError};
use super::limiter::{RateLimitDecision, SlidingWindowRateLimiter};
use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use std::sync::Arc;

/// Reject over-limit requests with 429, annotate the rest with `X-RateLimit-*` headers
pub async fn enforce_rate_limit(
    State(limiter): State<Arc<SlidingWindowRateLimiter>>,
    request: Request,
    next: Next,
) -> Response {
    let key = limiter.key_for(&request);

    match limiter.check(&key).await {
        RateLimitDecision::Allowed {
            limit,
            remaining,
            reset_at,
        } => {
            let mut response = next.run(request).await;
            apply_rate_limit_headers(response.headers_mut(), limit, remaining, reset_at);
            response
        }
        RateLimitDecision::Limited {
            limit,
            reset_at,
            retry_after,
        } => RateLimitError::Exceeded {
            limit,
            reset_at,
            retry_after_secs: retry_after.as_secs(),
        }
        .into_response(),
    }
}
