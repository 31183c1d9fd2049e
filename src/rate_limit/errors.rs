//! Rate limit errors and the 429 response.

use axum::http::{header, HeaderName, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::{DateTime, Utc};
use serde_json::json;
use thiserror::Error;

pub(crate) const LIMIT_HEADER: HeaderName = HeaderName::from_static("x-ratelimit-limit");
pub(crate) const REMAINING_HEADER: HeaderName = HeaderName::from_static("x-ratelimit-remaining");
pub(crate) const RESET_HEADER: HeaderName = HeaderName::from_static("x-ratelimit-reset");

#[derive(Debug, Clone, PartialEq, Error)]
pub enum RateLimitError {
    /// The caller used up its window
    #[error("Rate limit exceeded, retry after {retry_after_secs}s")]
    Exceeded {
        limit: u32,
        reset_at: DateTime<Utc>,
        retry_after_secs: u64,
    },

    #[error("Invalid rate limiter configuration: {0}")]
    InvalidConfig(String),
}

/// Attach the informational `X-RateLimit-*` headers
pub(crate) fn apply_rate_limit_headers(
    headers: &mut axum::http::HeaderMap,
    limit: u32,
    remaining: u32,
    reset_at: DateTime<Utc>,
) {
    headers.insert(LIMIT_HEADER, HeaderValue::from(limit));
    headers.insert(REMAINING_HEADER, HeaderValue::from(remaining));
    if let Ok(reset) = HeaderValue::from_str(&reset_at.to_rfc3339()) {
        headers.insert(RESET_HEADER, reset);
    }
}

impl IntoResponse for RateLimitError {
    fn into_response(self) -> Response {
        match self {
            Self::Exceeded {
                limit,
                reset_at,
                retry_after_secs,
            } => {
                let body = Json(json!({
                    "error": "Too Many Requests",
                    "message": format!(
                        "Rate limit exceeded. Try again in {retry_after_secs} seconds."
                    ),
                    "retryAfter": retry_after_secs,
                }));

                let mut response = (StatusCode::TOO_MANY_REQUESTS, body).into_response();
                let headers = response.headers_mut();
                apply_rate_limit_headers(headers, limit, 0, reset_at);
                headers.insert(header::RETRY_AFTER, HeaderValue::from(retry_after_secs));
                response
            }
            Self::InvalidConfig(message) => {
                let body = Json(json!({
                    "error": "Internal Server Error",
                    "message": message,
                }));
                (StatusCode::INTERNAL_SERVER_ERROR, body).into_response()
            }
        }
    }
}
