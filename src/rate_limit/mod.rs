//! # Rate Limiting
//!
//! Sliding-window request throttling at the ingress boundary. Each named
//! limiter (`api`, `auth`, `ai_usage`) is an independent instance with its
//! own key namespace in the shared [`CacheManager`](crate::cache::CacheManager).

pub mod errors;
pub mod keys;
pub mod limiter;
pub mod middleware;

pub use errors::RateLimitError;
pub use keys::{authenticated_or_ip, client_ip, header_or_ip, AuthenticatedUser, KeyExtractor};
pub use limiter::{RateLimitDecision, RateLimiterConfig, SlidingWindowRateLimiter};
pub use middleware::enforce_rate_limit;
