#![allow(clippy::doc_markdown)] // Allow technical terms like PostgreSQL, SQLx in docs
#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # Bulwark Core
//!
//! Resilience and performance layer for a request-serving backend.
//!
//! ## Overview
//!
//! Requests pass a sliding-window rate limiter at the ingress boundary.
//! Handlers call out to dependencies through circuit breakers and probe the
//! tiered cache (or the semantic result cache, for inference results) before
//! doing expensive work. Multi-step state mutations run inside a retrying
//! transaction runner, and large uploads are scanned by a streaming chunk
//! processor that reports progress and findings as it goes.
//!
//! ## Module Organization
//!
//! - [`cache`] - Two-tier cache: in-process LRU with TTL plus optional distributed tier
//! - [`semantic`] - Content-hash keyed cache for generated results, gated on confidence
//! - [`resilience`] - Circuit breakers and the per-dependency breaker registry
//! - [`transaction`] - Transactions with classified retries and exponential backoff
//! - [`rate_limit`] - Sliding-window rate limiters and axum middleware
//! - [`streaming`] - Bounded-memory chunked scans emitting incremental events
//! - [`layer`] - Composition root wiring the components from configuration
//! - [`config`] - Layered configuration loading
//! - [`logging`] - Structured logging initialization
//! - [`error`] - Crate-level error type
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use bulwark_core::config::ConfigLoader;
//! use bulwark_core::layer::ResilienceLayer;
//! use bulwark_core::semantic::InMemorySemanticRecordStore;
//! use std::sync::Arc;
//!
//! # async fn example() -> bulwark_core::Result<()> {
//! bulwark_core::logging::init_structured_logging();
//!
//! let layer = ResilienceLayer::from_config(
//!     ConfigLoader::load()?,
//!     None,
//!     Arc::new(InMemorySemanticRecordStore::new()),
//! )?;
//!
//! let cache = layer.cache();
//! cache.set("user:42:profile", &"cached profile", None)?;
//! let profile: Option<String> = cache.get("user:42:profile").await;
//! # let _ = profile;
//! # Ok(())
//! # }
//! ```
//!
//! ## Testing
//!
//! ```bash
//! cargo test --lib                      # Unit tests
//! cargo test --all-features             # Including Redis-backed code paths
//! ```

pub mod cache;
pub mod config;
pub mod constants;
pub mod error;
pub mod layer;
pub mod logging;
pub mod rate_limit;
pub mod resilience;
pub mod semantic;
pub mod streaming;
pub mod transaction;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use cache::{CacheError, CacheManager, CacheStats, DistributedCacheClient, DistributedEntry};
pub use config::{BulwarkConfig, ConfigLoader};
pub use error::{BulwarkError, Result};
pub use layer::ResilienceLayer;
pub use rate_limit::{RateLimitDecision, SlidingWindowRateLimiter};
pub use resilience::{CircuitBreaker, CircuitBreakerError, CircuitBreakerManager, CircuitState};
pub use semantic::{SemanticResult, SemanticResultCache};
pub use streaming::{StreamEvent, StreamingChunkProcessor};
pub use transaction::{RetryingTransactionRunner, TransactionError};
