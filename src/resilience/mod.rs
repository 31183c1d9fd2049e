//! # Resilience Module
//!
//! Circuit breakers that isolate slow or failing dependencies (inference,
//! database, distributed cache) so their failures degrade a request instead of
//! stalling it.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use bulwark_core::resilience::{CircuitBreaker, CircuitBreakerConfig};
//!
//! # async fn example() {
//! let breaker = CircuitBreaker::new("inference", CircuitBreakerConfig::for_inference());
//!
//! let answer = breaker
//!     .execute_with_fallback(
//!         || async { Ok::<_, std::io::Error>("model output") },
//!         || "analysis temporarily unavailable",
//!     )
//!     .await;
//! # let _ = answer;
//! # }
//! ```

pub mod circuit_breaker;
pub mod config;
pub mod guarded;
pub mod manager;
pub mod metrics;

pub use circuit_breaker::{CircuitBreaker, CircuitBreakerError, CircuitState, CircuitStateChange};
pub use config::CircuitBreakerConfig;
pub use guarded::GuardedDependency;
pub use manager::CircuitBreakerManager;
pub use metrics::{CircuitBreakerMetrics, DependencyHealthReport, StateCounts};
