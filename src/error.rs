//! # Error Types
//!
//! Crate-level error that wraps the per-component error types. Component APIs
//! return their own typed errors; this enum exists for composition-root code
//! (configuration loading, layer construction) that crosses component lines.

use crate::cache::CacheError;
use crate::config::ConfigurationError;
use crate::rate_limit::RateLimitError;
use crate::resilience::CircuitBreakerError;
use crate::streaming::ChunkError;
use crate::transaction::TransactionError;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BulwarkError {
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("Transaction error: {0}")]
    Transaction(#[from] TransactionError),

    #[error("Rate limit error: {0}")]
    RateLimit(#[from] RateLimitError),

    #[error("Streaming error: {0}")]
    Streaming(#[from] ChunkError),

    /// A breaker rejected the call without running it
    #[error("Dependency unavailable: {component} (retry in {retry_after:?})")]
    DependencyUnavailable {
        component: String,
        retry_after: Duration,
    },
}

/// Rejections become [`BulwarkError::DependencyUnavailable`]; operation
/// failures convert through their own `From` impl.
impl<E> From<CircuitBreakerError<E>> for BulwarkError
where
    E: Into<BulwarkError>,
{
    fn from(err: CircuitBreakerError<E>) -> Self {
        match err {
            CircuitBreakerError::CircuitOpen {
                component,
                retry_after,
            } => Self::DependencyUnavailable {
                component,
                retry_after,
            },
            CircuitBreakerError::OperationFailed(inner) => inner.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, BulwarkError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resilience::{CircuitBreaker, CircuitBreakerConfig};

    async fn read_through(breaker: &CircuitBreaker) -> Result<String> {
        let value = breaker
            .execute(|| async {
                Err::<String, _>(CacheError::ConnectionError("refused".to_string()))
            })
            .await?;
        Ok(value)
    }

    #[tokio::test]
    async fn test_breaker_errors_convert_with_question_mark() {
        let breaker = CircuitBreaker::new(
            "cache",
            CircuitBreakerConfig::new(1, Duration::from_secs(30)),
        );

        let failed = read_through(&breaker).await;
        assert!(matches!(
            failed,
            Err(BulwarkError::Cache(CacheError::ConnectionError(_)))
        ));

        match read_through(&breaker).await {
            Err(BulwarkError::DependencyUnavailable {
                component,
                retry_after,
            }) => {
                assert_eq!(component, "cache");
                assert!(retry_after <= Duration::from_secs(30));
            }
            other => panic!("expected DependencyUnavailable, got {other:?}"),
        }
    }
}
