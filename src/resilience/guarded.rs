//! A dependency call site bound to its breaker and an optional fallback.

use crate::resilience::{CircuitBreaker, CircuitBreakerError};
use std::fmt;
use std::future::Future;
use std::sync::Arc;

type Fallback<T> = Arc<dyn Fn() -> T + Send + Sync>;

/// Pairs a shared [`CircuitBreaker`] with the value to return while it is open
pub struct GuardedDependency<T> {
    breaker: Arc<CircuitBreaker>,
    fallback: Option<Fallback<T>>,
}

impl<T> GuardedDependency<T> {
    pub fn new(breaker: Arc<CircuitBreaker>) -> Self {
        Self {
            breaker,
            fallback: None,
        }
    }

    pub fn with_fallback(mut self, fallback: impl Fn() -> T + Send + Sync + 'static) -> Self {
        self.fallback = Some(Arc::new(fallback));
        self
    }

    pub fn breaker(&self) -> &Arc<CircuitBreaker> {
        &self.breaker
    }

    /// Run `operation` through the breaker
    ///
    /// With a fallback configured, an open circuit yields the fallback value
    /// instead of [`CircuitBreakerError::CircuitOpen`].
    pub async fn execute<F, Fut, E>(&self, operation: F) -> Result<T, CircuitBreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        match &self.fallback {
            Some(fallback) => self
                .breaker
                .execute_with_fallback(operation, || fallback())
                .await
                .map_err(CircuitBreakerError::OperationFailed),
            None => self.breaker.execute(operation).await,
        }
    }
}

impl<T> Clone for GuardedDependency<T> {
    fn clone(&self) -> Self {
        Self {
            breaker: Arc::clone(&self.breaker),
            fallback: self.fallback.clone(),
        }
    }
}

impl<T> fmt::Debug for GuardedDependency<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GuardedDependency")
            .field("breaker", &self.breaker.name())
            .field("has_fallback", &self.fallback.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resilience::{CircuitBreakerConfig, CircuitState};
    use std::time::Duration;

    fn open_breaker() -> Arc<CircuitBreaker> {
        let breaker = Arc::new(CircuitBreaker::new(
            "inference",
            CircuitBreakerConfig {
                failure_threshold: 1,
                reset_timeout: Duration::from_secs(60),
            },
        ));
        breaker.force_open();
        breaker
    }

    #[tokio::test]
    async fn test_fallback_served_while_open() {
        let guarded = GuardedDependency::new(open_breaker())
            .with_fallback(|| "analysis unavailable".to_string());

        let result = guarded
            .execute(|| async { Ok::<_, String>("live".to_string()) })
            .await
            .unwrap();

        assert_eq!(result, "analysis unavailable");
        assert_eq!(guarded.breaker().state(), CircuitState::Open);
    }

    #[tokio::test]
    async fn test_without_fallback_open_circuit_is_an_error() {
        let guarded: GuardedDependency<String> = GuardedDependency::new(open_breaker());

        let result = guarded
            .execute(|| async { Ok::<_, String>("live".to_string()) })
            .await;

        assert!(result.unwrap_err().is_circuit_open());
    }

    #[tokio::test]
    async fn test_operation_errors_pass_through_with_fallback() {
        let breaker = Arc::new(CircuitBreaker::new("db", CircuitBreakerConfig::default()));
        let guarded = GuardedDependency::new(breaker).with_fallback(|| 0_u32);

        let result = guarded.execute(|| async { Err::<u32, _>("boom") }).await;

        assert!(matches!(
            result,
            Err(CircuitBreakerError::OperationFailed("boom"))
        ));
    }
}
