//! Cache errors.
//!
//! Only [`CacheManager::set`](super::CacheManager::set) can return one of
//! these to a caller (for an unserializable value). Every tier-2 error is
//! absorbed by the manager as a miss.

use crate::resilience::CircuitBreakerError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("Distributed cache unreachable: {0}")]
    ConnectionError(String),

    #[error("Cache value could not be encoded or decoded: {0}")]
    SerializationError(String),

    #[error("Distributed cache timed out: {0}")]
    Timeout(String),

    #[error("Distributed cache rejected the command: {0}")]
    BackendError(String),

    /// Rejected by the open breaker guarding the tier
    #[error("Distributed cache circuit open for {0}")]
    Unavailable(String),
}

impl From<serde_json::Error> for CacheError {
    fn from(err: serde_json::Error) -> Self {
        Self::SerializationError(err.to_string())
    }
}

impl From<CircuitBreakerError<CacheError>> for CacheError {
    fn from(err: CircuitBreakerError<CacheError>) -> Self {
        match err {
            CircuitBreakerError::CircuitOpen { component, .. } => Self::Unavailable(component),
            CircuitBreakerError::OperationFailed(inner) => inner,
        }
    }
}

pub type CacheResult<T> = Result<T, CacheError>;
