//! Settings for one breaker. Registry-wide settings live in
//! [`CircuitBreakersConfig`](crate::config::CircuitBreakersConfig).

use crate::constants::circuit_breaker::{DEFAULT_FAILURE_THRESHOLD, DEFAULT_RESET_TIMEOUT_MS};
use serde::{Deserialize, Serialize};
use std::ops::RangeInclusive;
use std::time::Duration;

const THRESHOLD_BOUNDS: RangeInclusive<u32> = 1..=100;
const MAX_RESET_TIMEOUT: Duration = Duration::from_secs(600);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures that trip the breaker
    pub failure_threshold: u32,

    /// How long the breaker stays open before admitting a trial call
    pub reset_timeout: Duration,
}

impl CircuitBreakerConfig {
    pub const fn new(failure_threshold: u32, reset_timeout: Duration) -> Self {
        Self {
            failure_threshold,
            reset_timeout,
        }
    }

    /// Model calls are slow and expensive; trip early and back off for a minute
    pub const fn for_inference() -> Self {
        Self::new(3, Duration::from_secs(60))
    }

    pub const fn for_database() -> Self {
        Self::new(5, Duration::from_secs(30))
    }

    pub const fn for_distributed_cache() -> Self {
        Self::new(3, Duration::from_secs(15))
    }

    pub fn validate(&self) -> Result<(), String> {
        if !THRESHOLD_BOUNDS.contains(&self.failure_threshold) {
            return Err(format!(
                "failure_threshold {} outside {}..={}",
                self.failure_threshold,
                THRESHOLD_BOUNDS.start(),
                THRESHOLD_BOUNDS.end()
            ));
        }
        if self.reset_timeout.is_zero() || self.reset_timeout > MAX_RESET_TIMEOUT {
            return Err(format!(
                "reset_timeout {}ms outside 1..={}ms",
                self.reset_timeout.as_millis(),
                MAX_RESET_TIMEOUT.as_millis()
            ));
        }
        Ok(())
    }
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self::new(
            DEFAULT_FAILURE_THRESHOLD,
            Duration::from_millis(DEFAULT_RESET_TIMEOUT_MS),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bounds() {
        assert!(CircuitBreakerConfig::default().validate().is_ok());

        for bad in [
            CircuitBreakerConfig::new(0, Duration::from_secs(1)),
            CircuitBreakerConfig::new(101, Duration::from_secs(1)),
            CircuitBreakerConfig::new(3, Duration::ZERO),
            CircuitBreakerConfig::new(3, Duration::from_secs(601)),
        ] {
            assert!(bad.validate().is_err(), "{bad:?} should be rejected");
        }
    }

    #[test]
    fn test_presets_are_valid() {
        for preset in [
            CircuitBreakerConfig::for_inference(),
            CircuitBreakerConfig::for_database(),
            CircuitBreakerConfig::for_distributed_cache(),
        ] {
            assert!(preset.validate().is_ok());
        }
        assert_eq!(CircuitBreakerConfig::for_inference().failure_threshold, 3);
    }
}
