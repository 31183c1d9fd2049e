//! # Backoff Calculator
//!
//! Exponential backoff between transaction attempts:
//! `delay = min(base_delay * 2^attempt, max_delay)`, where `attempt` is the
//! zero-based index of the attempt that just failed.

use super::options::RetryOptions;
use std::time::Duration;

#[derive(Debug, Clone, Copy)]
pub struct BackoffCalculator {
    base_delay: Duration,
    max_delay: Duration,
}

impl BackoffCalculator {
    pub fn new(options: &RetryOptions) -> Self {
        Self {
            base_delay: options.base_delay,
            max_delay: options.max_delay,
        }
    }

    /// Delay before the retry that follows failed attempt `attempt`
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2_u32.checked_pow(attempt).unwrap_or(u32::MAX);
        self.base_delay
            .checked_mul(factor)
            .unwrap_or(Duration::MAX)
            .min(self.max_delay)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn calculator(base_ms: u64, max_ms: u64) -> BackoffCalculator {
        BackoffCalculator::new(&RetryOptions {
            max_retries: 3,
            base_delay: Duration::from_millis(base_ms),
            max_delay: Duration::from_millis(max_ms),
        })
    }

    #[test]
    fn test_default_schedule() {
        let backoff = calculator(100, 1_000);
        let delays: Vec<u64> = (0..6)
            .map(|attempt| backoff.delay_for(attempt).as_millis() as u64)
            .collect();
        assert_eq!(delays, vec![100, 200, 400, 800, 1_000, 1_000]);
    }

    #[test]
    fn test_huge_attempt_does_not_overflow() {
        let backoff = calculator(100, 1_000);
        assert_eq!(backoff.delay_for(u32::MAX), Duration::from_millis(1_000));
    }

    proptest! {
        #[test]
        fn delay_never_exceeds_cap(base in 1_u64..10_000, extra in 0_u64..100_000, attempt in 0_u32..64) {
            let max = base + extra;
            let delay = calculator(base, max).delay_for(attempt);
            prop_assert!(delay <= Duration::from_millis(max));
            prop_assert!(delay >= Duration::from_millis(base));
        }

        #[test]
        fn delay_is_monotonic(base in 1_u64..1_000, attempt in 0_u32..40) {
            let backoff = calculator(base, 60_000);
            prop_assert!(backoff.delay_for(attempt) <= backoff.delay_for(attempt + 1));
        }
    }
}
