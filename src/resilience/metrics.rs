//! Breaker counters as seen from outside.
//!
//! Snapshots are read by health endpoints and logs. Nothing in the layer
//! branches on them.

use crate::resilience::CircuitState;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

/// Closed breakers above this failure rate are reported as degraded
const DEGRADED_FAILURE_RATE: f64 = 0.1;

/// Calls needed before the failure rate is judged
const HEALTH_SAMPLE_MIN: u64 = 10;

/// Snapshot of one breaker
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CircuitBreakerMetrics {
    /// Calls that reached the wrapped operation
    pub total_calls: u64,
    pub success_count: u64,
    pub failure_count: u64,
    /// Calls short-circuited while open
    pub rejected_count: u64,
    pub consecutive_failures: u64,
    pub total_duration: Duration,
    pub current_state: CircuitState,
    pub failure_rate: f64,
    pub success_rate: f64,
    pub average_duration: Duration,
    pub since_last_failure: Option<Duration>,
}

impl CircuitBreakerMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open breakers are unhealthy. A half-open breaker is mid-trial and
    /// counts as healthy until the trial resolves. A closed breaker is
    /// degraded once it has seen enough calls and too many of them failed.
    pub fn is_healthy(&self) -> bool {
        match self.current_state {
            CircuitState::Open => false,
            CircuitState::HalfOpen => true,
            CircuitState::Closed => {
                self.total_calls < HEALTH_SAMPLE_MIN || self.failure_rate < DEGRADED_FAILURE_RATE
            }
        }
    }
}

impl fmt::Display for CircuitBreakerMetrics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:?} calls={} failures={} rejected={} success={:.1}% avg={}ms",
            self.current_state,
            self.total_calls,
            self.failure_count,
            self.rejected_count,
            self.success_rate * 100.0,
            self.average_duration.as_millis()
        )
    }
}

/// Per-state breaker counts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateCounts {
    pub closed: usize,
    pub open: usize,
    pub half_open: usize,
}

/// Snapshot of every breaker a manager owns, keyed by dependency name
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DependencyHealthReport {
    pub components: BTreeMap<String, CircuitBreakerMetrics>,
    pub collected_at: DateTime<Utc>,
}

impl FromIterator<(String, CircuitBreakerMetrics)> for DependencyHealthReport {
    fn from_iter<I: IntoIterator<Item = (String, CircuitBreakerMetrics)>>(iter: I) -> Self {
        Self {
            components: iter.into_iter().collect(),
            collected_at: Utc::now(),
        }
    }
}

impl DependencyHealthReport {
    pub fn state_counts(&self) -> StateCounts {
        self.components
            .values()
            .fold(StateCounts::default(), |mut counts, m| {
                match m.current_state {
                    CircuitState::Closed => counts.closed += 1,
                    CircuitState::Open => counts.open += 1,
                    CircuitState::HalfOpen => counts.half_open += 1,
                }
                counts
            })
    }

    /// Names of dependencies whose breaker reports unhealthy, in name order
    pub fn unhealthy(&self) -> Vec<&str> {
        self.components
            .iter()
            .filter(|(_, m)| !m.is_healthy())
            .map(|(name, _)| name.as_str())
            .collect()
    }

    /// Fraction of healthy breakers; 1.0 when there are none
    pub fn health_score(&self) -> f64 {
        if self.components.is_empty() {
            return 1.0;
        }
        let unhealthy = self.unhealthy().len();
        (self.components.len() - unhealthy) as f64 / self.components.len() as f64
    }

    pub fn total_calls(&self) -> u64 {
        self.components.values().map(|m| m.total_calls).sum()
    }

    pub fn total_failures(&self) -> u64 {
        self.components.values().map(|m| m.failure_count).sum()
    }

    pub fn failure_rate(&self) -> f64 {
        match self.total_calls() {
            0 => 0.0,
            calls => self.total_failures() as f64 / calls as f64,
        }
    }
}
