//! Transaction and retry options.

use crate::constants::retry;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// SQL transaction isolation level
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IsolationLevel {
    ReadUncommitted,
    #[default]
    ReadCommitted,
    RepeatableRead,
    Serializable,
}

impl IsolationLevel {
    pub fn as_sql(&self) -> &'static str {
        match self {
            Self::ReadUncommitted => "READ UNCOMMITTED",
            Self::ReadCommitted => "READ COMMITTED",
            Self::RepeatableRead => "REPEATABLE READ",
            Self::Serializable => "SERIALIZABLE",
        }
    }
}

impl fmt::Display for IsolationLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_sql())
    }
}

/// Bounds applied to a single transaction attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransactionOptions {
    /// Longest wait to open the transaction
    pub max_wait: Duration,
    /// Longest the transaction body may run
    pub timeout: Duration,
    pub isolation_level: IsolationLevel,
}

impl Default for TransactionOptions {
    fn default() -> Self {
        Self {
            max_wait: Duration::from_millis(retry::DEFAULT_MAX_WAIT_MS),
            timeout: Duration::from_millis(retry::DEFAULT_TIMEOUT_MS),
            isolation_level: IsolationLevel::default(),
        }
    }
}

/// Retry budget and backoff bounds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryOptions {
    /// Retries after the first attempt
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryOptions {
    fn default() -> Self {
        Self {
            max_retries: retry::DEFAULT_MAX_RETRIES,
            base_delay: Duration::from_millis(retry::DEFAULT_BASE_DELAY_MS),
            max_delay: Duration::from_millis(retry::DEFAULT_MAX_DELAY_MS),
        }
    }
}
