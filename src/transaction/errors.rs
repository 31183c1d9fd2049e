//! Store and transaction error types.

use serde::Serialize;
use std::fmt;
use thiserror::Error;

/// Classification of a store failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreErrorKind {
    Deadlock,
    TransactionTimeout,
    ConnectionTimeout,
    Constraint,
    Other,
}

impl StoreErrorKind {
    /// Deadlocks and timeouts may succeed on a later attempt
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Deadlock | Self::TransactionTimeout | Self::ConnectionTimeout
        )
    }

    /// Map a Postgres SQLSTATE code
    pub fn from_sqlstate(code: &str) -> Self {
        match code {
            // deadlock_detected, serialization_failure
            "40P01" | "40001" => Self::Deadlock,
            // query_canceled (statement_timeout), idle_in_transaction_session_timeout, lock_not_available
            "57014" | "25P03" | "55P03" => Self::TransactionTimeout,
            // cannot_connect_now, connection_failure, sqlclient_unable_to_establish_sqlconnection
            "57P03" | "08006" | "08001" => Self::ConnectionTimeout,
            code if code.starts_with("23") => Self::Constraint,
            _ => Self::Other,
        }
    }
}

impl fmt::Display for StoreErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Deadlock => "deadlock",
            Self::TransactionTimeout => "transaction timeout",
            Self::ConnectionTimeout => "connection timeout",
            Self::Constraint => "constraint violation",
            Self::Other => "store error",
        };
        f.write_str(label)
    }
}

/// A failure reported by a transactional store or a transaction body
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{kind}: {message}")]
pub struct StoreError {
    pub kind: StoreErrorKind,
    /// Backend-specific code, such as a SQLSTATE
    pub code: Option<String>,
    pub message: String,
}

impl StoreError {
    pub fn new(kind: StoreErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            code: None,
            message: message.into(),
        }
    }

    pub fn from_sqlstate(code: &str, message: impl Into<String>) -> Self {
        Self {
            kind: StoreErrorKind::from_sqlstate(code),
            code: Some(code.to_string()),
            message: message.into(),
        }
    }

    pub fn deadlock(message: impl Into<String>) -> Self {
        Self::new(StoreErrorKind::Deadlock, message)
    }

    pub fn constraint(message: impl Into<String>) -> Self {
        Self::new(StoreErrorKind::Constraint, message)
    }

    pub fn other(message: impl Into<String>) -> Self {
        Self::new(StoreErrorKind::Other, message)
    }

    pub fn is_retryable(&self) -> bool {
        self.kind.is_retryable()
    }
}

#[cfg(feature = "postgres")]
impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::Database(db) => match db.code() {
                Some(code) => Self::from_sqlstate(&code, db.message()),
                None => Self::other(db.message()),
            },
            sqlx::Error::PoolTimedOut => Self::new(StoreErrorKind::ConnectionTimeout, err.to_string()),
            sqlx::Error::Io(io) if io.kind() == std::io::ErrorKind::TimedOut => {
                Self::new(StoreErrorKind::ConnectionTimeout, err.to_string())
            }
            _ => Self::other(err.to_string()),
        }
    }
}

/// Terminal outcome of a transaction that did not commit
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TransactionError {
    #[error("Deadlock after {attempts} attempt(s): {source}")]
    Deadlock { attempts: u32, source: StoreError },

    #[error("Timed out after {attempts} attempt(s): {source}")]
    Timeout { attempts: u32, source: StoreError },

    #[error("Transaction failed after {attempts} attempt(s): {source}")]
    Failed { attempts: u32, source: StoreError },
}

impl TransactionError {
    pub fn from_store(source: StoreError, attempts: u32) -> Self {
        match source.kind {
            StoreErrorKind::Deadlock => Self::Deadlock { attempts, source },
            StoreErrorKind::TransactionTimeout | StoreErrorKind::ConnectionTimeout => {
                Self::Timeout { attempts, source }
            }
            StoreErrorKind::Constraint | StoreErrorKind::Other => Self::Failed { attempts, source },
        }
    }

    /// Attempts made, including the first
    pub fn attempts(&self) -> u32 {
        match self {
            Self::Deadlock { attempts, .. }
            | Self::Timeout { attempts, .. }
            | Self::Failed { attempts, .. } => *attempts,
        }
    }

    pub fn store_error(&self) -> &StoreError {
        match self {
            Self::Deadlock { source, .. }
            | Self::Timeout { source, .. }
            | Self::Failed { source, .. } => source,
        }
    }
}
