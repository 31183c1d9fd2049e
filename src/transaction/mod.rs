//! # Retrying Transactions
//!
//! [`RetryingTransactionRunner`] wraps multi-step state changes in store
//! transactions and retries the transient failures a relational store
//! produces under contention.

pub mod backoff;
pub mod errors;
pub mod options;
#[cfg(feature = "postgres")]
pub mod postgres;
pub mod runner;
pub mod store;

pub use backoff::BackoffCalculator;
pub use errors::{StoreError, StoreErrorKind, TransactionError};
pub use options::{IsolationLevel, RetryOptions, TransactionOptions};
#[cfg(feature = "postgres")]
pub use postgres::PgTransactionalStore;
pub use runner::{RetryAttempt, RetryingTransactionRunner};
pub use store::{BatchOperation, TransactionalStore, TxFuture};
