//! # Test Utilities
//!
//! Doubles for the seams of the layer. Available to unit tests and, with the
//! `test-utils` feature, to downstream crates.

use crate::transaction::{StoreError, TransactionOptions, TransactionalStore};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

/// Install a test-friendly subscriber once; later calls are no-ops
pub fn init_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_test_writer()
        .try_init();
}

/// Transaction handle of [`ScriptedTransactionalStore`]
#[derive(Debug, Default)]
pub struct ScriptedTx {
    /// Writes staged by the transaction body
    pub writes: Vec<String>,
}

impl ScriptedTx {
    pub fn write(&mut self, entry: impl Into<String>) {
        self.writes.push(entry.into());
    }
}

/// In-memory transactional store with scripted failures
///
/// Staged writes become visible in [`committed`](Self::committed) only when
/// the transaction commits.
#[derive(Debug, Default)]
pub struct ScriptedTransactionalStore {
    begin_failures: Mutex<VecDeque<StoreError>>,
    commit_failures: Mutex<VecDeque<StoreError>>,
    begin_delay: Option<Duration>,
    committed: Mutex<Vec<String>>,
    last_options: Mutex<Option<TransactionOptions>>,
    begins: AtomicU32,
    commits: AtomicU32,
    rollbacks: AtomicU32,
}

impl ScriptedTransactionalStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every `begin` by `delay`
    pub fn with_begin_delay(mut self, delay: Duration) -> Self {
        self.begin_delay = Some(delay);
        self
    }

    /// Fail the next `begin` with `error`
    pub fn fail_next_begin(&self, error: StoreError) {
        self.begin_failures.lock().push_back(error);
    }

    /// Fail the next `commit` with `error`
    pub fn fail_next_commit(&self, error: StoreError) {
        self.commit_failures.lock().push_back(error);
    }

    pub fn committed(&self) -> Vec<String> {
        self.committed.lock().clone()
    }

    pub fn last_options(&self) -> Option<TransactionOptions> {
        *self.last_options.lock()
    }

    pub fn begins(&self) -> u32 {
        self.begins.load(Ordering::SeqCst)
    }

    pub fn commits(&self) -> u32 {
        self.commits.load(Ordering::SeqCst)
    }

    pub fn rollbacks(&self) -> u32 {
        self.rollbacks.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TransactionalStore for ScriptedTransactionalStore {
    type Tx = ScriptedTx;

    async fn begin(&self, options: &TransactionOptions) -> Result<Self::Tx, StoreError> {
        self.begins.fetch_add(1, Ordering::SeqCst);
        *self.last_options.lock() = Some(*options);

        if let Some(delay) = self.begin_delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(error) = self.begin_failures.lock().pop_front() {
            return Err(error);
        }
        Ok(ScriptedTx::default())
    }

    async fn commit(&self, tx: Self::Tx) -> Result<(), StoreError> {
        if let Some(error) = self.commit_failures.lock().pop_front() {
            self.rollbacks.fetch_add(1, Ordering::SeqCst);
            return Err(error);
        }
        self.commits.fetch_add(1, Ordering::SeqCst);
        self.committed.lock().extend(tx.writes);
        Ok(())
    }

    async fn rollback(&self, _tx: Self::Tx) -> Result<(), StoreError> {
        self.rollbacks.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
