//! # Retrying Transaction Runner
//!
//! Runs closures inside store transactions with bounded, classified retries.
//!
//! Each attempt opens a transaction within `max_wait`, runs the body within
//! `timeout`, then commits, or rolls back on failure. Deadlocks and timeouts
//! are retried with exponential backoff up to `max_retries` times; every other
//! failure ends the call immediately.

use super::backoff::BackoffCalculator;
use super::errors::{StoreError, StoreErrorKind, TransactionError};
use super::options::{RetryOptions, TransactionOptions};
use super::store::{BatchOperation, TransactionalStore, TxFuture};
use futures::FutureExt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

/// Progress of one retrying call
#[derive(Debug, Clone, Default)]
pub struct RetryAttempt {
    /// Zero-based index of the current attempt
    pub index: u32,
    pub last_error: Option<StoreError>,
    pub next_delay: Option<Duration>,
}

#[derive(Debug)]
pub struct RetryingTransactionRunner<S: TransactionalStore> {
    store: Arc<S>,
    transaction_options: TransactionOptions,
    retry_options: RetryOptions,
}

impl<S: TransactionalStore> Clone for RetryingTransactionRunner<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            transaction_options: self.transaction_options,
            retry_options: self.retry_options,
        }
    }
}

impl<S: TransactionalStore> RetryingTransactionRunner<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self {
            store,
            transaction_options: TransactionOptions::default(),
            retry_options: RetryOptions::default(),
        }
    }

    /// Override the options used by the `*_default` conveniences
    pub fn with_defaults(
        mut self,
        transaction_options: TransactionOptions,
        retry_options: RetryOptions,
    ) -> Self {
        self.transaction_options = transaction_options;
        self.retry_options = retry_options;
        self
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn transaction_options(&self) -> &TransactionOptions {
        &self.transaction_options
    }

    pub fn retry_options(&self) -> &RetryOptions {
        &self.retry_options
    }

    /// Run `operation` once inside a transaction
    pub async fn with_transaction<T, F>(
        &self,
        operation: F,
        options: &TransactionOptions,
    ) -> Result<T, TransactionError>
    where
        T: Send,
        F: for<'t> FnOnce(&'t mut S::Tx) -> TxFuture<'t, T> + Send,
    {
        self.attempt(operation, options)
            .await
            .map_err(|e| TransactionError::from_store(e, 1))
    }

    /// Run `operation` in a transaction, retrying deadlocks and timeouts
    ///
    /// Makes at most `max_retries + 1` attempts.
    pub async fn with_retryable_transaction<T, F>(
        &self,
        mut operation: F,
        transaction_options: &TransactionOptions,
        retry_options: &RetryOptions,
    ) -> Result<T, TransactionError>
    where
        T: Send,
        F: for<'t> FnMut(&'t mut S::Tx) -> TxFuture<'t, T> + Send,
    {
        let backoff = BackoffCalculator::new(retry_options);
        let mut attempt = RetryAttempt::default();

        loop {
            match self.attempt(&mut operation, transaction_options).await {
                Ok(value) => {
                    if attempt.index > 0 {
                        info!(attempts = attempt.index + 1, "Transaction succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(e) => {
                    let attempts = attempt.index + 1;

                    if !e.is_retryable() {
                        error!(attempts = attempts, error = %e, "Transaction failed with non-retryable error");
                        return Err(TransactionError::from_store(e, attempts));
                    }
                    if attempt.index >= retry_options.max_retries {
                        error!(
                            attempts = attempts,
                            max_retries = retry_options.max_retries,
                            error = %e,
                            "Transaction retries exhausted"
                        );
                        return Err(TransactionError::from_store(e, attempts));
                    }

                    let delay = backoff.delay_for(attempt.index);
                    warn!(
                        attempt = attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Retryable transaction failure, backing off"
                    );

                    attempt.last_error = Some(e);
                    attempt.next_delay = Some(delay);
                    tokio::time::sleep(delay).await;
                    attempt.index += 1;
                }
            }
        }
    }

    /// [`with_retryable_transaction`](Self::with_retryable_transaction) using the runner's defaults
    pub async fn with_retryable_transaction_default<T, F>(
        &self,
        operation: F,
    ) -> Result<T, TransactionError>
    where
        T: Send,
        F: for<'t> FnMut(&'t mut S::Tx) -> TxFuture<'t, T> + Send,
    {
        let transaction_options = self.transaction_options;
        let retry_options = self.retry_options;
        self.with_retryable_transaction(operation, &transaction_options, &retry_options)
            .await
    }

    /// Run every operation in order inside one transaction
    ///
    /// The first failure rolls back the whole batch.
    pub async fn batch_operations<T>(
        &self,
        operations: Vec<BatchOperation<S::Tx, T>>,
        options: &TransactionOptions,
    ) -> Result<Vec<T>, TransactionError>
    where
        T: Send + 'static,
    {
        let count = operations.len();
        let results = self
            .with_transaction(
                move |tx| {
                    async move {
                        let mut results = Vec::with_capacity(operations.len());
                        for operation in operations {
                            results.push(operation(&mut *tx).await?);
                        }
                        Ok(results)
                    }
                    .boxed()
                },
                options,
            )
            .await?;

        debug!(operations = count, "Batch transaction committed");
        Ok(results)
    }

    /// Run `operation` only if `predicate` holds
    ///
    /// A false predicate returns `Ok(None)` without opening a transaction.
    pub async fn conditional_transaction<T, P, PF, F>(
        &self,
        predicate: P,
        operation: F,
        options: &TransactionOptions,
    ) -> Result<Option<T>, TransactionError>
    where
        T: Send,
        P: FnOnce() -> PF + Send,
        PF: Future<Output = Result<bool, StoreError>> + Send,
        F: for<'t> FnOnce(&'t mut S::Tx) -> TxFuture<'t, T> + Send,
    {
        match predicate().await {
            Ok(true) => self.with_transaction(operation, options).await.map(Some),
            Ok(false) => {
                debug!("Transaction predicate false, skipping");
                Ok(None)
            }
            Err(e) => Err(TransactionError::from_store(e, 0)),
        }
    }

    async fn attempt<T, F>(&self, operation: F, options: &TransactionOptions) -> Result<T, StoreError>
    where
        F: for<'t> FnOnce(&'t mut S::Tx) -> TxFuture<'t, T>,
    {
        let mut tx = match timeout(options.max_wait, self.store.begin(options)).await {
            Ok(begun) => begun?,
            Err(_) => {
                return Err(StoreError::new(
                    StoreErrorKind::ConnectionTimeout,
                    format!(
                        "timed out after {}ms waiting to begin transaction",
                        options.max_wait.as_millis()
                    ),
                ))
            }
        };

        let outcome = match timeout(options.timeout, operation(&mut tx)).await {
            Ok(result) => result,
            Err(_) => Err(StoreError::new(
                StoreErrorKind::TransactionTimeout,
                format!(
                    "transaction exceeded {}ms timeout",
                    options.timeout.as_millis()
                ),
            )),
        };

        match outcome {
            Ok(value) => {
                self.store.commit(tx).await?;
                Ok(value)
            }
            Err(e) => {
                if let Err(rollback_error) = self.store.rollback(tx).await {
                    warn!(error = %rollback_error, "Rollback failed");
                }
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{ScriptedTransactionalStore, ScriptedTx};
    use std::sync::atomic::{AtomicU32, Ordering};

    fn runner() -> (Arc<ScriptedTransactionalStore>, RetryingTransactionRunner<ScriptedTransactionalStore>) {
        let store = Arc::new(ScriptedTransactionalStore::new());
        (Arc::clone(&store), RetryingTransactionRunner::new(store))
    }

    fn stage<'t>(tx: &'t mut ScriptedTx, entry: &'static str) -> TxFuture<'t, usize> {
        async move {
            tx.write(entry);
            Ok(tx.writes.len())
        }
        .boxed()
    }

    #[tokio::test]
    async fn test_with_transaction_commits() {
        let (store, runner) = runner();

        let staged = runner
            .with_transaction(|tx| stage(tx, "credit:42"), &TransactionOptions::default())
            .await
            .unwrap();

        assert_eq!(staged, 1);
        assert_eq!(store.committed(), vec!["credit:42"]);
        assert_eq!(
            store.last_options().map(|o| o.isolation_level),
            Some(crate::transaction::IsolationLevel::ReadCommitted)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_persistent_deadlock_makes_exactly_four_attempts() {
        let (store, runner) = runner();
        let calls = AtomicU32::new(0);

        let result: Result<(), _> = runner
            .with_retryable_transaction(
                |_tx| {
                    calls.fetch_add(1, Ordering::SeqCst);
                    async { Err(StoreError::from_sqlstate("40P01", "deadlock detected")) }.boxed()
                },
                &TransactionOptions::default(),
                &RetryOptions::default(),
            )
            .await;

        let err = result.unwrap_err();
        assert!(matches!(err, TransactionError::Deadlock { attempts: 4, .. }));
        assert_eq!(calls.load(Ordering::SeqCst), 4);
        assert_eq!(store.rollbacks(), 4);
        assert_eq!(store.commits(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_backoff_delays_between_attempts() {
        let (_store, runner) = runner();
        let started = tokio::time::Instant::now();

        let _: Result<(), _> = runner
            .with_retryable_transaction(
                |_tx| async { Err(StoreError::deadlock("deadlock")) }.boxed(),
                &TransactionOptions::default(),
                &RetryOptions::default(),
            )
            .await;

        // 100 + 200 + 400
        assert_eq!(started.elapsed(), Duration::from_millis(700));
    }

    #[tokio::test(start_paused = true)]
    async fn test_recovers_after_transient_failure() {
        let (store, runner) = runner();
        let calls = AtomicU32::new(0);

        let value = runner
            .with_retryable_transaction(
                |tx| {
                    let call = calls.fetch_add(1, Ordering::SeqCst);
                    async move {
                        if call == 0 {
                            return Err(StoreError::from_sqlstate("57014", "statement timeout"));
                        }
                        tx.write("order:7");
                        Ok("done")
                    }
                    .boxed()
                },
                &TransactionOptions::default(),
                &RetryOptions::default(),
            )
            .await
            .unwrap();

        assert_eq!(value, "done");
        assert_eq!(store.committed(), vec!["order:7"]);
        assert_eq!(store.begins(), 2);
    }

    #[tokio::test]
    async fn test_fatal_error_is_not_retried() {
        let (store, runner) = runner();

        let result: Result<(), _> = runner
            .with_retryable_transaction(
                |_tx| async { Err(StoreError::from_sqlstate("23505", "duplicate key")) }.boxed(),
                &TransactionOptions::default(),
                &RetryOptions::default(),
            )
            .await;

        assert!(matches!(
            result.unwrap_err(),
            TransactionError::Failed { attempts: 1, .. }
        ));
        assert_eq!(store.begins(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_body_timeout_is_retryable_timeout() {
        let (store, runner) = runner();
        let options = TransactionOptions {
            timeout: Duration::from_millis(50),
            ..TransactionOptions::default()
        };
        let retry = RetryOptions {
            max_retries: 1,
            ..RetryOptions::default()
        };

        let result: Result<(), _> = runner
            .with_retryable_transaction(
                |_tx| {
                    async {
                        tokio::time::sleep(Duration::from_secs(1)).await;
                        Ok(())
                    }
                    .boxed()
                },
                &options,
                &retry,
            )
            .await;

        let err = result.unwrap_err();
        assert!(matches!(err, TransactionError::Timeout { attempts: 2, .. }));
        assert_eq!(err.store_error().kind, StoreErrorKind::TransactionTimeout);
        assert_eq!(store.rollbacks(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_begin_hits_max_wait() {
        let store = Arc::new(ScriptedTransactionalStore::new().with_begin_delay(Duration::from_secs(10)));
        let runner = RetryingTransactionRunner::new(Arc::clone(&store));

        let result = runner
            .with_transaction(|tx| stage(tx, "never"), &TransactionOptions::default())
            .await;

        let err = result.unwrap_err();
        assert_eq!(err.store_error().kind, StoreErrorKind::ConnectionTimeout);
        assert!(store.committed().is_empty());
    }

    #[tokio::test]
    async fn test_commit_deadlock_is_retried() {
        let (store, runner) = runner();
        store.fail_next_commit(StoreError::from_sqlstate("40001", "could not serialize access"));

        let result = runner
            .with_retryable_transaction(
                |tx| stage(tx, "ledger:1"),
                &TransactionOptions::default(),
                &RetryOptions {
                    base_delay: Duration::from_millis(1),
                    max_delay: Duration::from_millis(1),
                    ..RetryOptions::default()
                },
            )
            .await;

        assert_eq!(result.unwrap(), 1);
        assert_eq!(store.committed(), vec!["ledger:1"]);
    }

    #[tokio::test]
    async fn test_batch_operations_share_one_transaction() {
        let (store, runner) = runner();

        let operations: Vec<BatchOperation<ScriptedTx, usize>> = vec![
            Box::new(|tx| stage(tx, "debit:alice")),
            Box::new(|tx| stage(tx, "credit:bob")),
        ];

        let results = runner
            .batch_operations(operations, &TransactionOptions::default())
            .await
            .unwrap();

        assert_eq!(results, vec![1, 2]);
        assert_eq!(store.begins(), 1);
        assert_eq!(store.committed(), vec!["debit:alice", "credit:bob"]);
    }

    #[tokio::test]
    async fn test_batch_failure_rolls_back_everything() {
        let (store, runner) = runner();

        let operations: Vec<BatchOperation<ScriptedTx, usize>> = vec![
            Box::new(|tx| stage(tx, "debit:alice")),
            Box::new(|_tx| async { Err(StoreError::constraint("insufficient balance")) }.boxed()),
        ];

        let result = runner
            .batch_operations(operations, &TransactionOptions::default())
            .await;

        assert!(result.is_err());
        assert!(store.committed().is_empty());
        assert_eq!(store.rollbacks(), 1);
    }

    #[tokio::test]
    async fn test_conditional_transaction_skips_when_false() {
        let (store, runner) = runner();

        let skipped = runner
            .conditional_transaction(
                || async { Ok(false) },
                |tx| stage(tx, "x"),
                &TransactionOptions::default(),
            )
            .await
            .unwrap();
        assert_eq!(skipped, None);
        assert_eq!(store.begins(), 0);

        let ran = runner
            .conditional_transaction(
                || async { Ok(true) },
                |tx| stage(tx, "y"),
                &TransactionOptions::default(),
            )
            .await
            .unwrap();
        assert_eq!(ran, Some(1));
        assert_eq!(store.committed(), vec!["y"]);
    }
}
