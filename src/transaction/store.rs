//! Transactional store abstraction.

use super::errors::StoreError;
use super::options::TransactionOptions;
use async_trait::async_trait;
use futures::future::BoxFuture;

/// Future returned by a transaction body borrowing its transaction for `'t`
pub type TxFuture<'t, T> = BoxFuture<'t, Result<T, StoreError>>;

/// One step of a batch, run against the shared transaction
pub type BatchOperation<Tx, T> =
    Box<dyn for<'t> FnOnce(&'t mut Tx) -> TxFuture<'t, T> + Send>;

/// A store that can scope work in atomic transactions
///
/// All atomicity lives here; the runner only sequences begin, body, and
/// commit or rollback.
#[async_trait]
pub trait TransactionalStore: Send + Sync {
    type Tx: Send;

    /// Open a transaction honoring the options' isolation level and timeout
    async fn begin(&self, options: &TransactionOptions) -> Result<Self::Tx, StoreError>;

    async fn commit(&self, tx: Self::Tx) -> Result<(), StoreError>;

    async fn rollback(&self, tx: Self::Tx) -> Result<(), StoreError>;
}
