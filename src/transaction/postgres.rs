//! Postgres transactional store.

use super::errors::StoreError;
use super::options::TransactionOptions;
use super::store::TransactionalStore;
use async_trait::async_trait;
use sqlx::{PgPool, Postgres, Transaction};
use tracing::debug;

#[derive(Debug, Clone)]
pub struct PgTransactionalStore {
    pool: PgPool,
}

impl PgTransactionalStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl TransactionalStore for PgTransactionalStore {
    type Tx = Transaction<'static, Postgres>;

    async fn begin(&self, options: &TransactionOptions) -> Result<Self::Tx, StoreError> {
        let mut tx = self.pool.begin().await?;

        let isolation = format!(
            "SET TRANSACTION ISOLATION LEVEL {}",
            options.isolation_level.as_sql()
        );
        sqlx::query(&isolation).execute(&mut *tx).await?;

        let statement_timeout = format!(
            "SET LOCAL statement_timeout = {}",
            options.timeout.as_millis()
        );
        sqlx::query(&statement_timeout).execute(&mut *tx).await?;

        debug!(
            isolation_level = %options.isolation_level,
            timeout_ms = options.timeout.as_millis() as u64,
            "Transaction opened"
        );
        Ok(tx)
    }

    async fn commit(&self, tx: Self::Tx) -> Result<(), StoreError> {
        tx.commit().await.map_err(StoreError::from)
    }

    async fn rollback(&self, tx: Self::Tx) -> Result<(), StoreError> {
        tx.rollback().await.map_err(StoreError::from)
    }
}
