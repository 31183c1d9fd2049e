//! Postgres-backed semantic record store.

use super::record::SemanticCacheRecord;
use super::store::{SemanticRecordStore, SemanticStoreError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tracing::{debug, info};

#[derive(Debug, Clone)]
pub struct PgSemanticRecordStore {
    pool: PgPool,
}

impl PgSemanticRecordStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create the backing table and expiry index if absent
    pub async fn ensure_schema(&self) -> Result<(), SemanticStoreError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS semantic_cache_records (
                content_hash TEXT PRIMARY KEY,
                model_id TEXT NOT NULL,
                response JSONB NOT NULL,
                confidence DOUBLE PRECISION NOT NULL,
                hit_count BIGINT NOT NULL DEFAULT 0,
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                expires_at TIMESTAMPTZ NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_semantic_cache_records_expires_at \
             ON semantic_cache_records (expires_at)",
        )
        .execute(&self.pool)
        .await?;

        info!("Semantic cache schema ready");
        Ok(())
    }
}

#[async_trait]
impl SemanticRecordStore for PgSemanticRecordStore {
    async fn find(
        &self,
        content_hash: &str,
    ) -> Result<Option<SemanticCacheRecord>, SemanticStoreError> {
        let record = sqlx::query_as::<_, SemanticCacheRecord>(
            r#"
            SELECT content_hash, model_id, response, confidence, hit_count, created_at, expires_at
            FROM semantic_cache_records
            WHERE content_hash = $1
            "#,
        )
        .bind(content_hash)
        .fetch_optional(&self.pool)
        .await?;

        Ok(record)
    }

    async fn upsert(&self, record: &SemanticCacheRecord) -> Result<(), SemanticStoreError> {
        sqlx::query(
            r#"
            INSERT INTO semantic_cache_records
                (content_hash, model_id, response, confidence, hit_count, created_at, expires_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (content_hash) DO UPDATE SET
                model_id = EXCLUDED.model_id,
                response = EXCLUDED.response,
                confidence = EXCLUDED.confidence,
                expires_at = EXCLUDED.expires_at
            "#,
        )
        .bind(&record.content_hash)
        .bind(&record.model_id)
        .bind(&record.response)
        .bind(record.confidence)
        .bind(record.hit_count)
        .bind(record.created_at)
        .bind(record.expires_at)
        .execute(&self.pool)
        .await?;

        debug!(content_hash = %record.content_hash, "Semantic record upserted");
        Ok(())
    }

    async fn increment_hits(&self, content_hash: &str) -> Result<(), SemanticStoreError> {
        sqlx::query(
            "UPDATE semantic_cache_records SET hit_count = hit_count + 1 WHERE content_hash = $1",
        )
        .bind(content_hash)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn delete_expired(&self, now: DateTime<Utc>) -> Result<u64, SemanticStoreError> {
        let result = sqlx::query("DELETE FROM semantic_cache_records WHERE expires_at <= $1")
            .bind(now)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}
