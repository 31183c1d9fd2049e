//! Durable record store abstraction and the in-memory implementation.

use super::record::SemanticCacheRecord;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SemanticStoreError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Record serialization error: {0}")]
    Serialization(String),
}

#[cfg(feature = "postgres")]
impl From<sqlx::Error> for SemanticStoreError {
    fn from(err: sqlx::Error) -> Self {
        Self::Database(err.to_string())
    }
}

impl From<serde_json::Error> for SemanticStoreError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

/// Persistence for semantic records, surviving process restarts
#[async_trait]
pub trait SemanticRecordStore: Send + Sync + std::fmt::Debug {
    /// Record for `content_hash`, expired or not
    async fn find(
        &self,
        content_hash: &str,
    ) -> Result<Option<SemanticCacheRecord>, SemanticStoreError>;

    /// Insert, or replace the payload of an existing record
    async fn upsert(&self, record: &SemanticCacheRecord) -> Result<(), SemanticStoreError>;

    /// Atomically add one to the record's hit counter
    async fn increment_hits(&self, content_hash: &str) -> Result<(), SemanticStoreError>;

    /// Remove records expired at `now`, returning how many were removed
    async fn delete_expired(&self, now: DateTime<Utc>) -> Result<u64, SemanticStoreError>;
}

#[derive(Debug, Default)]
pub struct InMemorySemanticRecordStore {
    records: DashMap<String, SemanticCacheRecord>,
}

impl InMemorySemanticRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[async_trait]
impl SemanticRecordStore for InMemorySemanticRecordStore {
    async fn find(
        &self,
        content_hash: &str,
    ) -> Result<Option<SemanticCacheRecord>, SemanticStoreError> {
        Ok(self.records.get(content_hash).map(|r| r.clone()))
    }

    async fn upsert(&self, record: &SemanticCacheRecord) -> Result<(), SemanticStoreError> {
        self.records
            .entry(record.content_hash.clone())
            .and_modify(|existing| {
                existing.model_id = record.model_id.clone();
                existing.response = record.response.clone();
                existing.confidence = record.confidence;
                existing.expires_at = record.expires_at;
            })
            .or_insert_with(|| record.clone());
        Ok(())
    }

    async fn increment_hits(&self, content_hash: &str) -> Result<(), SemanticStoreError> {
        if let Some(mut record) = self.records.get_mut(content_hash) {
            record.hit_count += 1;
        }
        Ok(())
    }

    async fn delete_expired(&self, now: DateTime<Utc>) -> Result<u64, SemanticStoreError> {
        let before = self.records.len();
        self.records.retain(|_, record| !record.is_expired_at(now));
        Ok(before.saturating_sub(self.records.len()) as u64)
    }
}
