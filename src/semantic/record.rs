//! Durable semantic cache records and content hashing.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// One cached inference result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "postgres", derive(sqlx::FromRow))]
pub struct SemanticCacheRecord {
    pub content_hash: String,
    pub model_id: String,
    pub response: serde_json::Value,
    pub confidence: f64,
    pub hit_count: i64,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl SemanticCacheRecord {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// Canonical form of an input before hashing
///
/// Inputs that differ only in surrounding whitespace, runs of whitespace or
/// letter case map to the same record.
pub fn normalize_input(input: &str) -> String {
    input
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Hex SHA-256 of the normalized input and model identifier
pub fn content_hash(input: &str, model_id: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(normalize_input(input).as_bytes());
    hasher.update([0x1f]);
    hasher.update(model_id.as_bytes());
    hex::encode(hasher.finalize())
}
