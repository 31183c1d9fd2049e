//! Distributed cache client trait

use super::errors::CacheResult;
use async_trait::async_trait;
use std::time::Duration;

/// A tier-2 hit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DistributedEntry {
    pub value: String,
    /// Time left before the backend expires the key; `None` when it never does
    pub remaining_ttl: Option<Duration>,
}

impl DistributedEntry {
    pub fn new(value: impl Into<String>, remaining_ttl: Option<Duration>) -> Self {
        Self {
            value: value.into(),
            remaining_ttl,
        }
    }
}

/// Operations against the optional tier-2 key-value store
///
/// Implementations report backend failures as errors; the
/// [`CacheManager`](super::CacheManager) decides that they degrade to misses.
#[async_trait]
pub trait DistributedCacheClient: Send + Sync + std::fmt::Debug {
    /// Returns `Ok(Some(entry))` on hit, `Ok(None)` on miss.
    async fn get(&self, key: &str) -> CacheResult<Option<DistributedEntry>>;

    /// Store `value` expiring after `ttl`, at millisecond precision
    async fn set(&self, key: &str, value: &str, ttl: Duration) -> CacheResult<()>;

    async fn delete(&self, key: &str) -> CacheResult<()>;

    /// Delete all keys matching a glob pattern, returning how many were removed
    async fn delete_pattern(&self, pattern: &str) -> CacheResult<u64>;

    async fn health_check(&self) -> CacheResult<bool>;

    fn provider_name(&self) -> &'static str;
}
