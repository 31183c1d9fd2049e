//! # Cache Manager
//!
//! Composes the in-process [`CacheEntryStore`] (tier 1) with an optional
//! [`DistributedCacheClient`] (tier 2).
//!
//! - Reads check tier 1, then tier 2, and back-fill tier 1 on a tier-2 hit
//!   for no longer than the entry has left in tier 2.
//! - Writes land in tier 1 before returning; the tier-2 write runs as a
//!   detached task whose failure is only logged.
//! - Tier-2 errors (including an open circuit) are misses, never failures.
//!
//! Tier 1 and tier 2 may briefly disagree after concurrent writes.

use super::entry_store::CacheEntryStore;
use super::errors::{CacheError, CacheResult};
use super::traits::{DistributedCacheClient, DistributedEntry};
use crate::config::CacheConfig;
use crate::resilience::CircuitBreaker;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Point-in-time cache counters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    /// Entries resident in tier 1
    pub size: usize,
    /// Approximate bytes resident in tier 1
    pub bytes: usize,
    pub hit_rate: f64,
}

#[derive(Debug)]
pub struct CacheManager {
    local: CacheEntryStore,
    distributed: Option<Arc<dyn DistributedCacheClient>>,
    breaker: Option<Arc<CircuitBreaker>>,
    default_ttl: Duration,
    key_prefix: String,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl CacheManager {
    /// Tier-1 only manager
    pub fn new(config: &CacheConfig) -> Self {
        Self {
            local: CacheEntryStore::new(config.max_entries, config.max_bytes),
            distributed: None,
            breaker: None,
            default_ttl: config.default_ttl(),
            key_prefix: config.key_prefix.clone(),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    pub fn with_distributed(mut self, client: Arc<dyn DistributedCacheClient>) -> Self {
        debug!(provider = client.provider_name(), "Distributed cache tier attached");
        self.distributed = Some(client);
        self
    }

    /// Route every tier-2 call through `breaker`
    pub fn with_circuit_breaker(mut self, breaker: Arc<CircuitBreaker>) -> Self {
        self.breaker = Some(breaker);
        self
    }

    pub fn has_distributed_tier(&self) -> bool {
        self.distributed.is_some()
    }

    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    /// Look up `key`, returning `None` on miss
    ///
    /// A value that no longer deserializes as `T` is dropped from tier 1 and
    /// reported as a miss.
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let local = self.local.get(key);
        self.resolve(key, local).await
    }

    /// Like [`get`](Self::get), but serves expired tier-1 entries that have not been purged yet
    pub async fn get_allow_stale<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let local = self.local.get_allow_stale(key);
        self.resolve(key, local).await
    }

    async fn resolve<T: DeserializeOwned>(&self, key: &str, local: Option<String>) -> Option<T> {
        if let Some(raw) = local {
            match serde_json::from_str(&raw) {
                Ok(value) => {
                    self.hits.fetch_add(1, Ordering::Relaxed);
                    debug!(key = key, tier = 1, "Cache HIT");
                    return Some(value);
                }
                Err(e) => {
                    warn!(key = key, error = %e, "Cached value failed to deserialize, dropping");
                    self.local.delete(key);
                }
            }
        }

        if let Some(entry) = self.read_distributed(key).await {
            match serde_json::from_str(&entry.value) {
                Ok(value) => {
                    let ttl = entry
                        .remaining_ttl
                        .map_or(self.default_ttl, |left| left.min(self.default_ttl));
                    self.local.set(key, entry.value, ttl);
                    self.hits.fetch_add(1, Ordering::Relaxed);
                    debug!(key = key, tier = 2, "Cache HIT");
                    return Some(value);
                }
                Err(e) => {
                    warn!(key = key, error = %e, "Distributed value failed to deserialize");
                }
            }
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        debug!(key = key, "Cache MISS");
        None
    }

    /// Store `value` under `key` for `ttl` (or the default TTL)
    ///
    /// Only serialization can fail. The tier-2 write is detached and skipped
    /// when no Tokio runtime is available.
    pub fn set<T: Serialize + ?Sized>(
        &self,
        key: &str,
        value: &T,
        ttl: Option<Duration>,
    ) -> CacheResult<()> {
        let raw = serde_json::to_string(value)?;
        let ttl = ttl.unwrap_or(self.default_ttl);

        self.local.set(key, raw.clone(), ttl);

        if let Some(client) = &self.distributed {
            let client = Arc::clone(client);
            let breaker = self.breaker.clone();
            let full_key = self.distributed_key(key);

            match tokio::runtime::Handle::try_current() {
                Ok(handle) => {
                    handle.spawn(async move {
                        let result = guarded(breaker.as_deref(), || {
                            client.set(&full_key, &raw, ttl)
                        })
                        .await;
                        if let Err(e) = result {
                            warn!(key = %full_key, error = %e, "Distributed cache write failed");
                        }
                    });
                }
                Err(_) => {
                    debug!(key = key, "No async runtime, skipping distributed cache write");
                }
            }
        }

        Ok(())
    }

    /// Remove `key` from both tiers; returns whether tier 1 held it
    pub async fn delete(&self, key: &str) -> bool {
        let removed = self.local.delete(key);

        if let Some(client) = &self.distributed {
            let full_key = self.distributed_key(key);
            if let Err(e) = guarded(self.breaker.as_deref(), || client.delete(&full_key)).await {
                warn!(key = %full_key, error = %e, "Distributed cache delete failed");
            }
        }

        removed
    }

    /// Remove every key under `namespace`, or everything when `None`
    ///
    /// Returns the number of tier-1 entries removed.
    pub async fn clear(&self, namespace: Option<&str>) -> usize {
        let (removed, pattern) = match namespace {
            Some(ns) => {
                let prefix = format!("{ns}{}", crate::constants::cache::NAMESPACE_SEPARATOR);
                (
                    self.local.clear_prefix(&prefix),
                    format!("{}*", self.distributed_key(&prefix)),
                )
            }
            None => (self.local.clear(), format!("{}:*", self.key_prefix)),
        };

        if let Some(client) = &self.distributed {
            match guarded(self.breaker.as_deref(), || client.delete_pattern(&pattern)).await {
                Ok(deleted) => debug!(pattern = %pattern, deleted = deleted, "Distributed cache cleared"),
                Err(e) => warn!(pattern = %pattern, error = %e, "Distributed cache clear failed"),
            }
        }

        removed
    }

    /// Drop expired tier-1 entries
    pub fn purge_expired(&self) -> usize {
        self.local.purge_expired()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.local.contains(key)
    }

    pub fn stats(&self) -> CacheStats {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let lookups = hits + misses;

        CacheStats {
            hits,
            misses,
            evictions: self.local.evictions(),
            size: self.local.len(),
            bytes: self.local.bytes(),
            hit_rate: if lookups > 0 {
                hits as f64 / lookups as f64
            } else {
                0.0
            },
        }
    }

    /// Whether tier 2 is configured and reachable
    pub async fn health_check(&self) -> bool {
        let Some(client) = &self.distributed else {
            return false;
        };

        match guarded(self.breaker.as_deref(), || client.health_check()).await {
            Ok(healthy) => healthy,
            Err(e) => {
                warn!(provider = client.provider_name(), error = %e, "Distributed cache health check failed");
                false
            }
        }
    }

    fn distributed_key(&self, key: &str) -> String {
        format!("{}:{}", self.key_prefix, key)
    }

    /// A tier-2 hit with no lifetime left is a miss
    async fn read_distributed(&self, key: &str) -> Option<DistributedEntry> {
        let client = self.distributed.as_ref()?;
        let full_key = self.distributed_key(key);

        match guarded(self.breaker.as_deref(), || client.get(&full_key)).await {
            Ok(entry) => entry.filter(|e| e.remaining_ttl != Some(Duration::ZERO)),
            Err(e) => {
                warn!(key = %full_key, error = %e, "Distributed cache read failed, treating as miss");
                None
            }
        }
    }
}

/// Run a tier-2 call, through the breaker when one is attached
async fn guarded<T, F, Fut>(breaker: Option<&CircuitBreaker>, operation: F) -> CacheResult<T>
where
    F: FnOnce() -> Fut,
    Fut: std::future::Future<Output = CacheResult<T>>,
{
    match breaker {
        Some(breaker) => breaker.execute(operation).await.map_err(CacheError::from),
        None => operation().await,
    }
}
