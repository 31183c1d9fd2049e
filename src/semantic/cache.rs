//! # Semantic Result Cache
//!
//! Avoids repeating expensive inference calls. Results are keyed by a hash of
//! the normalized input and the model identifier, kept in the [`CacheManager`]
//! for fast reads and in a [`SemanticRecordStore`] so they survive restarts.
//! Only results whose confidence meets the configured minimum are stored.

use super::record::{content_hash, SemanticCacheRecord};
use super::store::{SemanticRecordStore, SemanticStoreError};
use crate::cache::CacheManager;
use crate::config::SemanticCacheConfig;
use crate::constants::semantic::NAMESPACE;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Output of a generator call
#[derive(Debug, Clone, PartialEq)]
pub struct Generated<T> {
    pub response: T,
    pub confidence: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SemanticResult<T> {
    pub response: T,
    pub confidence: f64,
    pub from_cache: bool,
}

#[derive(Debug, Error)]
pub enum SemanticCacheError<E> {
    /// The generator failed; nothing was cached
    #[error("Result generation failed: {0}")]
    Generation(E),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SemanticCacheStats {
    pub memory_hits: u64,
    pub durable_hits: u64,
    pub misses: u64,
    pub stored: u64,
    pub skipped_low_confidence: u64,
}

/// Value kept in the cache manager for one record
#[derive(Debug, Serialize, Deserialize)]
struct MemoryEntry {
    response: serde_json::Value,
    confidence: f64,
}

#[derive(Debug, Default)]
struct Counters {
    memory_hits: AtomicU64,
    durable_hits: AtomicU64,
    misses: AtomicU64,
    stored: AtomicU64,
    skipped_low_confidence: AtomicU64,
}

#[derive(Debug)]
pub struct SemanticResultCache {
    cache: Arc<CacheManager>,
    store: Arc<dyn SemanticRecordStore>,
    config: SemanticCacheConfig,
    counters: Counters,
}

impl SemanticResultCache {
    pub fn new(
        cache: Arc<CacheManager>,
        store: Arc<dyn SemanticRecordStore>,
        config: SemanticCacheConfig,
    ) -> Self {
        Self {
            cache,
            store,
            config,
            counters: Counters::default(),
        }
    }

    fn memory_key(hash: &str) -> String {
        format!("{NAMESPACE}:{hash}")
    }

    /// Cached result for `input` under `model_id`, or a freshly generated one
    ///
    /// Cache and store failures are logged and treated as misses; only a
    /// generator failure is returned as an error.
    pub async fn get_or_create<T, E, F, Fut>(
        &self,
        input: &str,
        model_id: &str,
        generator: F,
    ) -> Result<SemanticResult<T>, SemanticCacheError<E>>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Generated<T>, E>>,
    {
        let hash = content_hash(input, model_id);
        let key = Self::memory_key(&hash);

        if let Some(entry) = self.cache.get::<MemoryEntry>(&key).await {
            if let Some(response) = decode::<T>(&hash, entry.response) {
                self.counters.memory_hits.fetch_add(1, Ordering::Relaxed);
                self.record_hit(&hash);
                return Ok(SemanticResult {
                    response,
                    confidence: entry.confidence,
                    from_cache: true,
                });
            }
        }

        if let Some(record) = self.find_live_record(&hash, model_id).await {
            let confidence = record.confidence;
            let remaining = (record.expires_at - Utc::now())
                .to_std()
                .unwrap_or(Duration::ZERO);

            if let Some(response) = decode::<T>(&hash, record.response.clone()) {
                self.remember(&key, record.response, confidence, remaining);
                self.counters.durable_hits.fetch_add(1, Ordering::Relaxed);
                self.record_hit(&hash);
                return Ok(SemanticResult {
                    response,
                    confidence,
                    from_cache: true,
                });
            }
        }

        self.counters.misses.fetch_add(1, Ordering::Relaxed);
        let generated = generator().await.map_err(SemanticCacheError::Generation)?;

        // NaN never meets the threshold
        if generated.confidence >= self.config.min_confidence {
            self.persist(&hash, &key, model_id, &generated).await;
        } else {
            self.counters
                .skipped_low_confidence
                .fetch_add(1, Ordering::Relaxed);
            debug!(
                content_hash = %hash,
                confidence = generated.confidence,
                min_confidence = self.config.min_confidence,
                "Result below confidence threshold, not cached"
            );
        }

        Ok(SemanticResult {
            response: generated.response,
            confidence: generated.confidence,
            from_cache: false,
        })
    }

    async fn find_live_record(&self, hash: &str, model_id: &str) -> Option<SemanticCacheRecord> {
        match self.store.find(hash).await {
            Ok(Some(record)) if record.model_id == model_id && !record.is_expired_at(Utc::now()) => {
                Some(record)
            }
            Ok(_) => None,
            Err(e) => {
                warn!(content_hash = %hash, error = %e, "Semantic store lookup failed, treating as miss");
                None
            }
        }
    }

    async fn persist<T: Serialize>(
        &self,
        hash: &str,
        key: &str,
        model_id: &str,
        generated: &Generated<T>,
    ) {
        let response = match serde_json::to_value(&generated.response) {
            Ok(value) => value,
            Err(e) => {
                warn!(content_hash = %hash, error = %e, "Generated result not serializable, not cached");
                return;
            }
        };

        let ttl = self.config.ttl();
        let now = Utc::now();
        let expires_at = chrono::Duration::from_std(ttl)
            .ok()
            .and_then(|ttl| now.checked_add_signed(ttl))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        let record = SemanticCacheRecord {
            content_hash: hash.to_string(),
            model_id: model_id.to_string(),
            response: response.clone(),
            confidence: generated.confidence,
            hit_count: 0,
            created_at: now,
            expires_at,
        };

        if let Err(e) = self.store.upsert(&record).await {
            warn!(content_hash = %hash, error = %e, "Failed to persist semantic record");
        }
        self.remember(key, response, generated.confidence, ttl);
        self.counters.stored.fetch_add(1, Ordering::Relaxed);

        debug!(content_hash = %hash, confidence = generated.confidence, "Semantic result cached");
    }

    fn remember(&self, key: &str, response: serde_json::Value, confidence: f64, ttl: Duration) {
        let ttl = ttl.min(self.config.memory_ttl());
        let entry = MemoryEntry {
            response,
            confidence,
        };
        if let Err(e) = self.cache.set(key, &entry, Some(ttl)) {
            warn!(key = key, error = %e, "Failed to cache semantic result in memory");
        }
    }

    /// Bump the durable hit counter on a detached task
    fn record_hit(&self, hash: &str) {
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            debug!(content_hash = %hash, "No async runtime, skipping hit count update");
            return;
        };
        let store = Arc::clone(&self.store);
        let hash = hash.to_string();
        handle.spawn(async move {
            if let Err(e) = store.increment_hits(&hash).await {
                warn!(content_hash = %hash, error = %e, "Failed to increment semantic hit count");
            }
        });
    }

    pub fn stats(&self) -> SemanticCacheStats {
        SemanticCacheStats {
            memory_hits: self.counters.memory_hits.load(Ordering::Relaxed),
            durable_hits: self.counters.durable_hits.load(Ordering::Relaxed),
            misses: self.counters.misses.load(Ordering::Relaxed),
            stored: self.counters.stored.load(Ordering::Relaxed),
            skipped_low_confidence: self.counters.skipped_low_confidence.load(Ordering::Relaxed),
        }
    }

    /// Delete expired durable records and purge expired in-memory entries
    pub async fn sweep_expired(&self) -> Result<u64, SemanticStoreError> {
        let deleted = self.store.delete_expired(Utc::now()).await?;
        let purged = self.cache.purge_expired();
        info!(deleted = deleted, purged = purged, "Semantic cache expiry sweep complete");
        Ok(deleted)
    }

    /// Run [`sweep_expired`](Self::sweep_expired) every `interval`
    ///
    /// The task ends once every other handle to the cache is dropped.
    pub fn spawn_expiry_sweep(self: &Arc<Self>, interval: Duration) -> JoinHandle<()> {
        let weak: Weak<Self> = Arc::downgrade(self);

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // First tick completes immediately
            ticker.tick().await;

            loop {
                ticker.tick().await;
                let Some(cache) = weak.upgrade() else {
                    debug!("Semantic cache dropped, stopping expiry sweep");
                    break;
                };
                if let Err(e) = cache.sweep_expired().await {
                    warn!(error = %e, "Semantic cache expiry sweep failed");
                }
            }
        })
    }
}

fn decode<T: DeserializeOwned>(hash: &str, value: serde_json::Value) -> Option<T> {
    match serde_json::from_value(value) {
        Ok(response) => Some(response),
        Err(e) => {
            warn!(content_hash = %hash, error = %e, "Cached semantic result has unexpected shape");
            None
        }
    }
}
