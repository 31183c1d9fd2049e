//! # Tier-1 Cache Entry Store
//!
//! In-process cache with least-recently-used eviction, bounded by both entry
//! count and approximate aggregate byte size, with a time-to-live per entry.
//!
//! Every operation takes the store lock once, so a reader never observes a
//! half-applied write. Expired entries are never returned by [`get`] but stay
//! resident until purged or evicted, which is what lets [`get_allow_stale`]
//! serve them.
//!
//! [`get`]: CacheEntryStore::get
//! [`get_allow_stale`]: CacheEntryStore::get_allow_stale

use crate::constants::cache::ENTRY_OVERHEAD_BYTES;
use lru::LruCache;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

#[derive(Debug, Clone)]
struct CacheEntry {
    value: String,
    inserted_at: Instant,
    ttl: Duration,
    size: usize,
}

impl CacheEntry {
    fn is_expired_at(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.inserted_at) >= self.ttl
    }
}

#[derive(Debug)]
struct StoreInner {
    entries: LruCache<String, CacheEntry>,
    bytes: usize,
}

impl StoreInner {
    fn remove(&mut self, key: &str) -> Option<CacheEntry> {
        let entry = self.entries.pop(key)?;
        self.bytes = self.bytes.saturating_sub(entry.size);
        Some(entry)
    }
}

/// Bounded LRU store of serialized values
#[derive(Debug)]
pub struct CacheEntryStore {
    inner: Mutex<StoreInner>,
    max_entries: usize,
    max_bytes: usize,
    evictions: AtomicU64,
}

impl CacheEntryStore {
    pub fn new(max_entries: usize, max_bytes: usize) -> Self {
        Self {
            inner: Mutex::new(StoreInner {
                entries: LruCache::unbounded(),
                bytes: 0,
            }),
            max_entries: max_entries.max(1),
            max_bytes,
            evictions: AtomicU64::new(0),
        }
    }

    /// Approximate memory charged for one entry
    pub fn entry_size(key: &str, value: &str) -> usize {
        key.len() + value.len() + ENTRY_OVERHEAD_BYTES
    }

    /// Fresh value for `key`, marking it most recently used
    pub fn get(&self, key: &str) -> Option<String> {
        let now = Instant::now();
        let mut inner = self.inner.lock();

        if inner.entries.peek(key)?.is_expired_at(now) {
            return None;
        }
        inner.entries.get(key).map(|entry| entry.value.clone())
    }

    /// Value for `key` even if its TTL has passed, as long as it was not purged
    pub fn get_allow_stale(&self, key: &str) -> Option<String> {
        self.inner
            .lock()
            .entries
            .get(key)
            .map(|entry| entry.value.clone())
    }

    pub fn contains(&self, key: &str) -> bool {
        let now = Instant::now();
        self.inner
            .lock()
            .entries
            .peek(key)
            .is_some_and(|entry| !entry.is_expired_at(now))
    }

    /// Insert or replace `key`, evicting least recently used entries to fit
    ///
    /// Returns `false` when the entry alone exceeds the byte budget; any
    /// previous value under `key` is dropped in that case.
    pub fn set(&self, key: &str, value: String, ttl: Duration) -> bool {
        let size = Self::entry_size(key, &value);
        let mut inner = self.inner.lock();

        if size > self.max_bytes {
            inner.remove(key);
            warn!(
                key = key,
                size_bytes = size,
                max_bytes = self.max_bytes,
                "Cache entry exceeds byte budget, not stored"
            );
            return false;
        }

        let entry = CacheEntry {
            value,
            inserted_at: Instant::now(),
            ttl,
            size,
        };

        if let Some((_, replaced)) = inner.entries.push(key.to_string(), entry) {
            inner.bytes = inner.bytes.saturating_sub(replaced.size);
        }
        inner.bytes += size;

        let mut evicted = 0_u64;
        while inner.entries.len() > self.max_entries || inner.bytes > self.max_bytes {
            let Some((evicted_key, entry)) = inner.entries.pop_lru() else {
                break;
            };
            inner.bytes = inner.bytes.saturating_sub(entry.size);
            evicted += 1;
            debug!(key = %evicted_key, "Evicted least recently used cache entry");
        }

        if evicted > 0 {
            self.evictions.fetch_add(evicted, Ordering::Relaxed);
        }
        true
    }

    pub fn delete(&self, key: &str) -> bool {
        self.inner.lock().remove(key).is_some()
    }

    /// Remove every key starting with `prefix`, returning the count removed
    pub fn clear_prefix(&self, prefix: &str) -> usize {
        let mut inner = self.inner.lock();
        let keys: Vec<String> = inner
            .entries
            .iter()
            .filter(|(key, _)| key.starts_with(prefix))
            .map(|(key, _)| key.clone())
            .collect();

        for key in &keys {
            inner.remove(key);
        }
        keys.len()
    }

    pub fn clear(&self) -> usize {
        let mut inner = self.inner.lock();
        let removed = inner.entries.len();
        inner.entries.clear();
        inner.bytes = 0;
        removed
    }

    /// Drop every expired entry, returning the count removed
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut inner = self.inner.lock();
        let expired: Vec<String> = inner
            .entries
            .iter()
            .filter(|(_, entry)| entry.is_expired_at(now))
            .map(|(key, _)| key.clone())
            .collect();

        for key in &expired {
            inner.remove(key);
        }
        expired.len()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().entries.is_empty()
    }

    /// Approximate bytes currently charged
    pub fn bytes(&self) -> usize {
        self.inner.lock().bytes
    }

    pub fn evictions(&self) -> u64 {
        self.evictions.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINUTE: Duration = Duration::from_secs(60);

    #[tokio::test(start_paused = true)]
    async fn test_entry_visible_until_ttl_then_miss() {
        let store = CacheEntryStore::new(10, 1024 * 1024);
        store.set("k", "\"v\"".to_string(), Duration::from_secs(5));

        tokio::time::advance(Duration::from_millis(4_999)).await;
        assert_eq!(store.get("k").as_deref(), Some("\"v\""));

        tokio::time::advance(Duration::from_millis(1)).await;
        assert_eq!(store.get("k"), None);
        assert!(!store.contains("k"));

        // Still resident until purged
        assert_eq!(store.get_allow_stale("k").as_deref(), Some("\"v\""));
        assert_eq!(store.purge_expired(), 1);
        assert_eq!(store.get_allow_stale("k"), None);
    }

    #[test]
    fn test_lru_eviction_by_count() {
        let store = CacheEntryStore::new(2, 1024 * 1024);

        store.set("a", "1".to_string(), MINUTE);
        store.set("b", "2".to_string(), MINUTE);
        // Touch a so b becomes least recently used
        assert!(store.get("a").is_some());
        store.set("c", "3".to_string(), MINUTE);

        assert!(store.contains("a"));
        assert!(!store.contains("b"));
        assert!(store.contains("c"));
        assert_eq!(store.evictions(), 1);
    }

    #[test]
    fn test_eviction_by_bytes() {
        let value = "x".repeat(100);
        let one = CacheEntryStore::entry_size("k1", &value);
        let store = CacheEntryStore::new(100, one * 2);

        store.set("k1", value.clone(), MINUTE);
        store.set("k2", value.clone(), MINUTE);
        assert_eq!(store.bytes(), one * 2);

        store.set("k3", value, MINUTE);
        assert_eq!(store.len(), 2);
        assert!(!store.contains("k1"));
        assert_eq!(store.evictions(), 1);
        assert!(store.bytes() <= one * 2);
    }

    #[test]
    fn test_replacing_entry_adjusts_bytes() {
        let store = CacheEntryStore::new(10, 1024 * 1024);
        store.set("k", "short".to_string(), MINUTE);
        store.set("k", "a much longer value".to_string(), MINUTE);

        assert_eq!(store.len(), 1);
        assert_eq!(
            store.bytes(),
            CacheEntryStore::entry_size("k", "a much longer value")
        );
        assert_eq!(store.evictions(), 0);
    }

    #[test]
    fn test_oversized_entry_refused() {
        let store = CacheEntryStore::new(10, 128);
        store.set("k", "small".to_string(), MINUTE);

        assert!(!store.set("k", "y".repeat(512), MINUTE));
        assert!(store.is_empty());
        assert_eq!(store.bytes(), 0);
    }

    #[test]
    fn test_clear_prefix_only_touches_namespace() {
        let store = CacheEntryStore::new(10, 1024 * 1024);
        store.set("semantic:a", "1".to_string(), MINUTE);
        store.set("semantic:b", "2".to_string(), MINUTE);
        store.set("ratelimit:api:x", "[]".to_string(), MINUTE);

        assert_eq!(store.clear_prefix("semantic:"), 2);
        assert_eq!(store.len(), 1);
        assert!(store.contains("ratelimit:api:x"));
        assert_eq!(store.clear(), 1);
        assert_eq!(store.bytes(), 0);
    }
}
