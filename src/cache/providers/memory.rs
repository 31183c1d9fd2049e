//! Process-local stand-in for a distributed store
//!
//! Useful for single-node deployments and tests. Availability can be toggled
//! to simulate an unreachable backend.

use crate::cache::errors::{CacheError, CacheResult};
use crate::cache::traits::{DistributedCacheClient, DistributedEntry};
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug)]
pub struct InMemoryDistributedCache {
    entries: DashMap<String, (String, Instant)>,
    available: AtomicBool,
    operations: AtomicU64,
}

impl Default for InMemoryDistributedCache {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryDistributedCache {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
            available: AtomicBool::new(true),
            operations: AtomicU64::new(0),
        }
    }

    /// Make every subsequent call fail (`false`) or succeed (`true`)
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Number of calls that reached this store, failed ones included
    pub fn operation_count(&self) -> u64 {
        self.operations.load(Ordering::SeqCst)
    }

    /// Raw lookup that bypasses availability and call counting
    pub fn peek(&self, key: &str) -> Option<String> {
        self.entries
            .get(key)
            .filter(|entry| entry.1 > Instant::now())
            .map(|entry| entry.0.clone())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn check_available(&self) -> CacheResult<()> {
        self.operations.fetch_add(1, Ordering::SeqCst);
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(CacheError::ConnectionError(
                "in-memory distributed cache marked unavailable".to_string(),
            ))
        }
    }
}

/// Glob match supporting `*` wildcards
fn matches_pattern(pattern: &str, key: &str) -> bool {
    let mut parts = pattern.split('*');
    let Some(first) = parts.next() else {
        return key.is_empty();
    };
    let Some(mut rest) = key.strip_prefix(first) else {
        return false;
    };

    let segments: Vec<&str> = parts.collect();
    let Some((last, middle)) = segments.split_last() else {
        return rest.is_empty();
    };

    for segment in middle {
        match rest.find(segment) {
            Some(index) => rest = &rest[index + segment.len()..],
            None => return false,
        }
    }
    rest.ends_with(last)
}

#[async_trait]
impl DistributedCacheClient for InMemoryDistributedCache {
    async fn get(&self, key: &str) -> CacheResult<Option<DistributedEntry>> {
        self.check_available()?;
        let now = Instant::now();
        Ok(self
            .entries
            .get(key)
            .filter(|entry| entry.1 > now)
            .map(|entry| DistributedEntry::new(entry.0.clone(), Some(entry.1 - now))))
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> CacheResult<()> {
        self.check_available()?;
        self.entries
            .insert(key.to_string(), (value.to_string(), Instant::now() + ttl));
        Ok(())
    }

    async fn delete(&self, key: &str) -> CacheResult<()> {
        self.check_available()?;
        self.entries.remove(key);
        Ok(())
    }

    async fn delete_pattern(&self, pattern: &str) -> CacheResult<u64> {
        self.check_available()?;
        let before = self.entries.len();
        self.entries.retain(|key, _| !matches_pattern(pattern, key));
        Ok(before.saturating_sub(self.entries.len()) as u64)
    }

    async fn health_check(&self) -> CacheResult<bool> {
        self.check_available()?;
        Ok(true)
    }

    fn provider_name(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pattern_matching() {
        assert!(matches_pattern("bulwark:semantic:*", "bulwark:semantic:abc"));
        assert!(!matches_pattern("bulwark:semantic:*", "bulwark:ratelimit:abc"));
        assert!(matches_pattern("bulwark:*", "bulwark:x"));
        assert!(matches_pattern("a*c*e", "abcde"));
        assert!(!matches_pattern("a*c*e", "abcd"));
        assert!(matches_pattern("exact", "exact"));
        assert!(!matches_pattern("exact", "exactly"));
    }

    #[tokio::test]
    async fn test_unavailable_store_errors() {
        let store = InMemoryDistributedCache::new();
        store.set("k", "v", Duration::from_secs(10)).await.unwrap();

        store.set_available(false);
        assert!(store.get("k").await.is_err());
        assert!(store.health_check().await.is_err());

        store.set_available(true);
        assert_eq!(store.get("k").await.unwrap().map(|e| e.value).as_deref(), Some("v"));
        assert_eq!(store.operation_count(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_entries_expire_and_report_remaining_ttl() {
        let store = InMemoryDistributedCache::new();
        store.set("k", "v", Duration::from_millis(1_500)).await.unwrap();

        tokio::time::advance(Duration::from_millis(400)).await;
        let entry = store.get("k").await.unwrap().unwrap();
        assert_eq!(entry.remaining_ttl, Some(Duration::from_millis(1_100)));

        tokio::time::advance(Duration::from_millis(1_100)).await;
        assert_eq!(store.get("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_delete_pattern_counts_removed_keys() {
        let store = InMemoryDistributedCache::new();
        let ttl = Duration::from_secs(60);
        store.set("p:ns:1", "a", ttl).await.unwrap();
        store.set("p:ns:2", "b", ttl).await.unwrap();
        store.set("p:other:1", "c", ttl).await.unwrap();

        assert_eq!(store.delete_pattern("p:ns:*").await.unwrap(), 2);
        assert_eq!(store.len(), 1);
    }
}
