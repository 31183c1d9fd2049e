//! # Multi-Tier Cache
//!
//! - [`CacheEntryStore`]: bounded in-process LRU store with per-entry TTL
//! - [`DistributedCacheClient`]: optional best-effort secondary tier
//! - [`CacheManager`]: one read/write API over both tiers
//! - [`cached`]: wraps an async operation with cache lookups

pub mod entry_store;
pub mod errors;
pub mod manager;
pub mod providers;
pub mod traits;
pub mod wrap;

pub use entry_store::CacheEntryStore;
pub use errors::{CacheError, CacheResult};
pub use manager::{CacheManager, CacheStats};
pub use providers::InMemoryDistributedCache;
#[cfg(feature = "cache-redis")]
pub use providers::RedisCacheClient;
pub use traits::{DistributedCacheClient, DistributedEntry};
pub use wrap::cached;
