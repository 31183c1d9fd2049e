//! # Semantic Result Cache
//!
//! Confidence-gated caching of inference results, backed by the
//! [`CacheManager`](crate::cache::CacheManager) and a durable record store.

pub mod cache;
#[cfg(feature = "postgres")]
pub mod postgres;
pub mod record;
pub mod store;

pub use cache::{
    Generated, SemanticCacheError, SemanticCacheStats, SemanticResult, SemanticResultCache,
};
#[cfg(feature = "postgres")]
pub use postgres::PgSemanticRecordStore;
pub use record::{content_hash, normalize_input, SemanticCacheRecord};
pub use store::{InMemorySemanticRecordStore, SemanticRecordStore, SemanticStoreError};
