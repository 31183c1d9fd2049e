//! Tier-2 cache providers

mod memory;
pub use memory::InMemoryDistributedCache;

#[cfg(feature = "cache-redis")]
mod redis;
#[cfg(feature = "cache-redis")]
pub use self::redis::RedisCacheClient;
