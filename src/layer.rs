//! # Resilience Layer
//!
//! Composition root. Builds every component of the layer from one
//! [`BulwarkConfig`] as explicit instances shared through `Arc`, so the host
//! application decides lifetimes and nothing lives in a process-wide global.
//!
//! ```rust,no_run
//! use bulwark_core::config::ConfigLoader;
//! use bulwark_core::layer::ResilienceLayer;
//! use bulwark_core::semantic::InMemorySemanticRecordStore;
//! use std::sync::Arc;
//!
//! # fn main() -> bulwark_core::Result<()> {
//! let config = ConfigLoader::load()?;
//! let layer = ResilienceLayer::from_config(
//!     config,
//!     None,
//!     Arc::new(InMemorySemanticRecordStore::new()),
//! )?;
//! let inference = layer.dependency_breaker("inference");
//! # let _ = inference;
//! # Ok(())
//! # }
//! ```

use crate::cache::{CacheManager, DistributedCacheClient};
use crate::config::BulwarkConfig;
use crate::error::Result;
use crate::rate_limit::SlidingWindowRateLimiter;
use crate::resilience::{CircuitBreaker, CircuitBreakerManager};
use crate::semantic::{SemanticRecordStore, SemanticResultCache};
use crate::streaming::{ChunkAnalyzer, ChunkError, StreamingChunkProcessor};
use crate::transaction::{RetryingTransactionRunner, TransactionalStore};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::info;

/// Breaker component guarding the distributed cache tier
pub const CACHE_COMPONENT: &str = "cache";

#[derive(Debug)]
pub struct ResilienceLayer {
    config: BulwarkConfig,
    cache: Arc<CacheManager>,
    semantic_cache: Arc<SemanticResultCache>,
    circuit_breakers: Arc<CircuitBreakerManager>,
    api_limiter: Arc<SlidingWindowRateLimiter>,
    auth_limiter: Arc<SlidingWindowRateLimiter>,
    ai_usage_limiter: Arc<SlidingWindowRateLimiter>,
}

impl ResilienceLayer {
    /// Build the layer; `distributed` is the optional tier-2 cache
    pub fn from_config(
        config: BulwarkConfig,
        distributed: Option<Arc<dyn DistributedCacheClient>>,
        durable: Arc<dyn SemanticRecordStore>,
    ) -> Result<Self> {
        config.validate()?;

        let circuit_breakers = Arc::new(CircuitBreakerManager::from_config(
            &config.circuit_breakers,
        ));

        let mut cache = CacheManager::new(&config.cache);
        if let Some(client) = distributed {
            cache = cache.with_distributed(client);
            if config.cache.distributed_circuit_breaker && circuit_breakers.is_enabled() {
                cache = cache
                    .with_circuit_breaker(circuit_breakers.get_circuit_breaker(CACHE_COMPONENT));
            }
        }
        let cache = Arc::new(cache);

        let semantic_cache = Arc::new(SemanticResultCache::new(
            Arc::clone(&cache),
            durable,
            config.semantic_cache.clone(),
        ));

        let limits = &config.rate_limits;
        let api_limiter = Arc::new(SlidingWindowRateLimiter::api(
            &limits.api,
            Arc::clone(&cache),
        )?);
        let auth_limiter = Arc::new(SlidingWindowRateLimiter::auth(
            &limits.auth,
            Arc::clone(&cache),
        )?);
        let ai_usage_limiter = Arc::new(SlidingWindowRateLimiter::ai_usage(
            &limits.ai_usage,
            Arc::clone(&cache),
        )?);

        info!(
            distributed_cache = cache.has_distributed_tier(),
            circuit_breakers_enabled = circuit_breakers.is_enabled(),
            chunk_size_bytes = config.streaming.chunk_size_bytes,
            "Resilience layer initialized"
        );

        Ok(Self {
            config,
            cache,
            semantic_cache,
            circuit_breakers,
            api_limiter,
            auth_limiter,
            ai_usage_limiter,
        })
    }

    /// Build the layer, connecting to Redis when `cache.redis_url` is set
    #[cfg(feature = "cache-redis")]
    pub async fn connect(
        config: BulwarkConfig,
        durable: Arc<dyn SemanticRecordStore>,
    ) -> Result<Self> {
        let distributed: Option<Arc<dyn DistributedCacheClient>> = match &config.cache.redis_url
        {
            Some(url) => Some(Arc::new(crate::cache::RedisCacheClient::connect(url).await?)),
            None => None,
        };
        Self::from_config(config, distributed, durable)
    }

    pub fn config(&self) -> &BulwarkConfig {
        &self.config
    }

    pub fn cache(&self) -> &Arc<CacheManager> {
        &self.cache
    }

    pub fn semantic_cache(&self) -> &Arc<SemanticResultCache> {
        &self.semantic_cache
    }

    pub fn circuit_breakers(&self) -> &Arc<CircuitBreakerManager> {
        &self.circuit_breakers
    }

    /// Breaker for a named downstream dependency
    pub fn dependency_breaker(&self, name: &str) -> Arc<CircuitBreaker> {
        self.circuit_breakers.get_circuit_breaker(name)
    }

    pub fn api_limiter(&self) -> &Arc<SlidingWindowRateLimiter> {
        &self.api_limiter
    }

    pub fn auth_limiter(&self) -> &Arc<SlidingWindowRateLimiter> {
        &self.auth_limiter
    }

    pub fn ai_usage_limiter(&self) -> &Arc<SlidingWindowRateLimiter> {
        &self.ai_usage_limiter
    }

    /// Runner over `store` using the configured retry and transaction options
    pub fn transaction_runner<S: TransactionalStore>(
        &self,
        store: Arc<S>,
    ) -> RetryingTransactionRunner<S> {
        RetryingTransactionRunner::new(store).with_defaults(
            self.config.retry.transaction_options(),
            self.config.retry.retry_options(),
        )
    }

    /// Processor using the configured chunk size
    pub fn chunk_processor(
        &self,
        analyzer: Arc<dyn ChunkAnalyzer>,
    ) -> std::result::Result<StreamingChunkProcessor, ChunkError> {
        StreamingChunkProcessor::from_config(&self.config.streaming, analyzer)
    }

    /// Start the semantic record expiry sweep; abort the handle to stop it
    pub fn spawn_background_tasks(&self) -> JoinHandle<()> {
        self.semantic_cache
            .spawn_expiry_sweep(self.config.semantic_cache.sweep_interval())
    }
}
