//! # Bulwark Configuration System
//!
//! Every tunable of the resilience layer lives in [`BulwarkConfig`]. Each section
//! carries documented defaults, so an empty configuration source yields a fully
//! usable layer; deployments override individual values through a TOML file or
//! `BULWARK_`-prefixed environment variables.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use bulwark_core::config::ConfigLoader;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! // Defaults, then $BULWARK_CONFIG_PATH (if set), then environment overrides
//! let config = ConfigLoader::load()?;
//!
//! let ttl = config.cache.default_ttl();
//! let threshold = config.semantic_cache.min_confidence;
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod loader;

use crate::constants;
use crate::resilience::CircuitBreakerConfig;
use crate::transaction::{IsolationLevel, RetryOptions, TransactionOptions};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

pub use error::{ConfigResult, ConfigurationError};
pub use loader::ConfigLoader;

/// Root configuration for the resilience layer
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct BulwarkConfig {
    pub cache: CacheConfig,
    pub semantic_cache: SemanticCacheConfig,
    pub circuit_breakers: CircuitBreakersConfig,
    pub retry: RetryConfig,
    pub rate_limits: RateLimitsConfig,
    pub streaming: StreamingConfig,
}

impl BulwarkConfig {
    /// Reject values that would make a component misbehave
    pub fn validate(&self) -> ConfigResult<()> {
        self.cache.validate()?;
        self.semantic_cache.validate()?;
        self.circuit_breakers.validate()?;
        self.retry.validate()?;
        self.rate_limits.validate()?;
        self.streaming.validate()
    }
}

/// Tiered cache configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CacheConfig {
    /// TTL applied when a caller does not pass one
    pub default_ttl_seconds: u64,

    /// Maximum number of entries held in the in-process tier
    pub max_entries: usize,

    /// Approximate byte budget of the in-process tier
    pub max_bytes: usize,

    /// Prefix applied to every key written to the distributed tier
    pub key_prefix: String,

    /// Distributed tier URL (`redis://...`); tier 2 is disabled when absent
    pub redis_url: Option<String>,

    /// Guard the distributed tier with a circuit breaker named `cache`
    pub distributed_circuit_breaker: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            default_ttl_seconds: constants::cache::DEFAULT_TTL_SECONDS,
            max_entries: constants::cache::DEFAULT_MAX_ENTRIES,
            max_bytes: constants::cache::DEFAULT_MAX_BYTES,
            key_prefix: constants::cache::DEFAULT_KEY_PREFIX.to_string(),
            redis_url: None,
            distributed_circuit_breaker: true,
        }
    }
}

impl CacheConfig {
    pub fn default_ttl(&self) -> Duration {
        Duration::from_secs(self.default_ttl_seconds)
    }

    fn validate(&self) -> ConfigResult<()> {
        if self.default_ttl_seconds == 0 {
            return Err(ConfigurationError::invalid_value(
                "cache.default_ttl_seconds",
                self.default_ttl_seconds,
                "must be greater than 0",
            ));
        }
        if self.max_entries == 0 {
            return Err(ConfigurationError::invalid_value(
                "cache.max_entries",
                self.max_entries,
                "must be greater than 0",
            ));
        }
        if self.max_bytes == 0 {
            return Err(ConfigurationError::invalid_value(
                "cache.max_bytes",
                self.max_bytes,
                "must be greater than 0",
            ));
        }
        Ok(())
    }
}

/// Semantic result cache configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SemanticCacheConfig {
    /// Results below this confidence are never cached
    pub min_confidence: f64,

    /// Lifetime of a durable record
    pub ttl_seconds: u64,

    /// Lifetime of the in-memory copy of a record
    pub memory_ttl_seconds: u64,

    /// Interval between background expiry sweeps
    pub sweep_interval_seconds: u64,
}

impl Default for SemanticCacheConfig {
    fn default() -> Self {
        Self {
            min_confidence: constants::semantic::MIN_CONFIDENCE_FOR_CACHE,
            ttl_seconds: constants::semantic::DEFAULT_TTL_SECONDS,
            memory_ttl_seconds: constants::semantic::DEFAULT_MEMORY_TTL_SECONDS,
            sweep_interval_seconds: constants::semantic::DEFAULT_SWEEP_INTERVAL_SECONDS,
        }
    }
}

impl SemanticCacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_seconds)
    }

    pub fn memory_ttl(&self) -> Duration {
        Duration::from_secs(self.memory_ttl_seconds)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_seconds)
    }

    fn validate(&self) -> ConfigResult<()> {
        if !(0.0..=1.0).contains(&self.min_confidence) {
            return Err(ConfigurationError::invalid_value(
                "semantic_cache.min_confidence",
                self.min_confidence,
                "must be between 0.0 and 1.0",
            ));
        }
        if self.ttl_seconds == 0 || self.memory_ttl_seconds == 0 {
            return Err(ConfigurationError::invalid_value(
                "semantic_cache.ttl_seconds",
                self.ttl_seconds.min(self.memory_ttl_seconds),
                "ttl values must be greater than 0",
            ));
        }
        if self.sweep_interval_seconds == 0 {
            return Err(ConfigurationError::invalid_value(
                "semantic_cache.sweep_interval_seconds",
                self.sweep_interval_seconds,
                "must be greater than 0",
            ));
        }
        Ok(())
    }
}

/// Circuit breaker configuration for all named dependencies
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CircuitBreakersConfig {
    /// Whether circuit breakers are enabled globally
    pub enabled: bool,

    /// Default configuration for new circuit breakers
    pub default_config: CircuitBreakerComponentConfig,

    /// Specific configurations for named components
    pub component_configs: HashMap<String, CircuitBreakerComponentConfig>,
}

impl Default for CircuitBreakersConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            default_config: CircuitBreakerComponentConfig::default(),
            component_configs: HashMap::new(),
        }
    }
}

impl CircuitBreakersConfig {
    /// Get configuration for a specific component
    pub fn config_for_component(&self, component_name: &str) -> CircuitBreakerComponentConfig {
        self.component_configs
            .get(component_name)
            .cloned()
            .unwrap_or_else(|| self.default_config.clone())
    }

    fn validate(&self) -> ConfigResult<()> {
        self.default_config
            .to_resilience_config()
            .validate()
            .map_err(|e| ConfigurationError::invalid_section("circuit_breakers.default_config", e))?;

        for (name, component) in &self.component_configs {
            component.to_resilience_config().validate().map_err(|e| {
                ConfigurationError::invalid_section(
                    format!("circuit_breakers.component_configs.{name}"),
                    e,
                )
            })?;
        }
        Ok(())
    }
}

/// Circuit breaker configuration for a specific component
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CircuitBreakerComponentConfig {
    /// Number of consecutive failures before opening circuit
    pub failure_threshold: u32,

    /// Time to wait in open state before allowing a trial call
    pub reset_timeout_ms: u64,
}

impl Default for CircuitBreakerComponentConfig {
    fn default() -> Self {
        Self {
            failure_threshold: constants::circuit_breaker::DEFAULT_FAILURE_THRESHOLD,
            reset_timeout_ms: constants::circuit_breaker::DEFAULT_RESET_TIMEOUT_MS,
        }
    }
}

impl CircuitBreakerComponentConfig {
    /// Convert to resilience module's format
    pub fn to_resilience_config(&self) -> CircuitBreakerConfig {
        CircuitBreakerConfig {
            failure_threshold: self.failure_threshold,
            reset_timeout: Duration::from_millis(self.reset_timeout_ms),
        }
    }
}

/// Retrying transaction configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,

    /// Longest wait to open a transaction
    pub max_wait_ms: u64,

    /// Longest a transaction body may run
    pub timeout_ms: u64,

    pub isolation_level: IsolationLevel,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: constants::retry::DEFAULT_MAX_RETRIES,
            base_delay_ms: constants::retry::DEFAULT_BASE_DELAY_MS,
            max_delay_ms: constants::retry::DEFAULT_MAX_DELAY_MS,
            max_wait_ms: constants::retry::DEFAULT_MAX_WAIT_MS,
            timeout_ms: constants::retry::DEFAULT_TIMEOUT_MS,
            isolation_level: IsolationLevel::default(),
        }
    }
}

impl RetryConfig {
    pub fn retry_options(&self) -> RetryOptions {
        RetryOptions {
            max_retries: self.max_retries,
            base_delay: Duration::from_millis(self.base_delay_ms),
            max_delay: Duration::from_millis(self.max_delay_ms),
        }
    }

    pub fn transaction_options(&self) -> TransactionOptions {
        TransactionOptions {
            max_wait: Duration::from_millis(self.max_wait_ms),
            timeout: Duration::from_millis(self.timeout_ms),
            isolation_level: self.isolation_level,
        }
    }

    fn validate(&self) -> ConfigResult<()> {
        if self.base_delay_ms > self.max_delay_ms {
            return Err(ConfigurationError::invalid_value(
                "retry.base_delay_ms",
                self.base_delay_ms,
                format!("must not exceed retry.max_delay_ms ({})", self.max_delay_ms),
            ));
        }
        if self.max_wait_ms == 0 || self.timeout_ms == 0 {
            return Err(ConfigurationError::invalid_value(
                "retry.timeout_ms",
                self.timeout_ms.min(self.max_wait_ms),
                "max_wait_ms and timeout_ms must be greater than 0",
            ));
        }
        Ok(())
    }
}

/// A single sliding window rule
#[derive(Debug, Clone, Copy, Deserialize, Serialize)]
pub struct RateLimitRule {
    pub window_ms: u64,
    pub max_requests: u32,
}

impl RateLimitRule {
    pub fn window(&self) -> Duration {
        Duration::from_millis(self.window_ms)
    }

    fn validate(&self, name: &str) -> ConfigResult<()> {
        if self.window_ms == 0 {
            return Err(ConfigurationError::invalid_value(
                format!("rate_limits.{name}.window_ms"),
                self.window_ms,
                "must be greater than 0",
            ));
        }
        if self.max_requests == 0 {
            return Err(ConfigurationError::invalid_value(
                format!("rate_limits.{name}.max_requests"),
                self.max_requests,
                "must be greater than 0",
            ));
        }
        Ok(())
    }
}

/// Named rate limiter configurations
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RateLimitsConfig {
    pub api: RateLimitRule,
    pub auth: RateLimitRule,
    pub ai_usage: RateLimitRule,
}

impl Default for RateLimitsConfig {
    fn default() -> Self {
        use constants::rate_limit::*;

        Self {
            api: RateLimitRule {
                window_ms: API_WINDOW_MS,
                max_requests: API_MAX_REQUESTS,
            },
            auth: RateLimitRule {
                window_ms: AUTH_WINDOW_MS,
                max_requests: AUTH_MAX_REQUESTS,
            },
            ai_usage: RateLimitRule {
                window_ms: AI_WINDOW_MS,
                max_requests: AI_MAX_REQUESTS,
            },
        }
    }
}

impl RateLimitsConfig {
    fn validate(&self) -> ConfigResult<()> {
        self.api.validate("api")?;
        self.auth.validate("auth")?;
        self.ai_usage.validate("ai_usage")
    }
}

/// Streaming chunk processor configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct StreamingConfig {
    pub chunk_size_bytes: usize,
}

impl Default for StreamingConfig {
    fn default() -> Self {
        Self {
            chunk_size_bytes: constants::streaming::DEFAULT_CHUNK_SIZE_BYTES,
        }
    }
}

impl StreamingConfig {
    fn validate(&self) -> ConfigResult<()> {
        if self.chunk_size_bytes == 0 {
            return Err(ConfigurationError::invalid_value(
                "streaming.chunk_size_bytes",
                self.chunk_size_bytes,
                "must be greater than 0",
            ));
        }
        Ok(())
    }
}
