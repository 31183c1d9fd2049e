//! # Sliding Window Rate Limiter
//!
//! Each key owns the list of its request timestamps (milliseconds since the
//! epoch) inside the [`CacheManager`], stored under the limiter's namespace
//! with a TTL of one window. A check prunes timestamps at or before
//! `now - window`, rejects when the rest fill the window, and otherwise
//! appends `now`.
//!
//! The fetch, prune, append and store steps are not atomic against the
//! backing cache. Concurrent requests for one key can both see room and both
//! pass, so the limit is a best-effort throttle rather than a hard quota.

use super::errors::RateLimitError;
use super::keys::{authenticated_or_ip, client_ip, header_or_ip, KeyExtractor};
use crate::cache::CacheManager;
use crate::config::RateLimitRule;
use crate::constants::rate_limit as presets;
use axum::extract::Request;
use axum::response::{IntoResponse, Response};
use chrono::{DateTime, TimeZone, Utc};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimiterConfig {
    /// Label used in logs
    pub name: String,
    pub window: Duration,
    pub max_requests: u32,
    /// Prefix separating this limiter's keys from every other limiter's
    pub namespace: String,
}

impl RateLimiterConfig {
    pub fn new(
        name: impl Into<String>,
        rule: &RateLimitRule,
        namespace: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            window: rule.window(),
            max_requests: rule.max_requests,
            namespace: namespace.into(),
        }
    }

    pub fn validate(&self) -> Result<(), RateLimitError> {
        if self.window.as_millis() == 0 {
            return Err(RateLimitError::InvalidConfig(format!(
                "{}: window must be at least 1ms",
                self.name
            )));
        }
        if self.max_requests == 0 {
            return Err(RateLimitError::InvalidConfig(format!(
                "{}: max_requests must be greater than 0",
                self.name
            )));
        }
        Ok(())
    }

    /// Window length rounded up to whole seconds, used as the storage TTL
    fn storage_ttl(&self) -> Duration {
        Duration::from_secs(self.window.as_millis().div_ceil(1_000) as u64)
    }
}

/// Outcome of one check
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RateLimitDecision {
    Allowed {
        limit: u32,
        remaining: u32,
        reset_at: DateTime<Utc>,
    },
    Limited {
        limit: u32,
        /// When the oldest counted request leaves the window
        reset_at: DateTime<Utc>,
        retry_after: Duration,
    },
}

impl RateLimitDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allowed { .. })
    }
}

pub struct SlidingWindowRateLimiter {
    config: RateLimiterConfig,
    cache: Arc<CacheManager>,
    key_extractor: KeyExtractor,
}

impl fmt::Debug for SlidingWindowRateLimiter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SlidingWindowRateLimiter")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl SlidingWindowRateLimiter {
    /// Limiter keyed by caller network identity
    pub fn new(config: RateLimiterConfig, cache: Arc<CacheManager>) -> Result<Self, RateLimitError> {
        config.validate()?;
        Ok(Self {
            config,
            cache,
            key_extractor: Arc::new(client_ip),
        })
    }

    /// General API limiter, keyed by caller network identity
    pub fn api(rule: &RateLimitRule, cache: Arc<CacheManager>) -> Result<Self, RateLimitError> {
        Self::new(
            RateLimiterConfig::new("api", rule, presets::API_NAMESPACE),
            cache,
        )
    }

    /// Authentication attempt limiter, keyed by account identifier
    pub fn auth(rule: &RateLimitRule, cache: Arc<CacheManager>) -> Result<Self, RateLimitError> {
        Ok(Self::new(
            RateLimiterConfig::new("auth", rule, presets::AUTH_NAMESPACE),
            cache,
        )?
        .with_key_extractor(header_or_ip(presets::AUTH_KEY_HEADER)))
    }

    /// AI usage limiter, keyed by the [`AuthenticatedUser`] extension that
    /// the auth middleware inserts, or by network identity for anonymous calls
    pub fn ai_usage(rule: &RateLimitRule, cache: Arc<CacheManager>) -> Result<Self, RateLimitError> {
        Ok(Self::new(
            RateLimiterConfig::new("ai_usage", rule, presets::AI_NAMESPACE),
            cache,
        )?
        .with_key_extractor(authenticated_or_ip()))
    }

    pub fn with_key_extractor(mut self, key_extractor: KeyExtractor) -> Self {
        self.key_extractor = key_extractor;
        self
    }

    pub fn config(&self) -> &RateLimiterConfig {
        &self.config
    }

    /// Throttling key for `request`
    pub fn key_for(&self, request: &Request) -> String {
        (self.key_extractor)(request)
    }

    fn storage_key(&self, key: &str) -> String {
        format!("{}:{}", self.config.namespace, key)
    }

    pub async fn check(&self, key: &str) -> RateLimitDecision {
        self.check_at(key, Utc::now()).await
    }

    /// Record a request for `key` at `now` and decide whether it may proceed
    pub async fn check_at(&self, key: &str, now: DateTime<Utc>) -> RateLimitDecision {
        let storage_key = self.storage_key(key);
        let limit = self.config.max_requests;
        let window_ms = self.config.window.as_millis() as i64;
        let now_ms = now.timestamp_millis();
        let cutoff = now_ms - window_ms;

        let mut timestamps: Vec<i64> = self.cache.get(&storage_key).await.unwrap_or_default();
        timestamps.retain(|&timestamp| timestamp > cutoff);

        if timestamps.len() >= limit as usize {
            let oldest = timestamps.iter().copied().min().unwrap_or(now_ms);
            let reset_ms = oldest + window_ms;
            let wait_ms = (reset_ms - now_ms).max(0) as u64;
            let retry_after = Duration::from_secs(wait_ms.div_ceil(1_000).max(1));

            debug!(
                limiter = %self.config.name,
                key = key,
                count = timestamps.len(),
                limit = limit,
                retry_after_secs = retry_after.as_secs(),
                "Rate limit exceeded"
            );

            return RateLimitDecision::Limited {
                limit,
                reset_at: millis_to_datetime(reset_ms),
                retry_after,
            };
        }

        timestamps.push(now_ms);
        let remaining = limit.saturating_sub(timestamps.len() as u32);
        let oldest = timestamps.iter().copied().min().unwrap_or(now_ms);

        if let Err(e) = self
            .cache
            .set(&storage_key, &timestamps, Some(self.config.storage_ttl()))
        {
            warn!(limiter = %self.config.name, key = key, error = %e, "Failed to persist rate window");
        }

        RateLimitDecision::Allowed {
            limit,
            remaining,
            reset_at: millis_to_datetime(oldest + window_ms),
        }
    }

    /// Middleware contract: `None` lets the request continue, `Some` is the 429 to return
    pub async fn handle(&self, request: &Request) -> Option<Response> {
        let key = self.key_for(request);
        match self.check(&key).await {
            RateLimitDecision::Allowed { .. } => None,
            RateLimitDecision::Limited {
                limit,
                reset_at,
                retry_after,
            } => Some(
                RateLimitError::Exceeded {
                    limit,
                    reset_at,
                    retry_after_secs: retry_after.as_secs(),
                }
                .into_response(),
            ),
        }
    }

    /// Forget every recorded request for `key`
    pub async fn reset(&self, key: &str) {
        self.cache.delete(&self.storage_key(key)).await;
        debug!(limiter = %self.config.name, key = key, "Rate window reset");
    }
}

fn millis_to_datetime(millis: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(millis)
        .single()
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}
