//! # System Constants
//!
//! Default values for every tunable of the resilience layer. Configuration
//! structs fall back to these when a value is not supplied.

/// Cache defaults
pub mod cache {
    pub const DEFAULT_TTL_SECONDS: u64 = 300;
    pub const DEFAULT_MAX_ENTRIES: usize = 10_000;
    pub const DEFAULT_MAX_BYTES: usize = 64 * 1024 * 1024;
    pub const DEFAULT_KEY_PREFIX: &str = "bulwark";

    /// Fixed per-entry bookkeeping cost added to key and value lengths
    pub const ENTRY_OVERHEAD_BYTES: usize = 64;

    /// Separator between a namespace and the rest of a cache key
    pub const NAMESPACE_SEPARATOR: char = ':';
}

/// Semantic result cache defaults
pub mod semantic {
    pub const MIN_CONFIDENCE_FOR_CACHE: f64 = 0.85;
    pub const DEFAULT_TTL_SECONDS: u64 = 7 * 24 * 60 * 60;
    pub const DEFAULT_MEMORY_TTL_SECONDS: u64 = 60 * 60;
    pub const DEFAULT_SWEEP_INTERVAL_SECONDS: u64 = 60 * 60;
    pub const NAMESPACE: &str = "semantic";
}

/// Circuit breaker defaults
pub mod circuit_breaker {
    pub const DEFAULT_FAILURE_THRESHOLD: u32 = 5;
    pub const DEFAULT_RESET_TIMEOUT_MS: u64 = 30_000;

    /// Capacity of the per-breaker state change broadcast channel
    pub const EVENT_CHANNEL_CAPACITY: usize = 64;
}

/// Retrying transaction defaults
pub mod retry {
    pub const DEFAULT_MAX_RETRIES: u32 = 3;
    pub const DEFAULT_BASE_DELAY_MS: u64 = 100;
    pub const DEFAULT_MAX_DELAY_MS: u64 = 1_000;
    pub const DEFAULT_MAX_WAIT_MS: u64 = 5_000;
    pub const DEFAULT_TIMEOUT_MS: u64 = 10_000;
}

/// Rate limiter defaults for the named limiter presets
pub mod rate_limit {
    pub const API_WINDOW_MS: u64 = 60_000;
    pub const API_MAX_REQUESTS: u32 = 60;
    pub const API_NAMESPACE: &str = "ratelimit:api";

    pub const AUTH_WINDOW_MS: u64 = 15 * 60_000;
    pub const AUTH_MAX_REQUESTS: u32 = 5;
    pub const AUTH_NAMESPACE: &str = "ratelimit:auth";
    pub const AUTH_KEY_HEADER: &str = "x-account-id";

    pub const AI_WINDOW_MS: u64 = 60 * 60_000;
    pub const AI_MAX_REQUESTS: u32 = 100;
    pub const AI_NAMESPACE: &str = "ratelimit:ai";

    pub const ANONYMOUS_KEY: &str = "anonymous";
}

/// Streaming chunk processor defaults
pub mod streaming {
    pub const DEFAULT_CHUNK_SIZE_BYTES: usize = 1024 * 1024;

    /// Longest snippet kept for a single finding
    pub const MAX_SNIPPET_BYTES: usize = 120;
}

/// Environment variable names
pub mod env {
    pub const ENVIRONMENT: &str = "BULWARK_ENV";
    pub const CONFIG_PATH: &str = "BULWARK_CONFIG_PATH";
    pub const LOG_FORMAT: &str = "BULWARK_LOG_FORMAT";
    pub const PREFIX: &str = "BULWARK";
    pub const SEPARATOR: &str = "__";
}
