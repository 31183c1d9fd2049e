//! Configuration Loader
//!
//! Layers configuration sources in increasing precedence:
//!
//! 1. Built-in defaults (every field is `#[serde(default)]`)
//! 2. An optional TOML file (explicit path or `BULWARK_CONFIG_PATH`)
//! 3. Environment variables, `BULWARK_<SECTION>__<FIELD>`
//!
//! The merged result is validated before it is handed out.

use super::error::ConfigResult;
use super::BulwarkConfig;
use crate::constants::env;
use config::{Config, Environment, File, Map};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Loads [`BulwarkConfig`] from layered sources
#[derive(Debug, Default)]
pub struct ConfigLoader {
    file: Option<PathBuf>,
    env_overrides: Option<Map<String, String>>,
}

impl ConfigLoader {
    /// Load configuration with the file path taken from `BULWARK_CONFIG_PATH`
    pub fn load() -> ConfigResult<BulwarkConfig> {
        let file = std::env::var(env::CONFIG_PATH).ok().map(PathBuf::from);
        Self {
            file,
            env_overrides: None,
        }
        .build()
    }

    /// Load configuration from a specific file plus process environment
    pub fn load_from_file(path: impl AsRef<Path>) -> ConfigResult<BulwarkConfig> {
        Self::new().with_file(path).build()
    }

    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_file(mut self, path: impl AsRef<Path>) -> Self {
        self.file = Some(path.as_ref().to_path_buf());
        self
    }

    /// Substitute an explicit variable map for the process environment
    ///
    /// Keys use the same `BULWARK_<SECTION>__<FIELD>` form as real variables.
    /// This keeps tests from mutating global process state.
    pub fn with_env_overrides(mut self, vars: Map<String, String>) -> Self {
        self.env_overrides = Some(vars);
        self
    }

    /// Merge all sources, deserialize and validate
    pub fn build(self) -> ConfigResult<BulwarkConfig> {
        let mut builder = Config::builder();

        if let Some(path) = &self.file {
            debug!(path = %path.display(), "Loading configuration file");
            builder = builder.add_source(File::from(path.as_path()).required(true));
        }

        let environment = Environment::with_prefix(env::PREFIX)
            .prefix_separator("_")
            .separator(env::SEPARATOR)
            .try_parsing(true)
            .source(self.env_overrides);
        builder = builder.add_source(environment);

        let config: BulwarkConfig = builder.build()?.try_deserialize()?;
        config.validate()?;

        info!(
            file = ?self.file,
            cache_ttl_seconds = config.cache.default_ttl_seconds,
            distributed_cache = config.cache.redis_url.is_some(),
            circuit_breakers_enabled = config.circuit_breakers.enabled,
            "Configuration loaded successfully"
        );

        Ok(config)
    }
}
