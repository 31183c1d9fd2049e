//! Process-wide `tracing` setup.
//!
//! Human-readable console output by default; JSON lines when
//! `BULWARK_LOG_FORMAT=json`. `RUST_LOG` overrides the level derived from
//! `BULWARK_ENV`.

use crate::constants::env;
use std::str::FromStr;
use std::sync::Once;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

static INIT: Once = Once::new();

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

impl FromStr for LogFormat {
    type Err = std::convert::Infallible;

    /// Anything other than `json` falls back to pretty output
    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Ok(if value.trim().eq_ignore_ascii_case("json") {
            Self::Json
        } else {
            Self::Pretty
        })
    }
}

/// Logging settings resolved from the environment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingSettings {
    pub environment: String,
    pub format: LogFormat,
}

impl LoggingSettings {
    pub fn from_env() -> Self {
        let environment = std::env::var(env::ENVIRONMENT)
            .or_else(|_| std::env::var("APP_ENV"))
            .unwrap_or_else(|_| "development".to_string());
        let format = std::env::var(env::LOG_FORMAT)
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or_default();
        Self {
            environment,
            format,
        }
    }

    /// Production logs at info, every other environment at debug
    pub fn default_directive(&self) -> &'static str {
        if self.environment == "production" {
            "info"
        } else {
            "debug"
        }
    }
}

/// Install the global subscriber once; later calls are no-ops
pub fn init_structured_logging() {
    init_with(LoggingSettings::from_env());
}

pub fn init_with(settings: LoggingSettings) {
    INIT.call_once(|| {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(settings.default_directive()));

        let base = fmt::layer().with_target(true).with_thread_ids(true);
        let console = match settings.format {
            LogFormat::Json => base.with_ansi(false).json().with_filter(filter).boxed(),
            LogFormat::Pretty => base.with_filter(filter).boxed(),
        };

        // The embedding service may have installed its own subscriber
        let installed = tracing_subscriber::registry()
            .with(console)
            .try_init()
            .is_ok();

        tracing::info!(
            environment = %settings.environment,
            format = ?settings.format,
            installed,
            "Logging ready"
        );
    });
}
