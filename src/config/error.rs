use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigurationError {
    /// A file or environment source failed to parse or deserialize
    #[error("configuration source: {0}")]
    Source(#[from] config::ConfigError),

    #[error("{field} = {value} rejected: {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },

    /// A nested block failed its own validation
    #[error("[{section}] rejected: {reason}")]
    InvalidSection { section: String, reason: String },
}

impl ConfigurationError {
    pub fn invalid_value(
        field: impl Into<String>,
        value: impl ToString,
        reason: impl Into<String>,
    ) -> Self {
        Self::InvalidValue {
            field: field.into(),
            value: value.to_string(),
            reason: reason.into(),
        }
    }

    pub fn invalid_section(section: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidSection {
            section: section.into(),
            reason: reason.into(),
        }
    }

    /// Dotted path of the offending field or section, when known
    pub fn field(&self) -> Option<&str> {
        match self {
            Self::Source(_) => None,
            Self::InvalidValue { field, .. } => Some(field),
            Self::InvalidSection { section, .. } => Some(section),
        }
    }
}

pub type ConfigResult<T> = Result<T, ConfigurationError>;
