//! Error types for Evidex Core.

use crate::source::SourceError;
use thiserror::Error;

/// Core error type for Evidex operations.
#[derive(Error, Debug)]
pub enum CoreError {
    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// TOML parsing errors
    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    /// Rendering collaborator errors
    #[error("Source error: {0}")]
    Source(#[from] SourceError),

    /// JSON errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Errors raised while loading or validating configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// I/O error reading the config file.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// TOML parsing error.
    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    /// A value is out of range.
    #[error("Invalid value for {field}: {reason}")]
    Validation {
        /// Dotted field path, e.g. `resilience.failure_threshold`.
        field: String,
        /// What is wrong with it.
        reason: String,
    },
}

impl ConfigError {
    pub(crate) fn invalid(field: &str, reason: impl Into<String>) -> Self {
        Self::Validation { field: field.to_string(), reason: reason.into() }
    }
}

/// Result type alias for Evidex core operations.
pub type Result<T> = std::result::Result<T, CoreError>;
