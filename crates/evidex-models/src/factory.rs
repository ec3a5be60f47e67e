//! Backend factory for creating backend instances from configuration.
//!
//! Handles API key loading from environment variables and wiring of the
//! primary/fallback pair.

use crate::{AnthropicBackend, FallbackBackend, GeminiBackend, MockBackend, MockReply};
use evidex_abstraction::{BackendError, ExpertBackend};
use std::str::FromStr;
use std::sync::Arc;
use tracing::debug;

/// Backend type enumeration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendType {
    /// Mock backend for testing.
    Mock,
    /// Google Gemini.
    Gemini,
    /// Anthropic Claude.
    Anthropic,
}

impl FromStr for BackendType {
    type Err = BackendError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "mock" => Ok(Self::Mock),
            "gemini" | "google" => Ok(Self::Gemini),
            "anthropic" | "claude" => Ok(Self::Anthropic),
            other => Err(BackendError::UnsupportedBackend(other.to_string())),
        }
    }
}

/// Backend configuration.
#[derive(Debug, Clone)]
pub struct BackendConfig {
    /// The type of backend to create.
    pub backend_type: BackendType,
    /// The model ID (e.g., "gemini-2.5-flash").
    pub model_id: String,
    /// Optional API key (if not provided, will be loaded from environment).
    pub api_key: Option<String>,
    /// Optional base URL override.
    pub base_url: Option<String>,
}

impl BackendConfig {
    /// Creates a new `BackendConfig` with the given type and model ID.
    #[must_use]
    pub fn new(backend_type: BackendType, model_id: impl Into<String>) -> Self {
        Self { backend_type, model_id: model_id.into(), api_key: None, base_url: None }
    }

    /// Sets the API key for this configuration.
    #[must_use]
    pub fn with_api_key(mut self, api_key: String) -> Self {
        self.api_key = Some(api_key);
        self
    }

    /// Sets the base URL for this configuration.
    #[must_use]
    pub fn with_base_url(mut self, base_url: String) -> Self {
        self.base_url = Some(base_url);
        self
    }
}

/// Factory for creating backend instances.
pub struct BackendFactory;

impl BackendFactory {
    /// Creates a backend instance from the given configuration.
    ///
    /// # Errors
    /// Returns a `BackendError` if creation fails (e.g., missing API key).
    pub fn create(config: BackendConfig) -> Result<Arc<dyn ExpertBackend>, BackendError> {
        debug!(
            backend_type = ?config.backend_type,
            model_id = %config.model_id,
            "Creating backend instance"
        );

        match config.backend_type {
            BackendType::Mock => Ok(Arc::new(MockBackend::new(
                config.model_id,
                MockReply::Payload(serde_json::json!({"confidence": 0.5, "data": {}})),
            ))),
            BackendType::Gemini => {
                let mut backend = match config.api_key {
                    Some(key) => GeminiBackend::with_api_key(config.model_id, key),
                    None => GeminiBackend::new(config.model_id)?,
                };
                if let Some(url) = config.base_url {
                    backend = backend.with_base_url(url);
                }
                Ok(Arc::new(backend))
            }
            BackendType::Anthropic => {
                let mut backend = match config.api_key {
                    Some(key) => AnthropicBackend::with_api_key(config.model_id, key),
                    None => AnthropicBackend::new(config.model_id)?,
                };
                if let Some(url) = config.base_url {
                    backend = backend.with_base_url(url);
                }
                Ok(Arc::new(backend))
            }
        }
    }

    /// Creates the primary backend, wrapped with failover when a fallback is configured.
    ///
    /// A fallback that cannot be created (e.g., missing key) is skipped rather
    /// than failing the primary.
    ///
    /// # Errors
    /// Returns a `BackendError` if the primary backend cannot be created.
    pub fn create_with_fallback(
        primary: BackendConfig,
        fallback: Option<BackendConfig>,
    ) -> Result<Arc<dyn ExpertBackend>, BackendError> {
        let primary = Self::create(primary)?;
        let Some(fallback) = fallback else {
            return Ok(primary);
        };

        match Self::create(fallback) {
            Ok(fallback) => Ok(Arc::new(FallbackBackend::new(primary, fallback))),
            Err(e) => {
                tracing::warn!(error = %e, "Fallback backend unavailable, using primary only");
                Ok(primary)
            }
        }
    }
}
