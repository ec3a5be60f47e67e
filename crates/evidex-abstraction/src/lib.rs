//! Expert backend abstraction for Evidex.
//!
//! This crate defines the contract between the extraction core and the AI
//! backends that power the expert agents: a structured request (system
//! instruction, user content, JSON response schema), a JSON response, and a
//! typed error whose category drives retry classification.

pub mod json;

use async_trait::async_trait;
use base64::Engine;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use json::parse_json_strict;

/// Represents an error that can occur when calling an expert backend.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum BackendError {
    /// The request could not be sent (network failure, DNS, TLS).
    #[error("Request Error: {0}")]
    RequestError(String),

    /// The backend answered with a non-success HTTP status.
    #[error("Backend returned status {status}: {message}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Error body or message from the backend.
        message: String,
    },

    /// Provider quota exceeded or rate limit hit.
    #[error("Provider '{provider}' rate limited{}", message.as_ref().map(|m| format!(": {}", m)).unwrap_or_default())]
    RateLimited {
        /// The provider name (e.g., "gemini", "anthropic", "local").
        provider: String,
        /// Optional error message from the provider.
        #[serde(skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },

    /// The call did not complete within its deadline.
    #[error("Timed out: {0}")]
    Timeout(String),

    /// Authentication or authorization was rejected.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// The request was malformed and will never succeed as-is.
    #[error("Invalid Request: {0}")]
    InvalidRequest(String),

    /// The backend answered but the payload did not match the expected shape.
    #[error("Invalid Response: {0}")]
    InvalidResponse(String),

    /// The backend is not supported or not configured.
    #[error("Unsupported Backend: {0}")]
    UnsupportedBackend(String),

    /// Other unexpected errors.
    #[error("Other Backend Error: {0}")]
    Other(String),
}

impl BackendError {
    /// Maps an HTTP error status and body to the matching error variant.
    #[must_use]
    pub fn from_status(provider: &str, status: u16, body: String) -> Self {
        match status {
            401 | 403 => Self::Unauthorized(body),
            429 => Self::RateLimited { provider: provider.to_string(), message: Some(body) },
            400 | 404 | 413 | 422 => Self::InvalidRequest(format!("status {}: {}", status, body)),
            408 | 504 => Self::Timeout(format!("status {}: {}", status, body)),
            _ => Self::Status { status, message: body },
        }
    }

    /// Returns the HTTP-style status associated with this error, if any.
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            Self::RateLimited { .. } => Some(429),
            Self::Unauthorized(_) => Some(401),
            Self::InvalidRequest(_) => Some(400),
            Self::Timeout(_) => Some(504),
            _ => None,
        }
    }

    /// Whether a later attempt of the same request may succeed.
    ///
    /// Rate limits, timeouts and 5xx statuses are retryable. Malformed requests,
    /// auth failures and unparseable responses are not.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::RateLimited { .. } | Self::Timeout(_) => true,
            Self::Status { status, .. } => *status == 429 || (500..=599).contains(status),
            Self::RequestError(_)
            | Self::Unauthorized(_)
            | Self::InvalidRequest(_)
            | Self::InvalidResponse(_)
            | Self::UnsupportedBackend(_)
            | Self::Other(_) => false,
        }
    }
}

/// Content sent to the backend alongside the system instruction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum UserContent {
    /// Plain text content (table grids, page context).
    Text(String),
    /// Binary content such as a rendered figure.
    Binary {
        /// MIME type of the payload (e.g., "image/png").
        mime_type: String,
        /// Raw bytes.
        data: Vec<u8>,
    },
}

impl UserContent {
    /// Returns the text content, if this is text.
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            Self::Binary { .. } => None,
        }
    }

    /// Encodes binary content as standard base64, as expected by inline-data APIs.
    #[must_use]
    pub fn to_base64(&self) -> Option<String> {
        match self {
            Self::Binary { data, .. } => Some(base64::engine::general_purpose::STANDARD.encode(data)),
            Self::Text(_) => None,
        }
    }
}

/// A structured generation request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendRequest {
    /// Instruction describing the expert's role and output contract.
    pub system_instruction: String,
    /// The content to analyse.
    pub user_content: UserContent,
    /// JSON schema the response must conform to.
    pub response_schema: serde_json::Value,
    /// Sampling temperature (backends apply their own default when absent).
    pub temperature: Option<f32>,
}

impl BackendRequest {
    /// Creates a request with the given instruction, content and schema.
    #[must_use]
    pub fn new(
        system_instruction: impl Into<String>,
        user_content: UserContent,
        response_schema: serde_json::Value,
    ) -> Self {
        Self {
            system_instruction: system_instruction.into(),
            user_content,
            response_schema,
            temperature: None,
        }
    }

    /// Sets the sampling temperature.
    #[must_use]
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }
}

/// Usage statistics for a backend request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendUsage {
    /// Number of tokens in the prompt.
    pub prompt_tokens: u32,
    /// Number of tokens in the completion.
    pub completion_tokens: u32,
}

/// A schema-conformant response from a backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendResponse {
    /// The JSON payload.
    pub payload: serde_json::Value,
    /// Identifier of the backend/model that produced the payload.
    pub backend_id: Option<String>,
    /// Optional usage statistics.
    pub usage: Option<BackendUsage>,
}

impl BackendResponse {
    /// Creates a response carrying only a payload.
    #[must_use]
    pub fn from_payload(payload: serde_json::Value) -> Self {
        Self { payload, backend_id: None, usage: None }
    }
}

/// A trait for AI backends that answer structured extraction requests.
///
/// All backends must be `Send + Sync` so one instance can serve concurrent
/// agent calls.
#[async_trait]
pub trait ExpertBackend: Send + Sync {
    /// Generates a schema-conformant JSON payload for the request.
    ///
    /// # Errors
    /// Returns a `BackendError` whose category tells callers whether a retry
    /// may succeed.
    async fn generate(&self, request: &BackendRequest) -> Result<BackendResponse, BackendError>;

    /// Returns the ID of the backend.
    fn backend_id(&self) -> &str;
}
