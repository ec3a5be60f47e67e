//! Anthropic Messages API backend implementation.
//!
//! The Messages API has no native response schema, so the schema is appended to
//! the `system` field together with a JSON-only instruction and the reply text
//! is recovered with `parse_json_strict`.

use async_trait::async_trait;
use evidex_abstraction::{
    BackendError, BackendRequest, BackendResponse, BackendUsage, ExpertBackend, UserContent,
    parse_json_strict,
};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::env;
use tracing::{debug, error};

const DEFAULT_BASE_URL: &str = "https://api.anthropic.com/v1";
const DEFAULT_MAX_TOKENS: u32 = 2048;
const DEFAULT_TEMPERATURE: f32 = 0.3;
const JSON_ONLY: &str = "You must respond with valid JSON only. Do not include markdown fences or any text outside the JSON object.";

/// Anthropic Claude backend.
#[derive(Debug, Clone)]
pub struct AnthropicBackend {
    model_id: String,
    api_key: String,
    base_url: String,
    client: Client,
}

impl AnthropicBackend {
    /// Creates a new `AnthropicBackend` reading the key from `ANTHROPIC_API_KEY`.
    ///
    /// # Errors
    /// Returns `BackendError::UnsupportedBackend` if the API key is not set.
    #[allow(clippy::disallowed_methods)] // env::var is needed for API key loading
    pub fn new(model_id: String) -> Result<Self, BackendError> {
        let api_key = env::var("ANTHROPIC_API_KEY").map_err(|_| {
            BackendError::UnsupportedBackend(
                "ANTHROPIC_API_KEY environment variable not set".to_string(),
            )
        })?;
        Ok(Self::with_api_key(model_id, api_key))
    }

    /// Creates a new `AnthropicBackend` with an explicit API key.
    #[must_use]
    pub fn with_api_key(model_id: String, api_key: String) -> Self {
        Self { model_id, api_key, base_url: DEFAULT_BASE_URL.to_string(), client: Client::new() }
    }

    /// Overrides the API base URL (used for proxies and tests).
    #[must_use]
    pub fn with_base_url(mut self, base_url: String) -> Self {
        self.base_url = base_url;
        self
    }

    fn system_prompt(request: &BackendRequest) -> String {
        format!(
            "{}\n\n{}\n\nThe JSON must conform to this schema:\n{}",
            request.system_instruction, JSON_ONLY, request.response_schema
        )
    }

    fn to_blocks(content: &UserContent) -> Vec<AnthropicBlock> {
        match content {
            UserContent::Text(text) => vec![AnthropicBlock::Text { text: text.clone() }],
            UserContent::Binary { mime_type, .. } => vec![
                AnthropicBlock::Image {
                    source: AnthropicImageSource {
                        source_type: "base64".to_string(),
                        media_type: mime_type.clone(),
                        data: content.to_base64().unwrap_or_default(),
                    },
                },
                AnthropicBlock::Text { text: "Analyse the attached figure.".to_string() },
            ],
        }
    }
}

#[async_trait]
impl ExpertBackend for AnthropicBackend {
    async fn generate(&self, request: &BackendRequest) -> Result<BackendResponse, BackendError> {
        debug!(model_id = %self.model_id, "AnthropicBackend generating structured content");

        let url = format!("{}/messages", self.base_url);
        let request_body = AnthropicRequest {
            model: self.model_id.clone(),
            max_tokens: DEFAULT_MAX_TOKENS,
            temperature: request.temperature.unwrap_or(DEFAULT_TEMPERATURE),
            system: Self::system_prompt(request),
            messages: vec![AnthropicMessage {
                role: "user".to_string(),
                content: Self::to_blocks(&request.user_content),
            }],
        };

        let response = self
            .client
            .post(&url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", "2023-06-01")
            .header("content-type", "application/json")
            .json(&request_body)
            .send()
            .await
            .map_err(|e| {
                error!(error = %e, "Failed to send request to Anthropic API");
                if e.is_timeout() {
                    BackendError::Timeout(format!("Anthropic request timed out: {}", e))
                } else {
                    BackendError::RequestError(format!("Network error: {}", e))
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_else(|_| "Unknown error".to_string());
            error!(status = %status, error = %error_text, "Anthropic API returned error status");
            // 529 is Anthropic's "overloaded"
            return Err(BackendError::from_status("anthropic", status.as_u16(), error_text));
        }

        let parsed: AnthropicResponse = response.json().await.map_err(|e| {
            error!(error = %e, "Failed to parse Anthropic API response");
            BackendError::InvalidResponse(format!("Failed to parse response: {}", e))
        })?;

        let text = parsed
            .content
            .iter()
            .find(|c| c.content_type == "text")
            .and_then(|c| c.text.clone())
            .ok_or_else(|| BackendError::InvalidResponse("No text content in API response".to_string()))?;

        let payload = parse_json_strict(&text)?;
        let usage = parsed.usage.map(|u| BackendUsage {
            prompt_tokens: u.input_tokens,
            completion_tokens: u.output_tokens,
        });

        Ok(BackendResponse { payload, backend_id: Some(self.model_id.clone()), usage })
    }

    fn backend_id(&self) -> &str {
        &self.model_id
    }
}

#[derive(Debug, Serialize)]
struct AnthropicRequest {
    model: String,
    max_tokens: u32,
    temperature: f32,
    system: String,
    messages: Vec<AnthropicMessage>,
}

#[derive(Debug, Serialize)]
struct AnthropicMessage {
    role: String,
    content: Vec<AnthropicBlock>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
enum AnthropicBlock {
    Text { text: String },
    Image { source: AnthropicImageSource },
}

#[derive(Debug, Serialize)]
struct AnthropicImageSource {
    #[serde(rename = "type")]
    source_type: String,
    media_type: String,
    data: String,
}

#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    #[serde(default)]
    content: Vec<AnthropicResponseBlock>,
    usage: Option<AnthropicUsage>,
}

#[derive(Debug, Deserialize)]
struct AnthropicResponseBlock {
    #[serde(rename = "type")]
    content_type: String,
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AnthropicUsage {
    input_tokens: u32,
    output_tokens: u32,
}
