//! Google Gemini backend implementation.
//!
//! Uses `generateContent` with a dedicated `systemInstruction` field and native
//! structured output (`responseMimeType` + `responseSchema`). Binary content is
//! sent as an `inlineData` part.

use async_trait::async_trait;
use evidex_abstraction::{
    BackendError, BackendRequest, BackendResponse, BackendUsage, ExpertBackend, UserContent,
    parse_json_strict,
};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::env;
use tracing::{debug, error};

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
const DEFAULT_TEMPERATURE: f32 = 0.3;

/// Google Gemini backend.
#[derive(Debug, Clone)]
pub struct GeminiBackend {
    /// The model ID (e.g., "gemini-2.5-flash").
    model_id: String,
    /// The API key for authentication.
    api_key: String,
    /// The base URL for the Gemini API.
    base_url: String,
    /// HTTP client for making requests.
    client: Client,
}

impl GeminiBackend {
    /// Creates a new `GeminiBackend` reading the key from `GEMINI_API_KEY`.
    ///
    /// # Errors
    /// Returns `BackendError::UnsupportedBackend` if the API key is not set.
    #[allow(clippy::disallowed_methods)] // env::var is needed for API key loading
    pub fn new(model_id: String) -> Result<Self, BackendError> {
        let api_key = env::var("GEMINI_API_KEY").map_err(|_| {
            BackendError::UnsupportedBackend("GEMINI_API_KEY environment variable not set".to_string())
        })?;
        Ok(Self::with_api_key(model_id, api_key))
    }

    /// Creates a new `GeminiBackend` with an explicit API key.
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

    fn to_parts(content: &UserContent) -> Vec<GeminiPart> {
        match content {
            UserContent::Text(text) => vec![GeminiPart::Text { text: text.clone() }],
            UserContent::Binary { mime_type, .. } => vec![GeminiPart::InlineData {
                inline_data: GeminiInlineData {
                    mime_type: mime_type.clone(),
                    data: content.to_base64().unwrap_or_default(),
                },
            }],
        }
    }
}

#[async_trait]
impl ExpertBackend for GeminiBackend {
    async fn generate(&self, request: &BackendRequest) -> Result<BackendResponse, BackendError> {
        debug!(
            model_id = %self.model_id,
            instruction_len = request.system_instruction.len(),
            "GeminiBackend generating structured content"
        );

        let url = format!("{}/models/{}:generateContent", self.base_url, self.model_id);

        let request_body = GeminiRequest {
            contents: vec![GeminiContent {
                role: "user".to_string(),
                parts: Self::to_parts(&request.user_content),
            }],
            system_instruction: GeminiSystemInstruction {
                parts: vec![GeminiPart::Text { text: request.system_instruction.clone() }],
            },
            generation_config: GeminiGenerationConfig {
                temperature: request.temperature.unwrap_or(DEFAULT_TEMPERATURE),
                response_mime_type: "application/json".to_string(),
                response_schema: request.response_schema.clone(),
            },
        };

        let response = self
            .client
            .post(&url)
            .query(&[("key", self.api_key.as_str())])
            .json(&request_body)
            .send()
            .await
            .map_err(|e| {
                error!(error = %e, "Failed to send request to Gemini API");
                if e.is_timeout() {
                    BackendError::Timeout(format!("Gemini request timed out: {}", e))
                } else {
                    BackendError::RequestError(format!("Network error: {}", e))
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_else(|_| "Unknown error".to_string());
            error!(status = %status, error = %error_text, "Gemini API returned error status");
            return Err(BackendError::from_status("gemini", status.as_u16(), error_text));
        }

        let gemini_response: GeminiResponse = response.json().await.map_err(|e| {
            error!(error = %e, "Failed to parse Gemini API response");
            BackendError::InvalidResponse(format!("Failed to parse response: {}", e))
        })?;

        let text = gemini_response
            .candidates
            .first()
            .and_then(|c| c.content.parts.iter().find_map(|p| p.text.clone()))
            .ok_or_else(|| {
                error!("No text content in Gemini API response");
                BackendError::InvalidResponse("No content in API response".to_string())
            })?;

        let payload = parse_json_strict(&text)?;

        let usage = gemini_response.usage_metadata.map(|meta| BackendUsage {
            prompt_tokens: meta.prompt_token_count.unwrap_or(0),
            completion_tokens: meta.candidates_token_count.unwrap_or(0),
        });

        Ok(BackendResponse { payload, backend_id: Some(self.model_id.clone()), usage })
    }

    fn backend_id(&self) -> &str {
        &self.model_id
    }
}

// Gemini API request/response structures

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest {
    contents: Vec<GeminiContent>,
    system_instruction: GeminiSystemInstruction,
    generation_config: GeminiGenerationConfig,
}

#[derive(Debug, Serialize)]
struct GeminiSystemInstruction {
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Serialize)]
struct GeminiContent {
    role: String,
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum GeminiPart {
    Text {
        text: String,
    },
    InlineData {
        #[serde(rename = "inlineData")]
        inline_data: GeminiInlineData,
    },
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiInlineData {
    mime_type: String,
    data: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiGenerationConfig {
    temperature: f32,
    response_mime_type: String,
    response_schema: serde_json::Value,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
    usage_metadata: Option<GeminiUsageMetadata>,
}

#[derive(Debug, Deserialize)]
struct GeminiCandidate {
    content: GeminiResponseContent,
}

#[derive(Debug, Deserialize)]
struct GeminiResponseContent {
    #[serde(default)]
    parts: Vec<GeminiResponsePart>,
}

#[derive(Debug, Deserialize)]
struct GeminiResponsePart {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiUsageMetadata {
    prompt_token_count: Option<u32>,
    candidates_token_count: Option<u32>,
}
