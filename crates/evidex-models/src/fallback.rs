//! Provider failover.
//!
//! Wraps a primary and a fallback backend. The fallback is only consulted when
//! the primary fails with a retryable error (quota, rate limit, timeout, 5xx);
//! non-retryable primary failures are returned unchanged.

use async_trait::async_trait;
use evidex_abstraction::{BackendError, BackendRequest, BackendResponse, ExpertBackend};
use std::sync::Arc;
use tracing::{info, warn};

/// Backend that fails over from a primary to a fallback provider.
pub struct FallbackBackend {
    id: String,
    primary: Arc<dyn ExpertBackend>,
    fallback: Arc<dyn ExpertBackend>,
}

impl FallbackBackend {
    /// Creates a new failover pair.
    #[must_use]
    pub fn new(primary: Arc<dyn ExpertBackend>, fallback: Arc<dyn ExpertBackend>) -> Self {
        let id = format!("{}+{}", primary.backend_id(), fallback.backend_id());
        Self { id, primary, fallback }
    }
}

impl std::fmt::Debug for FallbackBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FallbackBackend").field("id", &self.id).finish_non_exhaustive()
    }
}

#[async_trait]
impl ExpertBackend for FallbackBackend {
    async fn generate(&self, request: &BackendRequest) -> Result<BackendResponse, BackendError> {
        let primary_error = match self.primary.generate(request).await {
            Ok(response) => return Ok(response),
            Err(e) => e,
        };

        if !primary_error.is_retryable() {
            return Err(primary_error);
        }

        warn!(
            primary = %self.primary.backend_id(),
            fallback = %self.fallback.backend_id(),
            error = %primary_error,
            "Primary backend failed, trying fallback"
        );

        match self.fallback.generate(request).await {
            Ok(response) => {
                info!(
                    fallback = %self.fallback.backend_id(),
                    "Fallback backend succeeded after primary failure"
                );
                Ok(response)
            }
            Err(fallback_error) => {
                warn!(
                    primary_error = %primary_error,
                    fallback_error = %fallback_error,
                    "All backends failed"
                );
                // The fallback's category decides whether the caller retries the pair.
                Err(fallback_error)
            }
        }
    }

    fn backend_id(&self) -> &str {
        &self.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{MockBackend, MockReply};
    use evidex_abstraction::UserContent;
    use serde_json::json;

    fn request() -> BackendRequest {
        BackendRequest::new("agent", UserContent::Text("t".into()), json!({}))
    }

    #[tokio::test]
    async fn test_primary_success_skips_fallback() {
        let primary = Arc::new(MockBackend::new("gemini", MockReply::Payload(json!({"from": "p"}))));
        let fallback = Arc::new(MockBackend::new("claude", MockReply::Payload(json!({"from": "f"}))));
        let backend = FallbackBackend::new(primary, fallback.clone());

        let response = backend.generate(&request()).await.unwrap();
        assert_eq!(response.payload["from"], "p");
        assert_eq!(fallback.call_count(), 0);
        assert_eq!(backend.backend_id(), "gemini+claude");
    }

    #[tokio::test]
    async fn test_retryable_primary_error_uses_fallback() {
        let primary = Arc::new(MockBackend::new(
            "gemini",
            MockReply::Error(BackendError::Status { status: 503, message: "down".into() }),
        ));
        let fallback = Arc::new(MockBackend::new("claude", MockReply::Payload(json!({"from": "f"}))));
        let backend = FallbackBackend::new(primary, fallback.clone());

        let response = backend.generate(&request()).await.unwrap();
        assert_eq!(response.payload["from"], "f");
        assert_eq!(fallback.call_count(), 1);
    }

    #[tokio::test]
    async fn test_non_retryable_primary_error_is_returned() {
        let primary = Arc::new(MockBackend::new(
            "gemini",
            MockReply::Error(BackendError::Unauthorized("bad key".into())),
        ));
        let fallback = Arc::new(MockBackend::new("claude", MockReply::Payload(json!({}))));
        let backend = FallbackBackend::new(primary, fallback.clone());

        let err = backend.generate(&request()).await.unwrap_err();
        assert!(matches!(err, BackendError::Unauthorized(_)));
        assert_eq!(fallback.call_count(), 0);
    }
}
