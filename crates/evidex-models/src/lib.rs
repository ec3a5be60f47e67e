//! Backend implementations for Evidex.
//!
//! This crate provides concrete implementations of the `ExpertBackend` trait.
//!
//! # Supported Providers
//!
//! - **Mock**: Scripted responses for testing and development
//! - **Gemini**: Google's Gemini models with native response schemas (API key required)
//! - **Anthropic**: Claude models via the Messages API (API key required)
//! - **Fallback**: Primary backend with failover to a secondary on retryable errors

pub mod anthropic;
pub mod factory;
pub mod fallback;
pub mod gemini;

use async_trait::async_trait;
use evidex_abstraction::{BackendError, BackendRequest, BackendResponse, ExpertBackend};
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tracing::debug;

pub use anthropic::AnthropicBackend;
pub use factory::{BackendConfig, BackendFactory, BackendType};
pub use fallback::FallbackBackend;
pub use gemini::GeminiBackend;

/// One scripted reply of a [`MockBackend`].
#[derive(Debug, Clone)]
pub enum MockReply {
    /// Return this JSON payload.
    Payload(serde_json::Value),
    /// Fail with this error.
    Error(BackendError),
    /// Sleep for the duration, then produce the inner reply.
    Delayed(Duration, Box<MockReply>),
}

impl MockReply {
    /// Convenience constructor for a delayed reply.
    #[must_use]
    pub fn delayed(delay: Duration, reply: MockReply) -> Self {
        Self::Delayed(delay, Box::new(reply))
    }
}

/// A scripted implementation of `ExpertBackend` for testing.
///
/// Replies are routed by a key that must appear in the request's system
/// instruction (agents put their name there). Each route plays its queue in
/// order; once a queue is exhausted, or when no route matches, the default
/// reply is used.
#[derive(Debug)]
pub struct MockBackend {
    id: String,
    routes: Mutex<Vec<(String, VecDeque<MockReply>)>>,
    default_reply: MockReply,
    calls: AtomicUsize,
    calls_by_route: Mutex<HashMap<String, usize>>,
}

impl MockBackend {
    /// Creates a new `MockBackend` answering every request with `default_reply`.
    #[must_use]
    pub fn new(id: impl Into<String>, default_reply: MockReply) -> Self {
        Self {
            id: id.into(),
            routes: Mutex::new(Vec::new()),
            default_reply,
            calls: AtomicUsize::new(0),
            calls_by_route: Mutex::new(HashMap::new()),
        }
    }

    /// Adds a route: requests whose system instruction contains `key` play `replies` in order.
    #[must_use]
    pub fn with_route(self, key: impl Into<String>, replies: Vec<MockReply>) -> Self {
        self.routes
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push((key.into(), replies.into()));
        self
    }

    /// Total number of `generate` calls received.
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Number of calls that matched the route `key`.
    pub fn route_calls(&self, key: &str) -> usize {
        self.calls_by_route
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .get(key)
            .copied()
            .unwrap_or(0)
    }

    fn next_reply(&self, instruction: &str) -> MockReply {
        let mut routes = self.routes.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        for (key, queue) in routes.iter_mut() {
            if instruction.contains(key.as_str()) {
                *self
                    .calls_by_route
                    .lock()
                    .unwrap_or_else(std::sync::PoisonError::into_inner)
                    .entry(key.clone())
                    .or_insert(0) += 1;
                return queue.pop_front().unwrap_or_else(|| self.default_reply.clone());
            }
        }
        self.default_reply.clone()
    }
}

#[async_trait]
impl ExpertBackend for MockBackend {
    async fn generate(&self, request: &BackendRequest) -> Result<BackendResponse, BackendError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut reply = self.next_reply(&request.system_instruction);

        debug!(backend_id = %self.id, reply = ?reply, "MockBackend answering request");

        loop {
            match reply {
                MockReply::Payload(payload) => {
                    return Ok(BackendResponse {
                        payload,
                        backend_id: Some(self.id.clone()),
                        usage: None,
                    });
                }
                MockReply::Error(error) => return Err(error),
                MockReply::Delayed(delay, inner) => {
                    tokio::time::sleep(delay).await;
                    reply = *inner;
                }
            }
        }
    }

    fn backend_id(&self) -> &str {
        &self.id
    }
}
