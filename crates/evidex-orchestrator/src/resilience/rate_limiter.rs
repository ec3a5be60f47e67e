//! Token-bucket rate limiting per agent.

use evidex_abstraction::BackendError;
use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use tokio::time::Instant;
use tracing::debug;

/// Bucket refilled continuously at `tokens_per_minute`, holding at most that many tokens.
#[derive(Debug, Clone)]
struct TokenBucket {
    tokens_per_minute: f64,
    tokens: f64,
    last_refill: Instant,
}

impl TokenBucket {
    fn new(tokens_per_minute: u32) -> Self {
        let capacity = f64::from(tokens_per_minute);
        Self { tokens_per_minute: capacity, tokens: capacity, last_refill: Instant::now() }
    }

    fn refill(&mut self) {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed / 60.0 * self.tokens_per_minute).min(self.tokens_per_minute);
        self.last_refill = now;
    }

    fn try_consume(&mut self) -> bool {
        self.refill();
        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }
}

/// Keyed token buckets, one per agent, created on first use.
#[derive(Debug)]
pub struct RateLimiter {
    tokens_per_minute: u32,
    buckets: Mutex<HashMap<String, TokenBucket>>,
}

impl RateLimiter {
    /// Creates a limiter. `0` tokens per minute disables limiting.
    #[must_use]
    pub fn new(tokens_per_minute: u32) -> Self {
        Self { tokens_per_minute, buckets: Mutex::new(HashMap::new()) }
    }

    /// Takes one token for `key`.
    ///
    /// # Errors
    /// Returns a retryable `RateLimited` error when the bucket is empty.
    pub fn check(&self, key: &str) -> Result<(), BackendError> {
        if self.tokens_per_minute == 0 {
            return Ok(());
        }

        let mut buckets = self.buckets.lock().unwrap_or_else(PoisonError::into_inner);
        let bucket = buckets.entry(key.to_string()).or_insert_with(|| TokenBucket::new(self.tokens_per_minute));
        if bucket.try_consume() {
            return Ok(());
        }

        debug!(key, "Local rate limit exceeded");
        Err(BackendError::RateLimited {
            provider: "local".to_string(),
            message: Some(format!(
                "Rate limit exceeded. Maximum {} requests per minute.",
                self.tokens_per_minute
            )),
        })
    }
}
