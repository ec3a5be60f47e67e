//! Circuit breaker plus retry around one call-site.

use evidex_abstraction::BackendError;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use super::circuit_breaker::{Admission, CircuitBreaker, CircuitStatus};
use super::rate_limiter::RateLimiter;
use super::retry::RetryPolicy;
use crate::error::InvokeError;

/// Protects one call-site (an agent) with a circuit breaker, per-attempt
/// timeouts, an optional rate limiter, and exponential-backoff retry.
///
/// Retries run inside a single breaker admission: one invocation records one
/// success or one failure no matter how many attempts it took. A half-open
/// trial gets exactly one attempt.
#[derive(Debug)]
pub struct ResilientInvoker {
    breaker: CircuitBreaker,
    retry: RetryPolicy,
    call_timeout: Duration,
    rate_limiter: Option<Arc<RateLimiter>>,
}

impl ResilientInvoker {
    /// Creates an invoker.
    #[must_use]
    pub fn new(breaker: CircuitBreaker, retry: RetryPolicy, call_timeout: Duration) -> Self {
        Self { breaker, retry, call_timeout, rate_limiter: None }
    }

    /// Consults `limiter` before every attempt.
    #[must_use]
    pub fn with_rate_limiter(mut self, limiter: Arc<RateLimiter>) -> Self {
        self.rate_limiter = Some(limiter);
        self
    }

    /// Call-site name.
    pub fn name(&self) -> &str {
        self.breaker.name()
    }

    /// Breaker snapshot.
    pub fn status(&self) -> CircuitStatus {
        self.breaker.status()
    }

    /// Runs `operation` under the breaker, retrying retryable failures.
    ///
    /// `operation` is called once per attempt. Cancelling the returned future
    /// records no outcome; a half-open trial slot it held is released.
    ///
    /// # Errors
    /// `CircuitOpen` if the breaker rejected the call, `NonRetryable` on the
    /// first non-retryable error, `AttemptsExhausted` when every attempt failed
    /// retryably.
    pub async fn invoke<T, F, Fut>(&self, mut operation: F) -> Result<T, InvokeError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, BackendError>>,
    {
        let name = self.name();
        let Some(permit) = self.breaker.try_acquire() else {
            debug!(name, "Call rejected, circuit open");
            return Err(InvokeError::CircuitOpen { name: name.to_string() });
        };

        let max_attempts = match permit.admission() {
            Admission::Normal => self.retry.max_attempts.max(1),
            Admission::Trial => 1,
        };

        let mut attempt = 0;
        loop {
            attempt += 1;

            let outcome = match self.rate_limiter.as_ref().map(|limiter| limiter.check(name)) {
                Some(Err(limited)) => Err(limited),
                _ => match tokio::time::timeout(self.call_timeout, operation()).await {
                    Ok(result) => result,
                    Err(_) => Err(BackendError::Timeout(format!(
                        "no response within {}ms",
                        self.call_timeout.as_millis()
                    ))),
                },
            };

            let error = match outcome {
                Ok(value) => {
                    permit.success();
                    if attempt > 1 {
                        debug!(name, attempt, "Call succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(error) => error,
            };

            if !error.is_retryable() {
                warn!(name, attempt, error = %error, "Non-retryable error");
                permit.failure();
                return Err(InvokeError::NonRetryable(error));
            }

            if attempt >= max_attempts {
                warn!(name, attempts = attempt, error = %error, "All attempts failed");
                permit.failure();
                return Err(InvokeError::AttemptsExhausted { attempts: attempt, last_error: error });
            }

            let delay = self.retry.calculate_delay(attempt - 1);
            debug!(name, attempt, delay_ms = delay.as_millis() as u64, error = %error, "Retrying after backoff");
            tokio::time::sleep(delay).await;
        }
    }
}
