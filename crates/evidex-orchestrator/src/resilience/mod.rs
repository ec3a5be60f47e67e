//! Resilience for expert agent calls.
//!
//! Every agent gets its own [`ResilientInvoker`] (circuit breaker, retry with
//! backoff, per-attempt timeout), created lazily by the [`BreakerRegistry`].
//! Agents also share one [`RateLimiter`] that keeps a token bucket per agent.

pub mod circuit_breaker;
pub mod invoker;
pub mod rate_limiter;
pub mod retry;

use evidex_core::config::ResilienceSection;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

pub use circuit_breaker::{Admission, BreakerConfig, CircuitBreaker, CircuitState, CircuitStatus, Permit};
pub use invoker::ResilientInvoker;
pub use rate_limiter::RateLimiter;
pub use retry::RetryPolicy;

/// Lazily created invokers, one per call-site name.
#[derive(Debug)]
pub struct BreakerRegistry {
    breaker: BreakerConfig,
    retry: RetryPolicy,
    call_timeout: Duration,
    rate_limiter: Option<Arc<RateLimiter>>,
    invokers: Mutex<HashMap<String, Arc<ResilientInvoker>>>,
}

impl BreakerRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new(breaker: BreakerConfig, retry: RetryPolicy, call_timeout: Duration) -> Self {
        Self { breaker, retry, call_timeout, rate_limiter: None, invokers: Mutex::new(HashMap::new()) }
    }

    /// Builds a registry from the `[resilience]` config section.
    #[must_use]
    pub fn from_config(config: &ResilienceSection) -> Self {
        let registry = Self::new(
            BreakerConfig {
                failure_threshold: config.failure_threshold,
                success_threshold: config.success_threshold,
                open_timeout: config.open_timeout(),
            },
            RetryPolicy::new(
                config.max_attempts,
                config.initial_delay(),
                config.max_delay(),
                config.backoff_multiplier,
            ),
            config.call_timeout(),
        );
        if config.rate_limit_per_minute == 0 {
            return registry;
        }
        registry.with_rate_limiter(Arc::new(RateLimiter::new(config.rate_limit_per_minute)))
    }

    /// Attaches a rate limiter to every invoker created afterwards.
    #[must_use]
    pub fn with_rate_limiter(mut self, limiter: Arc<RateLimiter>) -> Self {
        self.rate_limiter = Some(limiter);
        self
    }

    /// The invoker for `name`, created on first use.
    pub fn invoker(&self, name: &str) -> Arc<ResilientInvoker> {
        let mut invokers = self.invokers.lock().unwrap_or_else(PoisonError::into_inner);
        let invoker = invokers.entry(name.to_string()).or_insert_with(|| {
            let mut invoker = ResilientInvoker::new(
                CircuitBreaker::new(name, self.breaker),
                self.retry.clone(),
                self.call_timeout,
            );
            if let Some(limiter) = &self.rate_limiter {
                invoker = invoker.with_rate_limiter(Arc::clone(limiter));
            }
            Arc::new(invoker)
        });
        Arc::clone(invoker)
    }

    /// Status of every breaker created so far, sorted by name.
    pub fn statuses(&self) -> Vec<(String, CircuitStatus)> {
        let invokers = self.invokers.lock().unwrap_or_else(PoisonError::into_inner);
        let mut statuses: Vec<_> =
            invokers.iter().map(|(name, invoker)| (name.clone(), invoker.status())).collect();
        statuses.sort_by(|a, b| a.0.cmp(&b.0));
        statuses
    }
}

impl Default for BreakerRegistry {
    fn default() -> Self {
        Self::from_config(&ResilienceSection::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_one_invoker_per_name() {
        let registry = BreakerRegistry::default();
        let a = registry.invoker("OutcomesAnalyst");
        let b = registry.invoker("OutcomesAnalyst");
        let c = registry.invoker("SurgicalExpert");

        assert!(Arc::ptr_eq(&a, &b));
        assert!(!Arc::ptr_eq(&a, &c));

        let names: Vec<String> = registry.statuses().into_iter().map(|(name, _)| name).collect();
        assert_eq!(names, vec!["OutcomesAnalyst", "SurgicalExpert"]);
    }

    #[test]
    fn test_from_config() {
        let config = ResilienceSection { failure_threshold: 2, rate_limit_per_minute: 0, ..ResilienceSection::default() };
        let registry = BreakerRegistry::from_config(&config);
        assert_eq!(registry.breaker.failure_threshold, 2);
        assert!(registry.rate_limiter.is_none());
        assert_eq!(registry.retry.calculate_delay(1), Duration::from_secs(2));
    }
}
