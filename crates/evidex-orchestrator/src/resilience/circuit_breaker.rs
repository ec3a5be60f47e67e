//! Circuit breaker for one protected call-site.

use serde::Serialize;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Circuit breaker thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BreakerConfig {
    /// Consecutive failed invocations that open the circuit (default: 5).
    pub failure_threshold: u32,
    /// Successful trials that close a half-open circuit (default: 2).
    pub success_threshold: u32,
    /// How long the circuit stays open before admitting a trial (default: 60s).
    pub open_timeout: Duration,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self { failure_threshold: 5, success_threshold: 2, open_timeout: Duration::from_secs(60) }
    }
}

/// Circuit breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    /// Calls pass through.
    Closed,
    /// Calls are rejected until the open timeout elapses.
    Open,
    /// Single trial calls test for recovery.
    HalfOpen,
}

/// How a call was let through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// Admitted while closed.
    Normal,
    /// Admitted as the single half-open trial.
    Trial,
}

/// Point-in-time view of a breaker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CircuitStatus {
    /// Current state.
    pub state: CircuitState,
    /// Consecutive failures counted while closed.
    pub failure_count: u32,
    /// Successful trials counted while half-open.
    pub success_count: u32,
    /// Remaining open time, when open.
    pub time_until_retry: Option<Duration>,
}

#[derive(Debug)]
struct BreakerInner {
    state: CircuitState,
    failure_count: u32,
    success_count: u32,
    opened_at: Option<Instant>,
    trial_in_flight: bool,
}

/// An admitted call, settled with [`success`](Self::success) or
/// [`failure`](Self::failure).
///
/// Dropping a permit unsettled (the caller was cancelled mid-call) records
/// no outcome but frees the half-open trial slot for the next caller.
#[derive(Debug)]
#[must_use = "an unsettled permit records no outcome"]
pub struct Permit<'a> {
    breaker: &'a CircuitBreaker,
    admission: Admission,
    settled: bool,
}

impl Permit<'_> {
    /// How the call was let through.
    pub const fn admission(&self) -> Admission {
        self.admission
    }

    /// Records a successful invocation.
    pub fn success(mut self) {
        self.settled = true;
        self.breaker.record_success(self.admission);
    }

    /// Records a failed invocation.
    pub fn failure(mut self) {
        self.settled = true;
        self.breaker.record_failure(self.admission);
    }
}

impl Drop for Permit<'_> {
    fn drop(&mut self) {
        if !self.settled {
            self.breaker.release(self.admission);
        }
    }
}

/// Tracks consecutive failures of one call-site and rejects calls while the
/// site is considered down.
#[derive(Debug)]
pub struct CircuitBreaker {
    name: String,
    config: BreakerConfig,
    inner: Mutex<BreakerInner>,
}

impl CircuitBreaker {
    /// Creates a closed breaker.
    #[must_use]
    pub fn new(name: impl Into<String>, config: BreakerConfig) -> Self {
        Self {
            name: name.into(),
            config,
            inner: Mutex::new(BreakerInner {
                state: CircuitState::Closed,
                failure_count: 0,
                success_count: 0,
                opened_at: None,
                trial_in_flight: false,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, BreakerInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Call-site name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Asks to make a call. Returns `None` when the circuit rejects it.
    pub fn try_acquire(&self) -> Option<Permit<'_>> {
        let admission = self.admit()?;
        Some(Permit { breaker: self, admission, settled: false })
    }

    fn admit(&self) -> Option<Admission> {
        let mut inner = self.lock();
        match inner.state {
            CircuitState::Closed => Some(Admission::Normal),
            CircuitState::Open => {
                let expired = inner.opened_at.is_none_or(|at| at.elapsed() >= self.config.open_timeout);
                if !expired {
                    return None;
                }
                inner.state = CircuitState::HalfOpen;
                inner.success_count = 0;
                inner.trial_in_flight = true;
                debug!(name = %self.name, "Circuit breaker: Open -> HalfOpen (timeout elapsed)");
                Some(Admission::Trial)
            }
            CircuitState::HalfOpen => {
                if inner.trial_in_flight {
                    return None;
                }
                inner.trial_in_flight = true;
                Some(Admission::Trial)
            }
        }
    }

    fn record_success(&self, admission: Admission) {
        let mut inner = self.lock();
        match (admission, inner.state) {
            (Admission::Normal, CircuitState::Closed) => inner.failure_count = 0,
            (Admission::Trial, CircuitState::HalfOpen) => {
                inner.trial_in_flight = false;
                inner.success_count += 1;
                if inner.success_count >= self.config.success_threshold {
                    inner.state = CircuitState::Closed;
                    inner.failure_count = 0;
                    inner.success_count = 0;
                    inner.opened_at = None;
                    debug!(name = %self.name, "Circuit breaker: HalfOpen -> Closed (recovery successful)");
                }
            }
            // Outcomes of calls admitted under an earlier state are ignored
            _ => {}
        }
    }

    fn record_failure(&self, admission: Admission) {
        let mut inner = self.lock();
        match (admission, inner.state) {
            (Admission::Normal, CircuitState::Closed) => {
                inner.failure_count += 1;
                if inner.failure_count >= self.config.failure_threshold {
                    inner.state = CircuitState::Open;
                    inner.opened_at = Some(Instant::now());
                    warn!(
                        name = %self.name,
                        failures = inner.failure_count,
                        "Circuit breaker: Closed -> Open (failure threshold reached)"
                    );
                }
            }
            (Admission::Trial, CircuitState::HalfOpen) => {
                inner.trial_in_flight = false;
                inner.state = CircuitState::Open;
                inner.success_count = 0;
                inner.opened_at = Some(Instant::now());
                warn!(name = %self.name, "Circuit breaker: HalfOpen -> Open (recovery failed)");
            }
            _ => {}
        }
    }

    fn release(&self, admission: Admission) {
        let mut inner = self.lock();
        if admission == Admission::Trial && inner.state == CircuitState::HalfOpen && inner.trial_in_flight {
            inner.trial_in_flight = false;
            debug!(name = %self.name, "Circuit breaker: trial abandoned, slot released");
        }
    }

    /// Current state. Does not advance an expired open circuit.
    pub fn state(&self) -> CircuitState {
        self.lock().state
    }

    /// Snapshot of state and counters.
    pub fn status(&self) -> CircuitStatus {
        let inner = self.lock();
        let time_until_retry = match (inner.state, inner.opened_at) {
            (CircuitState::Open, Some(at)) => Some(self.config.open_timeout.saturating_sub(at.elapsed())),
            _ => None,
        };
        CircuitStatus {
            state: inner.state,
            failure_count: inner.failure_count,
            success_count: inner.success_count,
            time_until_retry,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn breaker() -> CircuitBreaker {
        CircuitBreaker::new("OutcomesAnalyst", BreakerConfig::default())
    }

    fn fail(breaker: &CircuitBreaker, times: u32) {
        for _ in 0..times {
            breaker.try_acquire().unwrap().failure();
        }
    }

    #[test]
    fn test_opens_after_exactly_threshold_failures() {
        let breaker = breaker();
        fail(&breaker, 4);
        assert_eq!(breaker.state(), CircuitState::Closed);
        assert_eq!(breaker.status().failure_count, 4);

        fail(&breaker, 1);
        assert_eq!(breaker.state(), CircuitState::Open);
        assert!(breaker.try_acquire().is_none());
    }

    #[test]
    fn test_success_resets_failure_count() {
        let breaker = breaker();
        fail(&breaker, 4);
        breaker.try_acquire().unwrap().success();
        assert_eq!(breaker.status().failure_count, 0);

        fail(&breaker, 4);
        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_single_trial_after_timeout() {
        let breaker = breaker();
        fail(&breaker, 5);

        tokio::time::advance(Duration::from_secs(59)).await;
        assert!(breaker.try_acquire().is_none());
        let remaining = breaker.status().time_until_retry.unwrap();
        assert_eq!(remaining, Duration::from_secs(1));

        tokio::time::advance(Duration::from_secs(1)).await;
        let trial = breaker.try_acquire().unwrap();
        assert_eq!(trial.admission(), Admission::Trial);
        assert_eq!(breaker.state(), CircuitState::HalfOpen);

        // A second caller is rejected while the trial is in flight
        assert!(breaker.try_acquire().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_half_open_closes_after_success_threshold() {
        let breaker = breaker();
        fail(&breaker, 5);
        tokio::time::advance(Duration::from_secs(60)).await;

        breaker.try_acquire().unwrap().success();
        assert_eq!(breaker.state(), CircuitState::HalfOpen);
        assert_eq!(breaker.status().success_count, 1);

        let second = breaker.try_acquire().unwrap();
        assert_eq!(second.admission(), Admission::Trial);
        second.success();
        assert_eq!(breaker.state(), CircuitState::Closed);

        let status = breaker.status();
        assert_eq!(status.failure_count, 0);
        assert_eq!(status.success_count, 0);
        assert_eq!(breaker.try_acquire().map(|permit| permit.admission()), Some(Admission::Normal));
    }

    #[tokio::test(start_paused = true)]
    async fn test_half_open_failure_reopens() {
        let breaker = breaker();
        fail(&breaker, 5);
        tokio::time::advance(Duration::from_secs(60)).await;

        breaker.try_acquire().unwrap().failure();
        assert_eq!(breaker.state(), CircuitState::Open);
        assert_eq!(breaker.status().time_until_retry, Some(Duration::from_secs(60)));
        assert!(breaker.try_acquire().is_none());
    }

    #[test]
    fn test_late_outcome_from_closed_period_is_ignored() {
        let breaker = breaker();
        let straggler = breaker.try_acquire().unwrap();
        fail(&breaker, 5);

        straggler.success();
        assert_eq!(breaker.state(), CircuitState::Open);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_trial_frees_the_slot() {
        let breaker = breaker();
        fail(&breaker, 5);
        tokio::time::advance(Duration::from_secs(60)).await;

        let trial = breaker.try_acquire().unwrap();
        assert!(breaker.try_acquire().is_none());
        drop(trial);

        let status = breaker.status();
        assert_eq!(status.state, CircuitState::HalfOpen);
        assert_eq!(status.success_count, 0);

        let retry = breaker.try_acquire().unwrap();
        assert_eq!(retry.admission(), Admission::Trial);
        retry.success();
        breaker.try_acquire().unwrap().success();
        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    #[test]
    fn test_dropped_normal_permit_records_nothing() {
        let breaker = breaker();
        fail(&breaker, 4);
        drop(breaker.try_acquire().unwrap());
        assert_eq!(breaker.status().failure_count, 4);
        assert_eq!(breaker.state(), CircuitState::Closed);
    }
}
