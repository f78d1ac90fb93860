/*!
 * # Circuit Breaker
 *
 * Failure isolation for outbound calls to the third-party manufacturing API.
 * Every transition takes an explicit `Instant` in its `_at` form so the state
 * machine can be driven deterministically; the plain forms use `Instant::now()`.
 */

use serde::Serialize;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};
use thiserror::Error;

/// Circuit breaker states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    /// Calls flow through
    Closed,
    /// Calls are rejected until the cooldown elapses
    Open,
    /// A limited number of probe calls are let through
    HalfOpen,
}

/// Circuit breaker configuration
#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures before opening the circuit
    pub failure_threshold: u32,
    /// How long the circuit stays open before probing
    pub timeout: Duration,
    /// Probe calls allowed in HalfOpen, and successes needed to close
    pub success_threshold: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 10,
            timeout: Duration::from_secs(300),
            success_threshold: 3,
        }
    }
}

/// How a failed call failed. The third-party API answers 405 when the
/// endpoint is configured with the wrong method, which is tracked apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    MethodNotAllowed,
    Other,
}

#[derive(Debug)]
struct CircuitBreakerState {
    state: CircuitState,
    failure_count: u32,
    success_count: u32,
    half_open_calls: u32,
    last_failure_time: Option<Instant>,
    opened_at: Option<Instant>,
    total_calls: u64,
    total_successes: u64,
    total_failures: u64,
    method_not_allowed_errors: u64,
    other_errors: u64,
    rejected_calls: u64,
    state_transitions: u32,
}

impl CircuitBreakerState {
    fn new() -> Self {
        Self {
            state: CircuitState::Closed,
            failure_count: 0,
            success_count: 0,
            half_open_calls: 0,
            last_failure_time: None,
            opened_at: None,
            total_calls: 0,
            total_successes: 0,
            total_failures: 0,
            method_not_allowed_errors: 0,
            other_errors: 0,
            rejected_calls: 0,
            state_transitions: 0,
        }
    }

    fn transition(&mut self, to: CircuitState, now: Instant) {
        if self.state == to {
            return;
        }
        tracing::info!(from = ?self.state, to = ?to, "circuit breaker state change");
        self.state = to;
        self.state_transitions += 1;
        match to {
            CircuitState::Open => {
                self.opened_at = Some(now);
                self.success_count = 0;
                self.half_open_calls = 0;
            }
            CircuitState::HalfOpen => {
                self.success_count = 0;
                self.half_open_calls = 0;
            }
            CircuitState::Closed => {
                self.failure_count = 0;
                self.success_count = 0;
                self.half_open_calls = 0;
                self.opened_at = None;
            }
        }
    }
}

/// Circuit breaker implementation
#[derive(Debug)]
pub struct CircuitBreaker {
    config: CircuitBreakerConfig,
    state: Mutex<CircuitBreakerState>,
}

/// Circuit breaker errors
#[derive(Error, Debug, PartialEq, Eq)]
pub enum CircuitBreakerError {
    #[error("Circuit breaker is open")]
    CircuitOpen,
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::with_config(CircuitBreakerConfig::default())
    }
}

impl CircuitBreaker {
    pub fn new(failure_threshold: u32, timeout: Duration, success_threshold: u32) -> Self {
        Self::with_config(CircuitBreakerConfig {
            failure_threshold,
            timeout,
            success_threshold,
        })
    }

    pub fn with_config(config: CircuitBreakerConfig) -> Self {
        Self {
            config,
            state: Mutex::new(CircuitBreakerState::new()),
        }
    }

    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    fn lock(&self) -> MutexGuard<'_, CircuitBreakerState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    pub fn try_acquire(&self) -> Result<(), CircuitBreakerError> {
        self.try_acquire_at(Instant::now())
    }

    /// Asks permission for one call at `now`.
    pub fn try_acquire_at(&self, now: Instant) -> Result<(), CircuitBreakerError> {
        let mut state = self.lock();

        if state.state == CircuitState::Open {
            let cooled_down = state
                .opened_at
                .map(|opened| now.saturating_duration_since(opened) >= self.config.timeout)
                .unwrap_or(true);
            if cooled_down {
                state.transition(CircuitState::HalfOpen, now);
            }
        }

        match state.state {
            CircuitState::Closed => {
                state.total_calls += 1;
                Ok(())
            }
            CircuitState::HalfOpen if state.half_open_calls < self.config.success_threshold => {
                state.half_open_calls += 1;
                state.total_calls += 1;
                Ok(())
            }
            _ => {
                state.rejected_calls += 1;
                Err(CircuitBreakerError::CircuitOpen)
            }
        }
    }

    pub fn record_success(&self) {
        self.record_success_at(Instant::now())
    }

    pub fn record_success_at(&self, now: Instant) {
        let mut state = self.lock();
        state.total_successes += 1;

        match state.state {
            CircuitState::Closed => state.failure_count = 0,
            CircuitState::HalfOpen => {
                state.success_count += 1;
                if state.success_count >= self.config.success_threshold {
                    state.transition(CircuitState::Closed, now);
                }
            }
            // a call admitted before the circuit opened finished late
            CircuitState::Open => {}
        }
    }

    pub fn record_failure(&self, kind: FailureKind) {
        self.record_failure_at(kind, Instant::now())
    }

    pub fn record_failure_at(&self, kind: FailureKind, now: Instant) {
        let mut state = self.lock();
        state.total_failures += 1;
        state.failure_count += 1;
        state.last_failure_time = Some(now);
        match kind {
            FailureKind::MethodNotAllowed => state.method_not_allowed_errors += 1,
            FailureKind::Other => state.other_errors += 1,
        }

        match state.state {
            CircuitState::Closed => {
                if state.failure_count >= self.config.failure_threshold {
                    state.transition(CircuitState::Open, now);
                }
            }
            CircuitState::HalfOpen => state.transition(CircuitState::Open, now),
            CircuitState::Open => {}
        }
    }

    /// Forces the breaker back to Closed and clears the consecutive counters.
    pub fn reset(&self) {
        let mut state = self.lock();
        state.transition(CircuitState::Closed, Instant::now());
        state.last_failure_time = None;
    }

    pub fn state(&self) -> CircuitState {
        self.lock().state
    }

    pub fn metrics(&self) -> CircuitBreakerMetrics {
        self.metrics_at(Instant::now())
    }

    pub fn metrics_at(&self, now: Instant) -> CircuitBreakerMetrics {
        let state = self.lock();
        let retry_in_secs = match (state.state, state.opened_at) {
            (CircuitState::Open, Some(opened)) => Some(
                self.config
                    .timeout
                    .saturating_sub(now.saturating_duration_since(opened))
                    .as_secs(),
            ),
            _ => None,
        };
        CircuitBreakerMetrics {
            state: state.state,
            failure_count: state.failure_count,
            success_count: state.success_count,
            failure_threshold: self.config.failure_threshold,
            success_threshold: self.config.success_threshold,
            timeout_secs: self.config.timeout.as_secs(),
            retry_in_secs,
            total_calls: state.total_calls,
            total_failures: state.total_failures,
            total_successes: state.total_successes,
            rejected_calls: state.rejected_calls,
            method_not_allowed_errors: state.method_not_allowed_errors,
            other_errors: state.other_errors,
            state_transitions: state.state_transitions,
        }
    }
}

/// Snapshot served to admins
#[derive(Debug, Clone, Serialize)]
pub struct CircuitBreakerMetrics {
    pub state: CircuitState,
    pub failure_count: u32,
    pub success_count: u32,
    pub failure_threshold: u32,
    pub success_threshold: u32,
    pub timeout_secs: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_in_secs: Option<u64>,
    pub total_calls: u64,
    pub total_failures: u64,
    pub total_successes: u64,
    pub rejected_calls: u64,
    pub method_not_allowed_errors: u64,
    pub other_errors: u64,
    pub state_transitions: u32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn breaker() -> CircuitBreaker {
        CircuitBreaker::new(3, Duration::from_secs(300), 2)
    }

    fn fail_n(cb: &CircuitBreaker, n: u32, at: Instant) {
        for _ in 0..n {
            cb.try_acquire_at(at).unwrap();
            cb.record_failure_at(FailureKind::Other, at);
        }
    }

    #[test]
    fn defaults_match_notifier_policy() {
        let cfg = CircuitBreakerConfig::default();
        assert_eq!(cfg.failure_threshold, 10);
        assert_eq!(cfg.timeout, Duration::from_secs(300));
        assert_eq!(cfg.success_threshold, 3);
    }

    #[test]
    fn opens_after_consecutive_failures() {
        let cb = breaker();
        let t0 = Instant::now();
        fail_n(&cb, 2, t0);
        assert_eq!(cb.state(), CircuitState::Closed);
        fail_n(&cb, 1, t0);
        assert_eq!(cb.state(), CircuitState::Open);
        assert_matches!(cb.try_acquire_at(t0), Err(CircuitBreakerError::CircuitOpen));
    }

    #[test]
    fn success_resets_consecutive_failures() {
        let cb = breaker();
        let t0 = Instant::now();
        fail_n(&cb, 2, t0);
        cb.try_acquire_at(t0).unwrap();
        cb.record_success_at(t0);
        fail_n(&cb, 2, t0);
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[test]
    fn half_open_after_cooldown_limits_probes() {
        let cb = breaker();
        let t0 = Instant::now();
        fail_n(&cb, 3, t0);

        let before = t0 + Duration::from_secs(299);
        assert!(cb.try_acquire_at(before).is_err());

        let after = t0 + Duration::from_secs(300);
        assert!(cb.try_acquire_at(after).is_ok());
        assert_eq!(cb.state(), CircuitState::HalfOpen);
        assert!(cb.try_acquire_at(after).is_ok());
        assert!(cb.try_acquire_at(after).is_err());
    }

    #[test]
    fn half_open_closes_after_enough_successes() {
        let cb = breaker();
        let t0 = Instant::now();
        fail_n(&cb, 3, t0);
        let later = t0 + Duration::from_secs(301);
        for _ in 0..2 {
            cb.try_acquire_at(later).unwrap();
            cb.record_success_at(later);
        }
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[test]
    fn half_open_failure_reopens() {
        let cb = breaker();
        let t0 = Instant::now();
        fail_n(&cb, 3, t0);
        let later = t0 + Duration::from_secs(301);
        cb.try_acquire_at(later).unwrap();
        cb.record_failure_at(FailureKind::Other, later);
        assert_eq!(cb.state(), CircuitState::Open);
        assert!(cb.try_acquire_at(later + Duration::from_secs(10)).is_err());
    }

    #[test]
    fn metrics_split_error_kinds() {
        let cb = breaker();
        let t0 = Instant::now();
        cb.try_acquire_at(t0).unwrap();
        cb.record_failure_at(FailureKind::MethodNotAllowed, t0);
        cb.try_acquire_at(t0).unwrap();
        cb.record_failure_at(FailureKind::Other, t0);

        let m = cb.metrics_at(t0);
        assert_eq!(m.method_not_allowed_errors, 1);
        assert_eq!(m.other_errors, 1);
        assert_eq!(m.total_failures, 2);
        assert_eq!(m.total_calls, 2);
    }

    #[test]
    fn metrics_report_remaining_cooldown() {
        let cb = breaker();
        let t0 = Instant::now();
        fail_n(&cb, 3, t0);
        let m = cb.metrics_at(t0 + Duration::from_secs(100));
        assert_eq!(m.state, CircuitState::Open);
        assert_eq!(m.retry_in_secs, Some(200));
    }
}
