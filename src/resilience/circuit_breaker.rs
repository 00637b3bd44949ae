//! Circuit breaker for calls to unreliable upstreams
//!
//! Scrapers and LLM APIs go through a breaker so a failing dependency is
//! given time to recover instead of being hammered.
//!
//! # States
//! ```text
//! Closed   -> Open      consecutive failures >= failure_threshold
//! Open     -> HalfOpen  recovery_timeout elapsed since opening
//! HalfOpen -> Closed    a probe succeeded and half_open_timeout passed with no failure
//! HalfOpen -> Open      any failure
//! ```
//!
//! Transitions are evaluated lazily whenever the breaker is consulted; there
//! is no background timer. A failure that arrives more than `reset_timeout`
//! after the previous one restarts the consecutive count at 1.

use std::fmt;
use std::future::Future;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::CircuitError;

/// State of the circuit breaker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    /// Requests flow through normally
    Closed,
    /// Requests fail immediately
    Open,
    /// Requests are let through to probe for recovery
    HalfOpen,
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CircuitState::Closed => write!(f, "closed"),
            CircuitState::Open => write!(f, "open"),
            CircuitState::HalfOpen => write!(f, "half_open"),
        }
    }
}

/// Configuration for circuit breaker behavior
#[derive(Debug, Clone, PartialEq)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures before opening the circuit
    pub failure_threshold: u32,
    /// Time spent open before probing
    pub recovery_timeout: Duration,
    /// Failure-free time after a successful probe before closing
    pub half_open_timeout: Duration,
    /// Gap between failures after which the count starts over
    pub reset_timeout: Duration,
    /// Successful calls slower than this are booked as failures
    pub slow_call_threshold: Option<Duration>,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            recovery_timeout: Duration::from_secs(60),
            half_open_timeout: Duration::from_secs(30),
            reset_timeout: Duration::from_secs(600),
            slow_call_threshold: None,
        }
    }
}

impl CircuitBreakerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Consecutive failures that open the circuit.
    pub fn with_failure_threshold(mut self, threshold: u32) -> Self {
        self.failure_threshold = threshold;
        self
    }

    /// How long the circuit stays open before letting a probe through.
    pub fn with_recovery_timeout(mut self, timeout: Duration) -> Self {
        self.recovery_timeout = timeout;
        self
    }

    /// How long a half-open circuit must stay failure-free before closing.
    pub fn with_half_open_timeout(mut self, timeout: Duration) -> Self {
        self.half_open_timeout = timeout;
        self
    }

    /// Quiet period after which the consecutive-failure count starts over.
    pub fn with_reset_timeout(mut self, timeout: Duration) -> Self {
        self.reset_timeout = timeout;
        self
    }

    /// Books successful calls slower than `threshold` as failures.
    pub fn with_slow_call_threshold(mut self, threshold: Duration) -> Self {
        self.slow_call_threshold = Some(threshold);
        self
    }
}

/// Point-in-time view of a breaker, for monitoring.
#[derive(Debug, Clone, Serialize)]
pub struct CircuitBreakerMetrics {
    pub name: String,
    pub state: CircuitState,
    /// Failures since the last success, decay or reset
    pub consecutive_failures: u32,
    /// Calls admitted to the operation
    pub total_requests: u64,
    pub total_successes: u64,
    /// Includes slow successes booked as failures
    pub total_failures: u64,
    /// Calls refused while the circuit was open
    pub rejected_requests: u64,
    /// Time since the last state transition
    pub seconds_in_state: f64,
    /// `None` until the first failure
    pub seconds_since_last_failure: Option<f64>,
}

#[derive(Debug)]
struct BreakerState {
    state: CircuitState,
    consecutive_failures: u32,
    last_state_change: Instant,
    last_failure_time: Option<Instant>,
    probe_succeeded: bool,
    total_requests: u64,
    total_successes: u64,
    total_failures: u64,
    rejected_requests: u64,
}

impl BreakerState {
    fn new() -> Self {
        Self {
            state: CircuitState::Closed,
            consecutive_failures: 0,
            last_state_change: Instant::now(),
            last_failure_time: None,
            probe_succeeded: false,
            total_requests: 0,
            total_successes: 0,
            total_failures: 0,
            rejected_requests: 0,
        }
    }
}

/// Circuit breaker guarding one named resource.
///
/// # Usage
///
/// ```ignore
/// let breaker = CircuitBreaker::new("maps-api", CircuitBreakerConfig::default());
/// let places = breaker.execute(|| client.nearby(lat, lon)).await?;
/// ```
#[derive(Debug)]
pub struct CircuitBreaker {
    name: String,
    config: CircuitBreakerConfig,
    state: Mutex<BreakerState>,
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        Self {
            name: name.into(),
            config,
            state: Mutex::new(BreakerState::new()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    /// Current state, after applying any transition that is due.
    pub fn state(&self) -> CircuitState {
        let mut state = self.state.lock();
        self.evaluate_transitions(&mut state, Instant::now());
        state.state
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.state.lock().consecutive_failures
    }

    pub fn metrics(&self) -> CircuitBreakerMetrics {
        let now = Instant::now();
        let mut state = self.state.lock();
        self.evaluate_transitions(&mut state, now);

        CircuitBreakerMetrics {
            name: self.name.clone(),
            state: state.state,
            consecutive_failures: state.consecutive_failures,
            total_requests: state.total_requests,
            total_successes: state.total_successes,
            total_failures: state.total_failures,
            rejected_requests: state.rejected_requests,
            seconds_in_state: now.duration_since(state.last_state_change).as_secs_f64(),
            seconds_since_last_failure: state
                .last_failure_time
                .map(|at| now.duration_since(at).as_secs_f64()),
        }
    }

    /// Back to Closed with all counters zeroed.
    pub fn reset(&self) {
        let mut state = self.state.lock();
        if state.state != CircuitState::Closed {
            info!(circuit = %self.name, from = %state.state, "Circuit breaker reset");
        }
        *state = BreakerState::new();
    }

    // == Execute ==
    /// Runs `operation` unless the circuit is open.
    ///
    /// The operation runs outside the breaker's lock. Its error is returned
    /// unchanged inside [`CircuitError::Operation`].
    pub async fn execute<F, Fut, T, E>(&self, operation: F) -> Result<T, CircuitError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.admit::<E>()?;

        let started = Instant::now();
        match operation().await {
            Ok(value) => {
                self.record_success(started.elapsed());
                Ok(value)
            }
            Err(err) => {
                self.record_failure();
                Err(CircuitError::Operation(err))
            }
        }
    }

    /// Same as [`execute`](Self::execute) for an operation that returns immediately.
    pub fn execute_sync<F, T, E>(&self, operation: F) -> Result<T, CircuitError<E>>
    where
        F: FnOnce() -> Result<T, E>,
    {
        self.admit::<E>()?;

        let started = Instant::now();
        match operation() {
            Ok(value) => {
                self.record_success(started.elapsed());
                Ok(value)
            }
            Err(err) => {
                self.record_failure();
                Err(CircuitError::Operation(err))
            }
        }
    }

    /// Counts the request and rejects it if the circuit is open.
    fn admit<E>(&self) -> Result<(), CircuitError<E>> {
        let now = Instant::now();
        let mut state = self.state.lock();
        self.evaluate_transitions(&mut state, now);
        state.total_requests += 1;

        if state.state == CircuitState::Open {
            state.rejected_requests += 1;
            let open_for = now.duration_since(state.last_state_change);
            debug!(circuit = %self.name, "Rejected call while circuit is open");
            return Err(CircuitError::Open {
                name: self.name.clone(),
                retry_after: self.config.recovery_timeout.saturating_sub(open_for),
            });
        }
        Ok(())
    }

    fn record_success(&self, took: Duration) {
        if let Some(threshold) = self.config.slow_call_threshold {
            if took > threshold {
                warn!(
                    circuit = %self.name,
                    took_ms = took.as_millis() as u64,
                    "Slow call counted as failure"
                );
                self.record_failure();
                return;
            }
        }

        let mut state = self.state.lock();
        state.consecutive_failures = 0;
        state.total_successes += 1;
        if state.state == CircuitState::HalfOpen {
            state.probe_succeeded = true;
            debug!(circuit = %self.name, "Half-open probe succeeded");
        }
    }

    fn record_failure(&self) {
        let now = Instant::now();
        let mut state = self.state.lock();

        let stale = state
            .last_failure_time
            .is_some_and(|last| now.duration_since(last) > self.config.reset_timeout);
        state.consecutive_failures = if stale {
            1
        } else {
            state.consecutive_failures.saturating_add(1)
        };
        state.last_failure_time = Some(now);
        state.total_failures += 1;

        let current = state.state;
        match current {
            CircuitState::HalfOpen => {
                warn!(circuit = %self.name, "Failure while half-open, reopening circuit");
                self.transition(&mut state, CircuitState::Open, now);
            }
            CircuitState::Closed
                if state.consecutive_failures >= self.config.failure_threshold =>
            {
                warn!(
                    circuit = %self.name,
                    failures = state.consecutive_failures,
                    "Failure threshold reached, opening circuit"
                );
                self.transition(&mut state, CircuitState::Open, now);
            }
            _ => {
                debug!(
                    circuit = %self.name,
                    failures = state.consecutive_failures,
                    threshold = self.config.failure_threshold,
                    "Recorded failure"
                );
            }
        }
    }

    fn evaluate_transitions(&self, state: &mut BreakerState, now: Instant) {
        let in_state = now.duration_since(state.last_state_change);
        match state.state {
            CircuitState::Closed
                if state.consecutive_failures >= self.config.failure_threshold =>
            {
                self.transition(state, CircuitState::Open, now);
            }
            CircuitState::Open if in_state >= self.config.recovery_timeout => {
                self.transition(state, CircuitState::HalfOpen, now);
            }
            CircuitState::HalfOpen
                if state.probe_succeeded && in_state >= self.config.half_open_timeout =>
            {
                self.transition(state, CircuitState::Closed, now);
            }
            _ => {}
        }
    }

    fn transition(&self, state: &mut BreakerState, to: CircuitState, now: Instant) {
        info!(circuit = %self.name, from = %state.state, to = %to, "Circuit state change");
        state.state = to;
        state.last_state_change = now;
        state.probe_succeeded = false;
        if to == CircuitState::Closed {
            state.consecutive_failures = 0;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread::sleep;

    fn breaker(threshold: u32) -> CircuitBreaker {
        CircuitBreaker::new(
            "test",
            CircuitBreakerConfig::new()
                .with_failure_threshold(threshold)
                .with_recovery_timeout(Duration::from_millis(100))
                .with_half_open_timeout(Duration::from_millis(50)),
        )
    }

    fn fail(breaker: &CircuitBreaker) -> Result<(), CircuitError<&'static str>> {
        breaker.execute_sync(|| Err::<(), _>("boom"))
    }

    fn succeed(breaker: &CircuitBreaker) -> Result<u32, CircuitError<&'static str>> {
        breaker.execute_sync(|| Ok(7))
    }

    #[test]
    fn test_config_defaults() {
        let config = CircuitBreakerConfig::default();
        assert_eq!(config.failure_threshold, 5);
        assert_eq!(config.recovery_timeout, Duration::from_secs(60));
        assert_eq!(config.half_open_timeout, Duration::from_secs(30));
        assert_eq!(config.reset_timeout, Duration::from_secs(600));
        assert!(config.slow_call_threshold.is_none());
    }

    #[test]
    fn test_starts_closed() {
        let cb = breaker(3);
        assert_eq!(cb.state(), CircuitState::Closed);
        assert_eq!(succeed(&cb).unwrap(), 7);
    }

    #[test]
    fn test_opens_at_threshold() {
        let cb = breaker(3);

        fail(&cb).unwrap_err();
        fail(&cb).unwrap_err();
        assert_eq!(cb.state(), CircuitState::Closed);

        fail(&cb).unwrap_err();
        assert_eq!(cb.state(), CircuitState::Open);
    }

    #[test]
    fn test_success_resets_consecutive_failures() {
        let cb = breaker(3);

        fail(&cb).unwrap_err();
        fail(&cb).unwrap_err();
        succeed(&cb).unwrap();
        fail(&cb).unwrap_err();

        assert_eq!(cb.consecutive_failures(), 1);
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[test]
    fn test_open_rejects_without_running() {
        let cb = breaker(1);
        fail(&cb).unwrap_err();

        let mut ran = false;
        let result: Result<(), CircuitError<&str>> = cb.execute_sync(|| {
            ran = true;
            Ok(())
        });

        assert!(!ran);
        match result {
            Err(CircuitError::Open { name, retry_after }) => {
                assert_eq!(name, "test");
                assert!(retry_after <= Duration::from_millis(100));
            }
            other => panic!("expected open error, got {other:?}"),
        }
        assert_eq!(cb.metrics().rejected_requests, 1);
    }

    #[test]
    fn test_operation_error_passes_through() {
        let cb = breaker(5);
        let err = fail(&cb).unwrap_err();
        assert_eq!(err.into_operation_error(), Some("boom"));
    }

    #[test]
    fn test_half_open_after_recovery_timeout() {
        let cb = breaker(1);
        fail(&cb).unwrap_err();
        assert_eq!(cb.state(), CircuitState::Open);

        sleep(Duration::from_millis(120));

        assert_eq!(cb.state(), CircuitState::HalfOpen);
    }

    #[test]
    fn test_half_open_failure_reopens() {
        let cb = breaker(1);
        fail(&cb).unwrap_err();
        sleep(Duration::from_millis(120));

        fail(&cb).unwrap_err();

        assert_eq!(cb.state(), CircuitState::Open);
        assert!(succeed(&cb).unwrap_err().is_open());
    }

    #[test]
    fn test_half_open_probe_then_close() {
        let cb = breaker(1);
        fail(&cb).unwrap_err();
        sleep(Duration::from_millis(120));

        succeed(&cb).unwrap();
        assert_eq!(cb.state(), CircuitState::HalfOpen);

        sleep(Duration::from_millis(70));
        assert_eq!(cb.state(), CircuitState::Closed);
        assert_eq!(cb.consecutive_failures(), 0);
    }

    #[test]
    fn test_half_open_without_probe_stays_half_open() {
        let cb = breaker(1);
        fail(&cb).unwrap_err();
        sleep(Duration::from_millis(200));

        assert_eq!(cb.state(), CircuitState::HalfOpen);
    }

    #[test]
    fn test_failure_decay() {
        let cb = CircuitBreaker::new(
            "decay",
            CircuitBreakerConfig::new()
                .with_failure_threshold(5)
                .with_reset_timeout(Duration::from_millis(50)),
        );

        fail(&cb).unwrap_err();
        sleep(Duration::from_millis(80));
        fail(&cb).unwrap_err();

        assert_eq!(cb.consecutive_failures(), 1);
    }

    #[test]
    fn test_slow_success_counts_as_failure() {
        let cb = CircuitBreaker::new(
            "slow",
            CircuitBreakerConfig::new()
                .with_failure_threshold(1)
                .with_slow_call_threshold(Duration::from_millis(10)),
        );

        let value: Result<u32, CircuitError<&str>> = cb.execute_sync(|| {
            sleep(Duration::from_millis(30));
            Ok(1)
        });

        assert_eq!(value.unwrap(), 1);
        assert_eq!(cb.state(), CircuitState::Open);
    }

    #[test]
    fn test_reset() {
        let cb = breaker(1);
        fail(&cb).unwrap_err();
        assert_eq!(cb.state(), CircuitState::Open);

        cb.reset();

        let metrics = cb.metrics();
        assert_eq!(metrics.state, CircuitState::Closed);
        assert_eq!(metrics.total_requests, 0);
        assert_eq!(metrics.total_failures, 0);
        assert!(metrics.seconds_since_last_failure.is_none());
    }

    #[test]
    fn test_metrics_counts() {
        let cb = breaker(10);
        succeed(&cb).unwrap();
        succeed(&cb).unwrap();
        fail(&cb).unwrap_err();

        let metrics = cb.metrics();
        assert_eq!(metrics.total_requests, 3);
        assert_eq!(metrics.total_successes, 2);
        assert_eq!(metrics.total_failures, 1);
        assert_eq!(metrics.consecutive_failures, 1);
    }

    #[tokio::test]
    async fn test_execute_async() {
        let cb = breaker(2);

        let ok: Result<&str, CircuitError<String>> = cb
            .execute(|| async {
                tokio::time::sleep(Duration::from_millis(5)).await;
                Ok("scraped")
            })
            .await;
        assert_eq!(ok.unwrap(), "scraped");

        let err: Result<(), CircuitError<String>> = cb
            .execute(|| async { Err("timeout".to_string()) })
            .await;
        assert_eq!(err.unwrap_err().into_operation_error(), Some("timeout".to_string()));
    }

    #[test]
    fn test_state_display() {
        assert_eq!(CircuitState::Closed.to_string(), "closed");
        assert_eq!(CircuitState::HalfOpen.to_string(), "half_open");
        assert_eq!(
            serde_json::to_string(&CircuitState::HalfOpen).unwrap(),
            "\"half_open\""
        );
    }
}
