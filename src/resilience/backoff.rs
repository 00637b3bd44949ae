//! Adaptive backoff for retrying scraper and API calls
//!
//! Delay for a retry is exponential in the attempt number, capped, then
//! scaled by how badly the current error type has been behaving, by the
//! current system load, and by random jitter:
//!
//! ```text
//! delay = min(base * 2^attempt, max)
//!       * (1 + failures_of_type / max(1, successes_of_type))
//!       * (1 + system_load)
//!       * uniform(jitter_min, jitter_max)
//! ```

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::time::Duration;

use parking_lot::Mutex;
use rand::Rng;
use serde::Serialize;
use tracing::debug;

/// Backoff tuning.
#[derive(Debug, Clone, PartialEq)]
pub struct BackoffConfig {
    /// Delay before the first retry, doubled per attempt
    pub base_delay: Duration,
    /// Cap on the exponential part, applied before the multipliers
    pub max_delay: Duration,
    /// Lower bound of the random jitter factor
    pub jitter_min: f64,
    /// Upper bound of the random jitter factor
    pub jitter_max: f64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            jitter_min: 0.8,
            jitter_max: 1.2,
        }
    }
}

impl BackoffConfig {
    /// Sets the delay before the first retry.
    pub fn with_base_delay(mut self, delay: Duration) -> Self {
        self.base_delay = delay;
        self
    }

    /// Sets the cap on the exponential delay.
    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Jitter bounds; pass `(1.0, 1.0)` to disable jitter.
    pub fn with_jitter(mut self, min: f64, max: f64) -> Self {
        self.jitter_min = min;
        self.jitter_max = max;
        self
    }
}

/// Per-error-type outcome counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct OutcomeCounts {
    /// Failed attempts classified under this error type
    pub failures: u64,
    /// Successes credited to this error type
    pub successes: u64,
}

// == Adaptive Backoff ==
#[derive(Debug, Default)]
pub struct AdaptiveBackoff {
    config: BackoffConfig,
    outcomes: Mutex<HashMap<String, OutcomeCounts>>,
    system_load: Mutex<f64>,
}

impl AdaptiveBackoff {
    pub fn new(config: BackoffConfig) -> Self {
        Self {
            config,
            outcomes: Mutex::new(HashMap::new()),
            system_load: Mutex::new(0.0),
        }
    }

    pub fn config(&self) -> &BackoffConfig {
        &self.config
    }

    pub fn record_failure(&self, error_type: &str) {
        self.outcomes
            .lock()
            .entry(error_type.to_string())
            .or_default()
            .failures += 1;
    }

    pub fn record_success(&self, error_type: &str) {
        self.outcomes
            .lock()
            .entry(error_type.to_string())
            .or_default()
            .successes += 1;
    }

    pub fn outcomes(&self, error_type: &str) -> OutcomeCounts {
        self.outcomes
            .lock()
            .get(error_type)
            .copied()
            .unwrap_or_default()
    }

    /// Outcome counters of every error type seen so far, sorted by name.
    pub fn all_outcomes(&self) -> Vec<(String, OutcomeCounts)> {
        let mut outcomes: Vec<(String, OutcomeCounts)> = self
            .outcomes
            .lock()
            .iter()
            .map(|(error_type, counts)| (error_type.clone(), *counts))
            .collect();
        outcomes.sort_by(|a, b| a.0.cmp(&b.0));
        outcomes
    }

    /// Feeds the current load as a fraction in `[0, 1]`; out-of-range values are clamped.
    pub fn set_system_load(&self, fraction: f64) {
        let fraction = if fraction.is_finite() {
            fraction.clamp(0.0, 1.0)
        } else {
            0.0
        };
        *self.system_load.lock() = fraction;
    }

    pub fn system_load(&self) -> f64 {
        *self.system_load.lock()
    }

    /// `1 + failures / max(1, successes)` for `error_type`.
    pub fn error_multiplier(&self, error_type: &str) -> f64 {
        let counts = self.outcomes(error_type);
        1.0 + counts.failures as f64 / counts.successes.max(1) as f64
    }

    /// `base * 2^attempt`, capped at `max_delay`.
    pub fn base_delay(&self, attempt: u32) -> Duration {
        let base = self.config.base_delay.as_secs_f64();
        let max = self.config.max_delay.as_secs_f64();
        let exponential = base * 2f64.powi(attempt.min(62) as i32);
        Duration::from_secs_f64(exponential.min(max))
    }

    // == Compute Delay ==
    pub fn compute_delay(&self, attempt: u32, error_type: &str) -> Duration {
        let (low, high) = (self.config.jitter_min, self.config.jitter_max);
        let jitter = if high > low {
            rand::thread_rng().gen_range(low..=high)
        } else {
            low
        };
        self.compute_delay_with_jitter(attempt, error_type, jitter)
    }

    /// [`compute_delay`](Self::compute_delay) with a caller-chosen jitter factor.
    pub fn compute_delay_with_jitter(&self, attempt: u32, error_type: &str, jitter: f64) -> Duration {
        let seconds = self.base_delay(attempt).as_secs_f64()
            * self.error_multiplier(error_type)
            * (1.0 + self.system_load())
            * jitter.max(0.0);
        Duration::try_from_secs_f64(seconds).unwrap_or(Duration::MAX)
    }

    // == Retry ==
    /// Runs `operation` up to `max_attempts` times, sleeping between tries.
    ///
    /// `classify` names the error type of each failure. When a call finally
    /// succeeds, every error type seen along the way is credited a success.
    /// The last error is returned once attempts run out.
    pub async fn retry<F, Fut, T, E, C>(
        &self,
        max_attempts: u32,
        classify: C,
        mut operation: F,
    ) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        C: Fn(&E) -> String,
    {
        let max_attempts = max_attempts.max(1);
        let mut seen: HashSet<String> = HashSet::new();
        let mut attempt = 0;

        loop {
            match operation().await {
                Ok(value) => {
                    for error_type in &seen {
                        self.record_success(error_type);
                    }
                    return Ok(value);
                }
                Err(err) => {
                    let error_type = classify(&err);
                    self.record_failure(&error_type);
                    attempt += 1;

                    if attempt >= max_attempts {
                        return Err(err);
                    }

                    let delay = self.compute_delay(attempt - 1, &error_type);
                    debug!(
                        attempt,
                        error_type = %error_type,
                        delay_ms = delay.as_millis() as u64,
                        "Retrying after backoff"
                    );
                    seen.insert(error_type);
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn backoff() -> AdaptiveBackoff {
        AdaptiveBackoff::new(
            BackoffConfig::default()
                .with_base_delay(Duration::from_secs(1))
                .with_max_delay(Duration::from_secs(30)),
        )
    }

    #[test]
    fn test_base_delay_doubles_and_caps() {
        let b = backoff();
        assert_eq!(b.base_delay(0), Duration::from_secs(1));
        assert_eq!(b.base_delay(1), Duration::from_secs(2));
        assert_eq!(b.base_delay(3), Duration::from_secs(8));
        assert_eq!(b.base_delay(5), Duration::from_secs(30));
        assert_eq!(b.base_delay(u32::MAX), Duration::from_secs(30));
    }

    #[test]
    fn test_error_multiplier() {
        let b = backoff();
        assert_eq!(b.error_multiplier("timeout"), 1.0);

        b.record_failure("timeout");
        b.record_failure("timeout");
        assert_eq!(b.error_multiplier("timeout"), 3.0);

        b.record_success("timeout");
        b.record_success("timeout");
        b.record_success("timeout");
        b.record_success("timeout");
        assert_eq!(b.error_multiplier("timeout"), 1.5);

        assert_eq!(b.error_multiplier("captcha"), 1.0);
    }

    #[test]
    fn test_compute_delay_composition() {
        let b = backoff();
        b.record_failure("http_429");
        b.set_system_load(0.5);

        // 4s base * 2.0 error * 1.5 load * 1.1 jitter
        let delay = b.compute_delay_with_jitter(2, "http_429", 1.1);
        assert!((delay.as_secs_f64() - 13.2).abs() < 1e-9);
    }

    #[test]
    fn test_jitter_stays_in_bounds() {
        let b = backoff();
        for _ in 0..200 {
            let delay = b.compute_delay(1, "none").as_secs_f64();
            assert!((1.6..=2.4).contains(&delay), "delay {delay} out of bounds");
        }
    }

    #[test]
    fn test_all_outcomes_sorted_by_error_type() {
        let b = backoff();
        b.record_failure("timeout");
        b.record_failure("captcha");
        b.record_success("timeout");

        let outcomes = b.all_outcomes();
        assert_eq!(outcomes.len(), 2);
        assert_eq!(outcomes[0].0, "captcha");
        assert_eq!(outcomes[1].0, "timeout");
        assert_eq!(
            outcomes[1].1,
            OutcomeCounts {
                failures: 1,
                successes: 1,
            }
        );
    }

    #[test]
    fn test_system_load_clamped() {
        let b = backoff();
        b.set_system_load(3.0);
        assert_eq!(b.system_load(), 1.0);
        b.set_system_load(-1.0);
        assert_eq!(b.system_load(), 0.0);
        b.set_system_load(f64::NAN);
        assert_eq!(b.system_load(), 0.0);
    }

    #[tokio::test]
    async fn test_retry_succeeds_after_failures() {
        let b = AdaptiveBackoff::new(
            BackoffConfig::default()
                .with_base_delay(Duration::from_millis(1))
                .with_max_delay(Duration::from_millis(5)),
        );
        let attempts = AtomicU32::new(0);

        let result = b
            .retry(
                5,
                |err: &String| err.clone(),
                || async {
                    let n = attempts.fetch_add(1, Ordering::SeqCst);
                    if n < 2 {
                        Err("timeout".to_string())
                    } else {
                        Ok(n)
                    }
                },
            )
            .await;

        assert_eq!(result.unwrap(), 2);
        assert_eq!(
            b.outcomes("timeout"),
            OutcomeCounts {
                failures: 2,
                successes: 1,
            }
        );
    }

    #[tokio::test]
    async fn test_retry_gives_up_with_last_error() {
        let b = AdaptiveBackoff::new(
            BackoffConfig::default()
                .with_base_delay(Duration::from_millis(1))
                .with_max_delay(Duration::from_millis(2)),
        );
        let attempts = AtomicU32::new(0);

        let result: Result<(), String> = b
            .retry(
                3,
                |_: &String| "blocked".to_string(),
                || async {
                    let n = attempts.fetch_add(1, Ordering::SeqCst);
                    Err(format!("attempt {n}"))
                },
            )
            .await;

        assert_eq!(result.unwrap_err(), "attempt 2");
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
        assert_eq!(b.outcomes("blocked").failures, 3);
        assert_eq!(b.outcomes("blocked").successes, 0);
    }
}
