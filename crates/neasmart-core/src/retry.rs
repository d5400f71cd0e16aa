// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Bounded retry with exponential backoff.
//!
//! Retrying is an explicit loop with an attempt counter and a computed delay.
//! The loop never raises: it returns a [`RetryOutcome`] that is either the
//! successful value or the last error together with the number of attempts,
//! so the caller decides what exhaustion means (the register store switches
//! to its in-memory fallback).
//!
//! # Example
//!
//! ```rust,ignore
//! use neasmart_core::retry::{ExponentialBackoff, RetryConfig, RetryOutcome};
//!
//! let backoff = ExponentialBackoff::new(RetryConfig::default());
//! let outcome = backoff
//!     .execute("store.get", || async { backend.get(42).await }, |e| e.is_retryable())
//!     .await;
//!
//! match outcome {
//!     RetryOutcome::Success { value, .. } => value,
//!     RetryOutcome::Exhausted { last_error, attempts } => fallback(last_error, attempts),
//! }
//! ```

use std::fmt;
use std::future::Future;
use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};

// =============================================================================
// Retry Configuration
// =============================================================================

/// Configuration for retry strategies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Total number of attempts including the first one (at least 1).
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Delay before the first retry.
    #[serde(default = "default_initial_delay")]
    #[serde(with = "duration_millis")]
    pub initial_delay: Duration,

    /// Upper bound for any single delay.
    #[serde(default = "default_max_delay")]
    #[serde(with = "duration_millis")]
    pub max_delay: Duration,

    /// Growth factor between consecutive delays.
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,

    /// Jitter factor (0.0 to 1.0) to randomize delays.
    #[serde(default)]
    pub jitter: f64,
}

fn default_max_attempts() -> u32 {
    3
}

fn default_initial_delay() -> Duration {
    Duration::from_millis(100)
}

fn default_max_delay() -> Duration {
    Duration::from_secs(2)
}

fn default_multiplier() -> f64 {
    2.0
}

mod duration_millis {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        (duration.as_millis() as u64).serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay: default_initial_delay(),
            max_delay: default_max_delay(),
            multiplier: default_multiplier(),
            jitter: 0.0,
        }
    }
}

impl RetryConfig {
    /// Creates a configuration with the given attempt budget.
    pub fn with_max_attempts(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            ..Default::default()
        }
    }

    /// A configuration with no delay, for tests.
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            initial_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            multiplier: 1.0,
            jitter: 0.0,
        }
    }

    /// Sets the initial delay.
    pub fn initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Sets the maximum delay.
    pub fn max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Sets the multiplier.
    pub fn multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = multiplier;
        self
    }

    /// Sets the jitter factor.
    pub fn with_jitter(mut self, jitter: f64) -> Self {
        self.jitter = jitter.clamp(0.0, 1.0);
        self
    }
}

// =============================================================================
// Retry Decision / Outcome
// =============================================================================

/// What to do after a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Sleep for the duration, then try again.
    Retry(Duration),
    /// Stop retrying.
    DoNotRetry,
}

/// Result of a retried operation.
#[derive(Debug)]
pub enum RetryOutcome<T, E> {
    /// The operation succeeded.
    Success {
        /// The produced value.
        value: T,
        /// Attempts used, including the successful one.
        attempts: u32,
    },
    /// Every attempt failed, or the error was not retryable.
    Exhausted {
        /// The error of the final attempt.
        last_error: E,
        /// Attempts used.
        attempts: u32,
    },
}

impl<T, E> RetryOutcome<T, E> {
    /// Returns `true` on success.
    pub fn is_success(&self) -> bool {
        matches!(self, RetryOutcome::Success { .. })
    }

    /// Number of attempts made.
    pub fn attempts(&self) -> u32 {
        match self {
            RetryOutcome::Success { attempts, .. } | RetryOutcome::Exhausted { attempts, .. } => {
                *attempts
            }
        }
    }

    /// Converts into a plain `Result`.
    pub fn into_result(self) -> Result<T, E> {
        match self {
            RetryOutcome::Success { value, .. } => Ok(value),
            RetryOutcome::Exhausted { last_error, .. } => Err(last_error),
        }
    }
}

// =============================================================================
// RetryStrategy Trait
// =============================================================================

/// A retry policy: decides, per failed attempt, whether and when to retry.
pub trait RetryStrategy: Send + Sync + fmt::Debug {
    /// Decision after `attempt` (1-based) has failed.
    fn decide(&self, attempt: u32) -> RetryDecision;

    /// Strategy name for logging.
    fn name(&self) -> &'static str;

    /// Runs `operation` until it succeeds, the budget is spent, or
    /// `is_retryable` rejects an error.
    fn execute<F, Fut, T, E>(
        &self,
        label: &str,
        mut operation: F,
        is_retryable: impl Fn(&E) -> bool + Send,
    ) -> impl Future<Output = RetryOutcome<T, E>> + Send
    where
        Self: Sized,
        F: FnMut() -> Fut + Send,
        Fut: Future<Output = Result<T, E>> + Send,
        T: Send,
        E: fmt::Display + Send,
    {
        async move {
            let mut attempt = 1;
            loop {
                match operation().await {
                    Ok(value) => {
                        return RetryOutcome::Success {
                            value,
                            attempts: attempt,
                        };
                    }
                    Err(error) => {
                        let decision = if is_retryable(&error) {
                            self.decide(attempt)
                        } else {
                            RetryDecision::DoNotRetry
                        };

                        match decision {
                            RetryDecision::Retry(delay) => {
                                tracing::debug!(
                                    strategy = self.name(),
                                    operation = label,
                                    attempt,
                                    delay_ms = delay.as_millis() as u64,
                                    error = %error,
                                    "Retrying operation"
                                );
                                if !delay.is_zero() {
                                    tokio::time::sleep(delay).await;
                                }
                                attempt += 1;
                            }
                            RetryDecision::DoNotRetry => {
                                return RetryOutcome::Exhausted {
                                    last_error: error,
                                    attempts: attempt,
                                };
                            }
                        }
                    }
                }
            }
        }
    }
}

// =============================================================================
// Strategies
// =============================================================================

/// Never retries.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoRetry;

impl RetryStrategy for NoRetry {
    fn decide(&self, _attempt: u32) -> RetryDecision {
        RetryDecision::DoNotRetry
    }

    fn name(&self) -> &'static str {
        "no_retry"
    }
}

/// Delay doubling (by `multiplier`) per attempt, capped at `max_delay`.
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    config: RetryConfig,
}

impl ExponentialBackoff {
    /// Creates a new exponential backoff strategy.
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    /// Returns the configuration.
    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// Delay before the retry that follows failed attempt `attempt`.
    pub fn calculate_delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(30) as i32;
        let base_ms =
            self.config.initial_delay.as_millis() as f64 * self.config.multiplier.powi(exponent);
        let capped_ms = base_ms.min(self.config.max_delay.as_millis() as f64);
        Duration::from_millis(capped_ms.max(0.0) as u64)
    }
}

impl Default for ExponentialBackoff {
    fn default() -> Self {
        Self::new(RetryConfig::default())
    }
}

impl RetryStrategy for ExponentialBackoff {
    fn decide(&self, attempt: u32) -> RetryDecision {
        if attempt >= self.config.max_attempts.max(1) {
            return RetryDecision::DoNotRetry;
        }
        let delay = apply_jitter(self.calculate_delay(attempt), self.config.jitter);
        RetryDecision::Retry(delay)
    }

    fn name(&self) -> &'static str {
        "exponential_backoff"
    }
}

/// Spreads `delay` by up to `±jitter` of its length.
fn apply_jitter(delay: Duration, jitter: f64) -> Duration {
    if jitter <= 0.0 || delay.is_zero() {
        return delay;
    }
    let spread = delay.as_millis() as f64 * jitter.min(1.0);
    let offset = rand::thread_rng().gen_range(-spread..=spread);
    Duration::from_millis((delay.as_millis() as f64 + offset).max(0.0) as u64)
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_exponential_delays() {
        let backoff = ExponentialBackoff::new(RetryConfig {
            max_attempts: 5,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(300),
            multiplier: 2.0,
            jitter: 0.0,
        });

        assert_eq!(backoff.calculate_delay(1), Duration::from_millis(100));
        assert_eq!(backoff.calculate_delay(2), Duration::from_millis(200));
        assert_eq!(backoff.calculate_delay(3), Duration::from_millis(300));
        assert_eq!(backoff.calculate_delay(10), Duration::from_millis(300));
    }

    #[test]
    fn test_decide_respects_budget() {
        let backoff = ExponentialBackoff::new(RetryConfig::with_max_attempts(3));
        assert!(matches!(backoff.decide(1), RetryDecision::Retry(_)));
        assert!(matches!(backoff.decide(2), RetryDecision::Retry(_)));
        assert_eq!(backoff.decide(3), RetryDecision::DoNotRetry);
    }

    #[test]
    fn test_jitter_stays_within_bounds() {
        for _ in 0..100 {
            let delay = apply_jitter(Duration::from_millis(100), 0.5);
            assert!(delay >= Duration::from_millis(50));
            assert!(delay <= Duration::from_millis(150));
        }
    }

    #[test]
    fn test_config_serde_millis() {
        let config: RetryConfig =
            serde_json::from_str(r#"{"max_attempts": 4, "initial_delay": 50}"#).unwrap();
        assert_eq!(config.max_attempts, 4);
        assert_eq!(config.initial_delay, Duration::from_millis(50));
        assert_eq!(config.max_delay, Duration::from_secs(2));
    }

    #[tokio::test]
    async fn test_execute_succeeds_on_third_attempt() {
        let backoff = ExponentialBackoff::new(RetryConfig::immediate(3));
        let calls = Arc::new(AtomicU32::new(0));

        let counter = calls.clone();
        let outcome = backoff
            .execute(
                "flaky",
                move || {
                    let counter = counter.clone();
                    async move {
                        let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
                        if n < 3 { Err("busy".to_string()) } else { Ok(n) }
                    }
                },
                |_| true,
            )
            .await;

        assert!(outcome.is_success());
        assert_eq!(outcome.attempts(), 3);
        assert_eq!(outcome.into_result().unwrap(), 3);
    }

    #[tokio::test]
    async fn test_execute_exhausts_budget() {
        let backoff = ExponentialBackoff::new(RetryConfig::immediate(2));
        let outcome: RetryOutcome<(), String> = backoff
            .execute("down", || async { Err("down".to_string()) }, |_| true)
            .await;

        match outcome {
            RetryOutcome::Exhausted {
                last_error,
                attempts,
            } => {
                assert_eq!(last_error, "down");
                assert_eq!(attempts, 2);
            }
            RetryOutcome::Success { .. } => panic!("expected exhaustion"),
        }
    }

    #[tokio::test]
    async fn test_execute_stops_on_non_retryable() {
        let backoff = ExponentialBackoff::new(RetryConfig::immediate(5));
        let outcome: RetryOutcome<(), &str> = backoff
            .execute("fatal", || async { Err("fatal") }, |_| false)
            .await;
        assert_eq!(outcome.attempts(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_execute_sleeps_between_attempts() {
        let backoff = ExponentialBackoff::new(
            RetryConfig::with_max_attempts(3).initial_delay(Duration::from_millis(100)),
        );
        let start = tokio::time::Instant::now();
        let outcome: RetryOutcome<(), &str> =
            backoff.execute("slow", || async { Err("no") }, |_| true).await;

        assert!(!outcome.is_success());
        // 100ms + 200ms of backoff.
        assert!(start.elapsed() >= Duration::from_millis(300));
    }

    #[tokio::test]
    async fn test_no_retry() {
        let outcome: RetryOutcome<(), &str> =
            NoRetry.execute("once", || async { Err("x") }, |_| true).await;
        assert_eq!(outcome.attempts(), 1);
    }
}
