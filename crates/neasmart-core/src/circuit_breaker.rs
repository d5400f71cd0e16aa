// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Circuit breaker guarding bus access.
//!
//! The breaker is an explicit three-state machine:
//!
//! - **Closed**: calls pass through; consecutive failures are counted
//! - **Open**: calls are rejected without touching the wrapped operation
//! - **Half-Open**: a single trial call decides between Closed and Open
//!
//! # State Transitions
//!
//! ```text
//!                    trial success
//!      ┌─────────────────────────────────────────────────────┐
//!      │                                                     │
//!      ▼                                                     │
//!   ┌──────┐   failure threshold  ┌──────┐  recovery timeout ┌─────────┐
//!   │Closed│ ────────────────────▶│ Open │ ─────────────────▶│HalfOpen │
//!   └──────┘                      └──────┘   (next attempt)  └─────────┘
//!                                    ▲                            │
//!                                    └────────────────────────────┘
//!                                           trial failure
//! ```
//!
//! All decisions go through [`transition`], a pure function of the current
//! [`BreakerSnapshot`], the [`BreakerEvent`] and the current instant. The
//! [`CircuitBreaker`] only serializes access to the snapshot and logs the
//! resulting state changes.
//!
//! # Example
//!
//! ```rust,ignore
//! use neasmart_core::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig};
//!
//! let cb = CircuitBreaker::new("modbus", CircuitBreakerConfig::default());
//!
//! match cb.call(|| bus.read_holding_registers(slave, 100, 1)).await {
//!     Ok(values) => use_live(values),
//!     Err(e) if e.is_open() => use_cached(),
//!     Err(e) => log_and_use_cached(e),
//! }
//! ```

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::time::Instant;

// =============================================================================
// CircuitState
// =============================================================================

/// Circuit breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    /// Calls pass through.
    #[default]
    Closed,
    /// Calls are short-circuited.
    Open,
    /// One trial call is allowed through.
    HalfOpen,
}

impl CircuitState {
    /// Returns the state name.
    pub fn as_str(&self) -> &'static str {
        match self {
            CircuitState::Closed => "closed",
            CircuitState::Open => "open",
            CircuitState::HalfOpen => "half_open",
        }
    }
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Configuration
// =============================================================================

/// Configuration for the circuit breaker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures that open the circuit.
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,

    /// Time spent open before a trial is allowed.
    #[serde(default = "default_recovery_timeout")]
    #[serde(with = "duration_secs")]
    pub recovery_timeout: Duration,

    /// Bound on each wrapped call; elapsing counts as a failure.
    #[serde(default = "default_call_timeout")]
    #[serde(with = "option_duration_millis")]
    pub call_timeout: Option<Duration>,
}

fn default_failure_threshold() -> u32 {
    5
}

fn default_recovery_timeout() -> Duration {
    Duration::from_secs(60)
}

fn default_call_timeout() -> Option<Duration> {
    Some(Duration::from_secs(3))
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration.as_secs().serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

mod option_duration_millis {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration
            .map(|d| d.as_millis() as u64)
            .serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = Option::<u64>::deserialize(deserializer)?;
        Ok(millis.map(Duration::from_millis))
    }
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: default_failure_threshold(),
            recovery_timeout: default_recovery_timeout(),
            call_timeout: default_call_timeout(),
        }
    }
}

impl CircuitBreakerConfig {
    /// Creates a new configuration builder.
    pub fn builder() -> CircuitBreakerConfigBuilder {
        CircuitBreakerConfigBuilder::default()
    }
}

/// Builder for CircuitBreakerConfig.
#[derive(Debug, Default)]
pub struct CircuitBreakerConfigBuilder {
    config: CircuitBreakerConfig,
}

impl CircuitBreakerConfigBuilder {
    /// Sets the failure threshold (at least 1).
    pub fn failure_threshold(mut self, threshold: u32) -> Self {
        self.config.failure_threshold = threshold.max(1);
        self
    }

    /// Sets the recovery timeout.
    pub fn recovery_timeout(mut self, timeout: Duration) -> Self {
        self.config.recovery_timeout = timeout;
        self
    }

    /// Sets the per-call timeout.
    pub fn call_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.config.call_timeout = timeout;
        self
    }

    /// Builds the configuration.
    pub fn build(self) -> CircuitBreakerConfig {
        self.config
    }
}

// =============================================================================
// Circuit Breaker Error
// =============================================================================

/// Error returned by [`CircuitBreaker::call`].
#[derive(Debug, Error)]
pub enum CircuitError<E> {
    /// The circuit is open (or a half-open trial is already in flight).
    #[error("Circuit breaker is open")]
    Open,

    /// The wrapped call exceeded the configured timeout.
    #[error("Operation timed out after {0:?}")]
    Timeout(Duration),

    /// The wrapped call failed.
    #[error("Inner operation failed: {0}")]
    Inner(#[source] E),
}

impl<E> CircuitError<E> {
    /// Returns `true` if the call was short-circuited.
    pub fn is_open(&self) -> bool {
        matches!(self, CircuitError::Open)
    }

    /// Returns the inner error if present.
    pub fn inner(&self) -> Option<&E> {
        match self {
            CircuitError::Inner(e) => Some(e),
            _ => None,
        }
    }

    /// Consumes self and returns the inner error if present.
    pub fn into_inner(self) -> Option<E> {
        match self {
            CircuitError::Inner(e) => Some(e),
            _ => None,
        }
    }

    /// Maps the inner error type.
    pub fn map_inner<F, E2>(self, f: F) -> CircuitError<E2>
    where
        F: FnOnce(E) -> E2,
    {
        match self {
            CircuitError::Open => CircuitError::Open,
            CircuitError::Timeout(d) => CircuitError::Timeout(d),
            CircuitError::Inner(e) => CircuitError::Inner(f(e)),
        }
    }
}

// =============================================================================
// Pure State Machine
// =============================================================================

/// Everything the transition function needs to know about the breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BreakerSnapshot {
    /// Current state.
    pub state: CircuitState,
    /// Consecutive failures.
    pub consecutive_failures: u32,
    /// When the circuit last opened.
    pub opened_at: Option<Instant>,
    /// Whether the half-open trial is in flight.
    pub trial_in_flight: bool,
}

/// Input to the transition function.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerEvent {
    /// A caller wants to run the wrapped operation.
    Admit,
    /// An admitted call succeeded.
    Success {
        /// Whether the call was the half-open trial.
        trial: bool,
    },
    /// An admitted call failed, timed out, or was cancelled.
    Failure {
        /// Whether the call was the half-open trial.
        trial: bool,
    },
}

/// Verdict on an [`BreakerEvent::Admit`] event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// Run the call normally.
    Allowed,
    /// Run the call as the single half-open trial.
    Trial,
    /// Do not run the call.
    Rejected,
    /// The event was an outcome, not an admission request.
    NotApplicable,
}

/// Result of [`transition`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    /// The next snapshot.
    pub next: BreakerSnapshot,
    /// Admission verdict for `Admit` events.
    pub admission: Admission,
}

/// The breaker's transition function.
///
/// Pure: the result depends only on the arguments.
pub fn transition(
    config: &CircuitBreakerConfig,
    current: BreakerSnapshot,
    event: BreakerEvent,
    now: Instant,
) -> Transition {
    let threshold = config.failure_threshold.max(1);
    let mut next = current;

    let admission = match (current.state, event) {
        (CircuitState::Closed, BreakerEvent::Admit) => Admission::Allowed,
        (CircuitState::Open, BreakerEvent::Admit) => {
            let recovered = current
                .opened_at
                .is_none_or(|opened| now.saturating_duration_since(opened) >= config.recovery_timeout);
            if recovered {
                next.state = CircuitState::HalfOpen;
                next.trial_in_flight = true;
                Admission::Trial
            } else {
                Admission::Rejected
            }
        }
        (CircuitState::HalfOpen, BreakerEvent::Admit) => {
            if current.trial_in_flight {
                Admission::Rejected
            } else {
                next.trial_in_flight = true;
                Admission::Trial
            }
        }

        (CircuitState::Closed, BreakerEvent::Success { .. }) => {
            next.consecutive_failures = 0;
            Admission::NotApplicable
        }
        (CircuitState::Closed, BreakerEvent::Failure { .. }) => {
            next.consecutive_failures = current.consecutive_failures.saturating_add(1);
            if next.consecutive_failures >= threshold {
                next.state = CircuitState::Open;
                next.opened_at = Some(now);
            }
            Admission::NotApplicable
        }

        (CircuitState::HalfOpen, BreakerEvent::Success { trial: true }) => {
            next = BreakerSnapshot::default();
            Admission::NotApplicable
        }
        (CircuitState::HalfOpen, BreakerEvent::Failure { trial: true }) => {
            next.state = CircuitState::Open;
            next.opened_at = Some(now);
            next.trial_in_flight = false;
            next.consecutive_failures = current.consecutive_failures.saturating_add(1);
            Admission::NotApplicable
        }

        // Late outcomes of calls admitted before the circuit opened do not
        // move the state machine.
        (CircuitState::HalfOpen, BreakerEvent::Success { trial: false })
        | (CircuitState::HalfOpen, BreakerEvent::Failure { trial: false })
        | (CircuitState::Open, BreakerEvent::Success { .. })
        | (CircuitState::Open, BreakerEvent::Failure { .. }) => Admission::NotApplicable,
    };

    Transition { next, admission }
}

// =============================================================================
// Metrics
// =============================================================================

/// Point-in-time view of the breaker for health reporting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CircuitBreakerMetrics {
    /// Breaker name.
    pub name: String,
    /// Current state.
    pub state: CircuitState,
    /// Consecutive failures.
    pub consecutive_failures: u32,
    /// Configured failure threshold.
    pub failure_threshold: u32,
    /// Calls admitted.
    pub total_calls: u64,
    /// Calls that failed (including timeouts).
    pub total_failures: u64,
    /// Calls rejected while open.
    pub rejected_calls: u64,
    /// Last failure timestamp.
    pub last_failure_time: Option<DateTime<Utc>>,
}

#[derive(Debug, Default)]
struct Counters {
    total_calls: AtomicU64,
    total_failures: AtomicU64,
    rejected_calls: AtomicU64,
}

// =============================================================================
// CircuitBreaker
// =============================================================================

/// A thread-safe circuit breaker.
///
/// The internal lock is held only while the snapshot is updated, never
/// across the wrapped operation.
pub struct CircuitBreaker {
    name: String,
    config: CircuitBreakerConfig,
    snapshot: Mutex<BreakerSnapshot>,
    last_failure: Mutex<Option<DateTime<Utc>>>,
    counters: Counters,
}

impl CircuitBreaker {
    /// Creates a new circuit breaker.
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        Self {
            name: name.into(),
            config,
            snapshot: Mutex::new(BreakerSnapshot::default()),
            last_failure: Mutex::new(None),
            counters: Counters::default(),
        }
    }

    /// Creates a circuit breaker with default configuration.
    pub fn default_config(name: impl Into<String>) -> Self {
        Self::new(name, CircuitBreakerConfig::default())
    }

    /// Returns the breaker name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the configuration.
    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    /// Runs `f` through the breaker.
    ///
    /// Returns [`CircuitError::Open`] without calling `f` when the circuit is
    /// open or a half-open trial is already running. If the returned future
    /// is dropped before `f` completes, the call counts as a failure.
    pub async fn call<F, Fut, T, E>(&self, f: F) -> Result<T, CircuitError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let trial = match self.apply(BreakerEvent::Admit) {
            Admission::Allowed => false,
            Admission::Trial => true,
            Admission::Rejected | Admission::NotApplicable => {
                self.counters.rejected_calls.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(breaker = %self.name, state = %self.state(), "Circuit breaker rejected request");
                return Err(CircuitError::Open);
            }
        };
        self.counters.total_calls.fetch_add(1, Ordering::Relaxed);

        let mut guard = CallGuard {
            breaker: self,
            trial,
            settled: false,
        };

        let result = match self.config.call_timeout {
            Some(limit) => match tokio::time::timeout(limit, f()).await {
                Ok(inner) => inner.map_err(CircuitError::Inner),
                Err(_) => Err(CircuitError::Timeout(limit)),
            },
            None => f().await.map_err(CircuitError::Inner),
        };

        guard.settle(result.is_ok());
        result
    }

    /// Returns the current state.
    pub fn state(&self) -> CircuitState {
        self.snapshot.lock().state
    }

    /// Returns the consecutive failure count.
    pub fn consecutive_failures(&self) -> u32 {
        self.snapshot.lock().consecutive_failures
    }

    /// Returns a copy of the internal snapshot.
    pub fn snapshot(&self) -> BreakerSnapshot {
        *self.snapshot.lock()
    }

    /// Returns `true` if a call made now would be rejected.
    pub fn is_rejecting(&self) -> bool {
        let snapshot = self.snapshot();
        let verdict = transition(&self.config, snapshot, BreakerEvent::Admit, Instant::now());
        verdict.admission == Admission::Rejected
    }

    /// Forces the circuit closed and clears the failure count.
    pub fn reset(&self) {
        let previous = {
            let mut snapshot = self.snapshot.lock();
            let previous = *snapshot;
            *snapshot = BreakerSnapshot::default();
            previous
        };
        if previous.state != CircuitState::Closed {
            tracing::info!(
                breaker = %self.name,
                from = %previous.state,
                to = %CircuitState::Closed,
                "Circuit breaker manually reset"
            );
        }
    }

    /// Forces the circuit open.
    pub fn trip(&self) {
        let previous = {
            let mut snapshot = self.snapshot.lock();
            let previous = *snapshot;
            snapshot.state = CircuitState::Open;
            snapshot.opened_at = Some(Instant::now());
            snapshot.trial_in_flight = false;
            previous
        };
        if previous.state != CircuitState::Open {
            tracing::warn!(
                breaker = %self.name,
                from = %previous.state,
                to = %CircuitState::Open,
                "Circuit breaker manually tripped"
            );
        }
    }

    /// Returns breaker metrics.
    pub fn metrics(&self) -> CircuitBreakerMetrics {
        let snapshot = self.snapshot();
        CircuitBreakerMetrics {
            name: self.name.clone(),
            state: snapshot.state,
            consecutive_failures: snapshot.consecutive_failures,
            failure_threshold: self.config.failure_threshold,
            total_calls: self.counters.total_calls.load(Ordering::Relaxed),
            total_failures: self.counters.total_failures.load(Ordering::Relaxed),
            rejected_calls: self.counters.rejected_calls.load(Ordering::Relaxed),
            last_failure_time: *self.last_failure.lock(),
        }
    }

    /// Applies `event` under the lock and logs any state change.
    fn apply(&self, event: BreakerEvent) -> Admission {
        let (previous, result) = {
            let mut snapshot = self.snapshot.lock();
            let previous = *snapshot;
            let result = transition(&self.config, previous, event, Instant::now());
            *snapshot = result.next;
            (previous, result)
        };

        if matches!(event, BreakerEvent::Failure { .. }) {
            self.counters.total_failures.fetch_add(1, Ordering::Relaxed);
            *self.last_failure.lock() = Some(Utc::now());
        }

        if previous.state != result.next.state {
            self.log_transition(previous.state, result.next);
        }
        result.admission
    }

    fn log_transition(&self, from: CircuitState, next: BreakerSnapshot) {
        match next.state {
            CircuitState::Open => tracing::warn!(
                breaker = %self.name,
                from = %from,
                to = %next.state,
                failures = next.consecutive_failures,
                recovery_timeout_secs = self.config.recovery_timeout.as_secs(),
                "Circuit breaker opened"
            ),
            CircuitState::HalfOpen => tracing::info!(
                breaker = %self.name,
                from = %from,
                to = %next.state,
                "Circuit breaker entering half-open state"
            ),
            CircuitState::Closed => tracing::info!(
                breaker = %self.name,
                from = %from,
                to = %next.state,
                "Circuit breaker closed"
            ),
        }
    }
}

impl fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("name", &self.name)
            .field("config", &self.config)
            .field("snapshot", &self.snapshot())
            .finish()
    }
}

/// Records the outcome of an admitted call exactly once.
struct CallGuard<'a> {
    breaker: &'a CircuitBreaker,
    trial: bool,
    settled: bool,
}

impl CallGuard<'_> {
    fn settle(&mut self, success: bool) {
        if self.settled {
            return;
        }
        self.settled = true;
        let trial = self.trial;
        let event = if success {
            BreakerEvent::Success { trial }
        } else {
            BreakerEvent::Failure { trial }
        };
        self.breaker.apply(event);
    }
}

impl Drop for CallGuard<'_> {
    fn drop(&mut self) {
        // Cancelled mid-call.
        self.settle(false);
    }
}

/// A circuit breaker shared between tasks.
pub type SharedCircuitBreaker = Arc<CircuitBreaker>;

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;

    fn config(threshold: u32, recovery: Duration) -> CircuitBreakerConfig {
        CircuitBreakerConfig::builder()
            .failure_threshold(threshold)
            .recovery_timeout(recovery)
            .call_timeout(None)
            .build()
    }

    async fn fail(cb: &CircuitBreaker) -> Result<(), CircuitError<&'static str>> {
        cb.call(|| async { Err::<(), _>("boom") }).await
    }

    async fn succeed(cb: &CircuitBreaker) -> Result<u32, CircuitError<&'static str>> {
        cb.call(|| async { Ok::<_, &'static str>(7) }).await
    }

    #[test]
    fn test_transition_closed_counts_failures() {
        let cfg = config(3, Duration::from_secs(10));
        let now = Instant::now();
        let mut snap = BreakerSnapshot::default();

        for expected in 1..3 {
            snap = transition(&cfg, snap, BreakerEvent::Failure { trial: false }, now).next;
            assert_eq!(snap.state, CircuitState::Closed);
            assert_eq!(snap.consecutive_failures, expected);
        }

        snap = transition(&cfg, snap, BreakerEvent::Failure { trial: false }, now).next;
        assert_eq!(snap.state, CircuitState::Open);
        assert_eq!(snap.opened_at, Some(now));
    }

    #[test]
    fn test_transition_success_resets_counter() {
        let cfg = config(3, Duration::from_secs(10));
        let now = Instant::now();
        let snap = BreakerSnapshot {
            consecutive_failures: 2,
            ..Default::default()
        };
        let next = transition(&cfg, snap, BreakerEvent::Success { trial: false }, now).next;
        assert_eq!(next.consecutive_failures, 0);
        assert_eq!(next.state, CircuitState::Closed);
    }

    #[test]
    fn test_transition_open_waits_for_recovery() {
        let cfg = config(1, Duration::from_secs(10));
        let opened = Instant::now();
        let snap = BreakerSnapshot {
            state: CircuitState::Open,
            consecutive_failures: 1,
            opened_at: Some(opened),
            trial_in_flight: false,
        };

        let early = transition(&cfg, snap, BreakerEvent::Admit, opened + Duration::from_secs(9));
        assert_eq!(early.admission, Admission::Rejected);
        assert_eq!(early.next, snap);

        let late = transition(&cfg, snap, BreakerEvent::Admit, opened + Duration::from_secs(10));
        assert_eq!(late.admission, Admission::Trial);
        assert_eq!(late.next.state, CircuitState::HalfOpen);
        assert!(late.next.trial_in_flight);
    }

    #[test]
    fn test_transition_half_open_admits_single_trial() {
        let cfg = config(1, Duration::from_secs(10));
        let snap = BreakerSnapshot {
            state: CircuitState::HalfOpen,
            consecutive_failures: 1,
            opened_at: None,
            trial_in_flight: true,
        };
        let verdict = transition(&cfg, snap, BreakerEvent::Admit, Instant::now());
        assert_eq!(verdict.admission, Admission::Rejected);
    }

    #[test]
    fn test_transition_trial_outcomes() {
        let cfg = config(1, Duration::from_secs(10));
        let now = Instant::now();
        let half_open = BreakerSnapshot {
            state: CircuitState::HalfOpen,
            consecutive_failures: 1,
            opened_at: None,
            trial_in_flight: true,
        };

        let closed = transition(&cfg, half_open, BreakerEvent::Success { trial: true }, now).next;
        assert_eq!(closed, BreakerSnapshot::default());

        let reopened = transition(&cfg, half_open, BreakerEvent::Failure { trial: true }, now).next;
        assert_eq!(reopened.state, CircuitState::Open);
        assert_eq!(reopened.opened_at, Some(now));
        assert!(!reopened.trial_in_flight);
    }

    #[test]
    fn test_transition_ignores_late_outcomes() {
        let cfg = config(1, Duration::from_secs(10));
        let now = Instant::now();
        let half_open = BreakerSnapshot {
            state: CircuitState::HalfOpen,
            consecutive_failures: 1,
            opened_at: None,
            trial_in_flight: true,
        };
        let next = transition(&cfg, half_open, BreakerEvent::Success { trial: false }, now).next;
        assert_eq!(next, half_open);
    }

    #[tokio::test]
    async fn test_initial_state() {
        let cb = CircuitBreaker::default_config("test");
        assert_eq!(cb.state(), CircuitState::Closed);
        assert_eq!(cb.consecutive_failures(), 0);
        assert_eq!(succeed(&cb).await.unwrap(), 7);
    }

    #[tokio::test]
    async fn test_failure_threshold() {
        let cb = CircuitBreaker::new("test", config(3, Duration::from_secs(60)));

        fail(&cb).await.unwrap_err();
        fail(&cb).await.unwrap_err();
        assert_eq!(cb.state(), CircuitState::Closed);

        fail(&cb).await.unwrap_err();
        assert_eq!(cb.state(), CircuitState::Open);
        assert_eq!(cb.consecutive_failures(), 3);
    }

    #[tokio::test]
    async fn test_open_circuit_short_circuits() {
        let cb = CircuitBreaker::new("test", config(1, Duration::from_secs(60)));
        fail(&cb).await.unwrap_err();

        let invoked = AtomicU32::new(0);
        let result = cb
            .call(|| async {
                invoked.fetch_add(1, Ordering::SeqCst);
                Ok::<_, &'static str>(())
            })
            .await;

        assert!(result.unwrap_err().is_open());
        assert_eq!(invoked.load(Ordering::SeqCst), 0);
        assert_eq!(cb.metrics().rejected_calls, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_recovery_after_timeout() {
        let cb = CircuitBreaker::new("test", config(2, Duration::from_secs(30)));
        fail(&cb).await.unwrap_err();
        fail(&cb).await.unwrap_err();
        assert_eq!(cb.state(), CircuitState::Open);

        tokio::time::advance(Duration::from_secs(29)).await;
        assert!(succeed(&cb).await.unwrap_err().is_open());

        tokio::time::advance(Duration::from_secs(1)).await;
        assert_eq!(succeed(&cb).await.unwrap(), 7);
        assert_eq!(cb.state(), CircuitState::Closed);
        assert_eq!(cb.consecutive_failures(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_trial_restarts_timer() {
        let cb = CircuitBreaker::new("test", config(1, Duration::from_secs(30)));
        fail(&cb).await.unwrap_err();

        tokio::time::advance(Duration::from_secs(30)).await;
        assert!(matches!(fail(&cb).await, Err(CircuitError::Inner("boom"))));
        assert_eq!(cb.state(), CircuitState::Open);

        tokio::time::advance(Duration::from_secs(10)).await;
        assert!(succeed(&cb).await.unwrap_err().is_open());
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_trial_is_rejected() {
        let cb = Arc::new(CircuitBreaker::new("test", config(1, Duration::from_secs(5))));
        fail(&cb).await.unwrap_err();
        tokio::time::advance(Duration::from_secs(5)).await;

        let (release_tx, release_rx) = tokio::sync::oneshot::channel::<()>();
        let trial_cb = cb.clone();
        let trial = tokio::spawn(async move {
            trial_cb
                .call(|| async move {
                    let _ = release_rx.await;
                    Ok::<_, &'static str>(1)
                })
                .await
        });

        // Let the trial get admitted.
        tokio::task::yield_now().await;
        while !cb.snapshot().trial_in_flight {
            tokio::task::yield_now().await;
        }
        assert_eq!(cb.state(), CircuitState::HalfOpen);
        assert!(succeed(&cb).await.unwrap_err().is_open());

        release_tx.send(()).unwrap();
        assert_eq!(trial.await.unwrap().unwrap(), 1);
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_counts_as_failure() {
        let cfg = CircuitBreakerConfig::builder()
            .failure_threshold(1)
            .call_timeout(Some(Duration::from_millis(100)))
            .build();
        let cb = CircuitBreaker::new("test", cfg);

        let result = cb
            .call(|| async {
                tokio::time::sleep(Duration::from_secs(1)).await;
                Ok::<_, &'static str>(())
            })
            .await;

        assert!(matches!(result, Err(CircuitError::Timeout(_))));
        assert_eq!(cb.state(), CircuitState::Open);
    }

    #[tokio::test]
    async fn test_reset_and_trip() {
        let cb = CircuitBreaker::new("test", config(1, Duration::from_secs(60)));
        cb.trip();
        assert_eq!(cb.state(), CircuitState::Open);
        assert!(cb.is_rejecting());

        cb.reset();
        assert_eq!(cb.state(), CircuitState::Closed);
        assert_eq!(cb.consecutive_failures(), 0);
        assert!(succeed(&cb).await.is_ok());
    }

    #[tokio::test]
    async fn test_metrics() {
        let cb = CircuitBreaker::new("bus", config(5, Duration::from_secs(60)));
        succeed(&cb).await.unwrap();
        fail(&cb).await.unwrap_err();

        let metrics = cb.metrics();
        assert_eq!(metrics.name, "bus");
        assert_eq!(metrics.total_calls, 2);
        assert_eq!(metrics.total_failures, 1);
        assert_eq!(metrics.consecutive_failures, 1);
        assert!(metrics.last_failure_time.is_some());
    }

    #[test]
    fn test_config_serde() {
        let cfg: CircuitBreakerConfig =
            serde_json::from_str(r#"{"failure_threshold": 3, "recovery_timeout": 15}"#).unwrap();
        assert_eq!(cfg.failure_threshold, 3);
        assert_eq!(cfg.recovery_timeout, Duration::from_secs(15));
        assert_eq!(cfg.call_timeout, Some(Duration::from_secs(3)));
    }
}
