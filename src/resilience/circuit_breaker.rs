//! Circuit breaker for gateway protection.
//!
//! # States
//! - Closed: normal operation, calls pass through
//! - Open: gateway assumed down, calls are short-circuited
//! - Half-Open: a single trial call decides whether the gateway recovered
//!
//! # State Transitions
//! ```text
//! Closed → Open: window volume >= volume_threshold and error % >= threshold
//! Open → Half-Open: reset_timeout elapsed since the circuit opened
//! Half-Open → Closed: trial call succeeds (window is reset)
//! Half-Open → Open: trial call fails (reset timer restarts)
//! ```
//!
//! All timing is evaluated against the tokio monotonic clock at call time.
//! Admission and outcome recording each take the state lock exactly once.

use serde::Serialize;
use std::collections::VecDeque;
use std::fmt;
use std::future::Future;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;

use crate::config::BreakerConfig;
use crate::gateway::types::{GatewayError, GatewayResult};
use crate::observability::metrics;
use crate::resilience::timeouts::with_deadline;
use crate::resilience::window::{Counters, Outcome, RollingWindow};

const LATENCY_SAMPLES: usize = 100;

/// The logical operations the broker performs against the gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Operation {
    ReadCredential,
    CreateCredential,
    Health,
}

impl Operation {
    pub const ALL: [Operation; 3] = [
        Operation::ReadCredential,
        Operation::CreateCredential,
        Operation::Health,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::ReadCredential => "read-credential",
            Operation::CreateCredential => "create-credential",
            Operation::Health => "health",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Circuit status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum CircuitStatus {
    Closed,
    Open,
    HalfOpen,
}

impl CircuitStatus {
    fn gauge_value(self) -> f64 {
        match self {
            CircuitStatus::Closed => 0.0,
            CircuitStatus::HalfOpen => 1.0,
            CircuitStatus::Open => 2.0,
        }
    }
}

/// Why a wrapped call did not produce a value.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BreakerError {
    #[error("circuit open for {0}")]
    Open(Operation),

    #[error("call timed out after {0} ms")]
    Timeout(u64),

    #[error(transparent)]
    Failed(GatewayError),
}

/// Latency distribution over the most recent executed calls, in milliseconds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LatencyPercentiles {
    pub p50: u64,
    pub p90: u64,
    pub p99: u64,
    pub max: u64,
}

/// Point-in-time snapshot of one breaker.
#[derive(Debug, Clone, Serialize)]
pub struct BreakerStats {
    pub status: CircuitStatus,
    pub window: Counters,
    pub totals: Counters,
    pub consecutive_failures: u32,
    pub consecutive_successes: u32,
    pub since_last_transition_ms: u64,
    pub latency: LatencyPercentiles,
}

#[derive(Debug)]
struct BreakerState {
    status: CircuitStatus,
    window: RollingWindow,
    totals: Counters,
    consecutive_failures: u32,
    consecutive_successes: u32,
    last_transition_at: Instant,
    opened_at: Option<Instant>,
    trial_in_flight: bool,
    latencies: VecDeque<u64>,
}

/// Breaker guarding a single operation.
#[derive(Debug)]
pub struct CircuitBreaker {
    operation: Operation,
    config: BreakerConfig,
    state: Mutex<BreakerState>,
}

impl CircuitBreaker {
    pub fn new(operation: Operation, config: BreakerConfig) -> Self {
        let window = RollingWindow::new(config.rolling_window(), config.rolling_count_buckets);
        metrics::record_circuit_state(operation.as_str(), CircuitStatus::Closed.gauge_value());
        Self {
            operation,
            config,
            state: Mutex::new(BreakerState {
                status: CircuitStatus::Closed,
                window,
                totals: Counters::default(),
                consecutive_failures: 0,
                consecutive_successes: 0,
                last_transition_at: Instant::now(),
                opened_at: None,
                trial_in_flight: false,
                latencies: VecDeque::with_capacity(LATENCY_SAMPLES),
            }),
        }
    }

    pub fn operation(&self) -> Operation {
        self.operation
    }

    fn lock(&self) -> MutexGuard<'_, BreakerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Current status, applying the Open → Half-Open transition if due.
    pub fn status(&self) -> CircuitStatus {
        let mut state = self.lock();
        self.refresh(&mut state, Instant::now());
        state.status
    }

    /// Run `action` through the breaker.
    ///
    /// The action races `timeout_ms`; a lost race counts as a timeout. A
    /// `NotFound` error is a legitimate answer and never counts as a failure.
    pub async fn call<T, F, Fut>(&self, action: F) -> Result<T, BreakerError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = GatewayResult<T>>,
    {
        let Some(mut permit) = self.try_acquire() else {
            tracing::debug!(operation = %self.operation, "Circuit open, short-circuiting call");
            return Err(BreakerError::Open(self.operation));
        };

        let started = Instant::now();
        let result = with_deadline(self.config.timeout(), action()).await;
        let latency = started.elapsed();

        match result {
            Ok(value) => {
                permit.complete(Outcome::Success, latency);
                Ok(value)
            }
            Err(GatewayError::NotFound) => {
                permit.complete(Outcome::Success, latency);
                Err(BreakerError::Failed(GatewayError::NotFound))
            }
            Err(GatewayError::Timeout(ms)) => {
                permit.complete(Outcome::Timeout, latency);
                Err(BreakerError::Timeout(ms))
            }
            Err(err) => {
                permit.complete(Outcome::Failure, latency);
                Err(BreakerError::Failed(err))
            }
        }
    }

    /// Count a fallback served on behalf of this operation.
    pub fn record_fallback(&self) {
        let mut state = self.lock();
        state.totals.fallbacks += 1;
        state.window.record_fallback(Instant::now());
    }

    /// Force the breaker back to Closed with an empty window.
    pub fn reset(&self) {
        let mut state = self.lock();
        let now = Instant::now();
        state.window.reset();
        state.consecutive_failures = 0;
        state.consecutive_successes = 0;
        state.trial_in_flight = false;
        state.opened_at = None;
        if state.status != CircuitStatus::Closed {
            self.transition(&mut state, CircuitStatus::Closed, now);
        }
    }

    pub fn stats(&self) -> BreakerStats {
        let mut state = self.lock();
        let now = Instant::now();
        self.refresh(&mut state, now);
        BreakerStats {
            status: state.status,
            window: state.window.totals(now),
            totals: state.totals,
            consecutive_failures: state.consecutive_failures,
            consecutive_successes: state.consecutive_successes,
            since_last_transition_ms: now
                .duration_since(state.last_transition_at)
                .as_millis() as u64,
            latency: percentiles(&state.latencies),
        }
    }

    fn refresh(&self, state: &mut BreakerState, now: Instant) {
        if state.status != CircuitStatus::Open {
            return;
        }
        let due = state
            .opened_at
            .map_or(true, |opened| now.duration_since(opened) >= self.config.reset_timeout());
        if due {
            self.transition(state, CircuitStatus::HalfOpen, now);
        }
    }

    fn try_acquire(&self) -> Option<Permit<'_>> {
        let mut state = self.lock();
        let now = Instant::now();
        self.refresh(&mut state, now);

        let status = state.status;
        match status {
            CircuitStatus::Closed => Some(Permit::new(self, false)),
            CircuitStatus::HalfOpen if !state.trial_in_flight => {
                state.trial_in_flight = true;
                tracing::info!(operation = %self.operation, "Admitting half-open trial call");
                Some(Permit::new(self, true))
            }
            _ => {
                state.totals.record(Outcome::Rejected);
                state.window.record(now, Outcome::Rejected);
                metrics::record_operation(self.operation.as_str(), "rejected", Duration::ZERO);
                None
            }
        }
    }

    fn record(&self, outcome: Outcome, latency: Duration, trial: bool) {
        let mut state = self.lock();
        let now = Instant::now();

        state.window.record(now, outcome);
        state.totals.record(outcome);
        if state.latencies.len() == LATENCY_SAMPLES {
            state.latencies.pop_front();
        }
        state.latencies.push_back(latency.as_millis() as u64);

        if trial {
            state.trial_in_flight = false;
        }

        match outcome {
            Outcome::Success => {
                state.consecutive_successes += 1;
                state.consecutive_failures = 0;
                if trial && state.status == CircuitStatus::HalfOpen {
                    state.window.reset();
                    state.opened_at = None;
                    self.transition(&mut state, CircuitStatus::Closed, now);
                }
            }
            Outcome::Failure | Outcome::Timeout => {
                state.consecutive_failures += 1;
                state.consecutive_successes = 0;
                if trial && state.status == CircuitStatus::HalfOpen {
                    state.opened_at = Some(now);
                    self.transition(&mut state, CircuitStatus::Open, now);
                } else if state.status == CircuitStatus::Closed
                    && self.should_trip(&mut state, now)
                {
                    state.opened_at = Some(now);
                    self.transition(&mut state, CircuitStatus::Open, now);
                }
            }
            Outcome::Rejected => {}
        }

        let label = match outcome {
            Outcome::Success => "success",
            Outcome::Failure => "failure",
            Outcome::Timeout => "timeout",
            Outcome::Rejected => "rejected",
        };
        metrics::record_operation(self.operation.as_str(), label, latency);
    }

    /// A trial that never reported back (its future was dropped).
    fn abandon_trial(&self) {
        let mut state = self.lock();
        state.trial_in_flight = false;
        if state.status == CircuitStatus::HalfOpen {
            let now = Instant::now();
            state.opened_at = Some(now);
            self.transition(&mut state, CircuitStatus::Open, now);
        }
    }

    fn should_trip(&self, state: &mut BreakerState, now: Instant) -> bool {
        let window = state.window.totals(now);
        window.volume() >= u64::from(self.config.volume_threshold)
            && window.error_percentage() >= self.config.error_threshold_percentage
    }

    fn transition(&self, state: &mut BreakerState, to: CircuitStatus, now: Instant) {
        let from = state.status;
        state.status = to;
        state.last_transition_at = now;
        metrics::record_circuit_state(self.operation.as_str(), to.gauge_value());

        match to {
            CircuitStatus::Open => tracing::warn!(
                operation = %self.operation,
                from = ?from,
                consecutive_failures = state.consecutive_failures,
                "Circuit opened"
            ),
            CircuitStatus::HalfOpen => {
                tracing::info!(operation = %self.operation, "Circuit half-open")
            }
            CircuitStatus::Closed => {
                tracing::info!(operation = %self.operation, from = ?from, "Circuit closed")
            }
        }
    }
}

/// Admission ticket for one call. A trial permit dropped without an outcome
/// reopens the circuit so the half-open gate cannot stay taken forever.
struct Permit<'a> {
    breaker: &'a CircuitBreaker,
    trial: bool,
    completed: bool,
}

impl<'a> Permit<'a> {
    fn new(breaker: &'a CircuitBreaker, trial: bool) -> Self {
        Self {
            breaker,
            trial,
            completed: false,
        }
    }

    fn complete(&mut self, outcome: Outcome, latency: Duration) {
        self.completed = true;
        self.breaker.record(outcome, latency, self.trial);
    }
}

impl Drop for Permit<'_> {
    fn drop(&mut self) {
        if self.trial && !self.completed {
            self.breaker.abandon_trial();
        }
    }
}

fn percentiles(samples: &VecDeque<u64>) -> LatencyPercentiles {
    if samples.is_empty() {
        return LatencyPercentiles::default();
    }
    let mut sorted: Vec<u64> = samples.iter().copied().collect();
    sorted.sort_unstable();
    let at = |p: usize| {
        let rank = (p * sorted.len()).div_ceil(100).max(1);
        sorted[rank - 1]
    };
    LatencyPercentiles {
        p50: at(50),
        p90: at(90),
        p99: at(99),
        max: sorted[sorted.len() - 1],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn config() -> BreakerConfig {
        BreakerConfig {
            timeout_ms: 1_000,
            error_threshold_percentage: 50,
            volume_threshold: 3,
            reset_timeout_ms: 5_000,
            rolling_count_timeout_ms: 10_000,
            rolling_count_buckets: 10,
        }
    }

    async fn fail(breaker: &CircuitBreaker) -> Result<(), BreakerError> {
        breaker
            .call(|| async {
                Err::<(), _>(GatewayError::Remote {
                    status: 500,
                    message: "boom".into(),
                })
            })
            .await
    }

    async fn succeed(breaker: &CircuitBreaker) -> Result<(), BreakerError> {
        breaker.call(|| async { Ok(()) }).await
    }

    #[tokio::test(start_paused = true)]
    async fn test_opens_after_volume_and_error_threshold() {
        let breaker = CircuitBreaker::new(Operation::CreateCredential, config());
        assert_eq!(breaker.status(), CircuitStatus::Closed);

        fail(&breaker).await.unwrap_err();
        fail(&breaker).await.unwrap_err();
        assert_eq!(breaker.status(), CircuitStatus::Closed);

        fail(&breaker).await.unwrap_err();
        assert_eq!(breaker.status(), CircuitStatus::Open);
    }

    #[tokio::test(start_paused = true)]
    async fn test_below_error_percentage_stays_closed() {
        let breaker = CircuitBreaker::new(Operation::ReadCredential, config());
        succeed(&breaker).await.unwrap();
        succeed(&breaker).await.unwrap();
        fail(&breaker).await.unwrap_err();
        assert_eq!(breaker.status(), CircuitStatus::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_open_circuit_does_not_invoke_action() {
        let breaker = CircuitBreaker::new(Operation::CreateCredential, config());
        for _ in 0..3 {
            fail(&breaker).await.unwrap_err();
        }

        let invoked = AtomicU32::new(0);
        let counter = &invoked;
        let result = breaker
            .call(|| async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .await;

        assert_eq!(result, Err(BreakerError::Open(Operation::CreateCredential)));
        assert_eq!(invoked.load(Ordering::SeqCst), 0);
        assert_eq!(breaker.stats().totals.rejects, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_half_open_trial_success_closes() {
        let breaker = CircuitBreaker::new(Operation::ReadCredential, config());
        for _ in 0..3 {
            fail(&breaker).await.unwrap_err();
        }

        tokio::time::advance(Duration::from_millis(4_999)).await;
        assert_eq!(breaker.status(), CircuitStatus::Open);

        tokio::time::advance(Duration::from_millis(1)).await;
        assert_eq!(breaker.status(), CircuitStatus::HalfOpen);

        succeed(&breaker).await.unwrap();
        let stats = breaker.stats();
        assert_eq!(stats.status, CircuitStatus::Closed);
        assert_eq!(stats.window.volume(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_half_open_trial_failure_reopens() {
        let breaker = CircuitBreaker::new(Operation::ReadCredential, config());
        for _ in 0..3 {
            fail(&breaker).await.unwrap_err();
        }
        tokio::time::advance(Duration::from_secs(5)).await;

        fail(&breaker).await.unwrap_err();
        assert_eq!(breaker.status(), CircuitStatus::Open);

        // reset timer restarted at the trial failure
        tokio::time::advance(Duration::from_secs(4)).await;
        assert_eq!(breaker.status(), CircuitStatus::Open);
        tokio::time::advance(Duration::from_secs(1)).await;
        assert_eq!(breaker.status(), CircuitStatus::HalfOpen);
    }

    #[tokio::test(start_paused = true)]
    async fn test_half_open_admits_single_trial() {
        let breaker = Arc::new(CircuitBreaker::new(Operation::Health, config()));
        for _ in 0..3 {
            fail(&breaker).await.unwrap_err();
        }
        tokio::time::advance(Duration::from_secs(5)).await;

        let (release_tx, release_rx) = tokio::sync::oneshot::channel::<()>();
        let trial = {
            let breaker = breaker.clone();
            tokio::spawn(async move {
                breaker
                    .call(|| async move {
                        let _ = release_rx.await;
                        Ok(())
                    })
                    .await
            })
        };
        tokio::task::yield_now().await;

        let concurrent = succeed(&breaker).await;
        assert_eq!(concurrent, Err(BreakerError::Open(Operation::Health)));

        release_tx.send(()).unwrap();
        assert_eq!(trial.await.unwrap(), Ok(()));
        assert_eq!(breaker.status(), CircuitStatus::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_abandoned_trial_reopens() {
        let breaker = CircuitBreaker::new(Operation::Health, config());
        for _ in 0..3 {
            fail(&breaker).await.unwrap_err();
        }
        tokio::time::advance(Duration::from_secs(5)).await;

        let pending = breaker.call(|| std::future::pending::<GatewayResult<()>>());
        let dropped = tokio::time::timeout(Duration::from_millis(10), pending).await;
        assert!(dropped.is_err());

        assert_eq!(breaker.status(), CircuitStatus::Open);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_is_counted_separately() {
        let breaker = CircuitBreaker::new(Operation::ReadCredential, config());
        let result = breaker
            .call(|| async {
                tokio::time::sleep(Duration::from_secs(2)).await;
                Ok(())
            })
            .await;

        assert_eq!(result, Err(BreakerError::Timeout(1_000)));
        let stats = breaker.stats();
        assert_eq!(stats.totals.timeouts, 1);
        assert_eq!(stats.totals.failures, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_not_found_is_not_a_failure() {
        let breaker = CircuitBreaker::new(Operation::ReadCredential, config());
        for _ in 0..5 {
            let result = breaker.call(|| async { Err::<(), _>(GatewayError::NotFound) }).await;
            assert_eq!(result, Err(BreakerError::Failed(GatewayError::NotFound)));
        }
        assert_eq!(breaker.status(), CircuitStatus::Closed);
        assert_eq!(breaker.stats().totals.failures, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failures_age_out_of_window() {
        let breaker = CircuitBreaker::new(Operation::CreateCredential, config());
        fail(&breaker).await.unwrap_err();
        fail(&breaker).await.unwrap_err();

        tokio::time::advance(Duration::from_secs(11)).await;
        fail(&breaker).await.unwrap_err();
        assert_eq!(breaker.status(), CircuitStatus::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reset_closes_circuit() {
        let breaker = CircuitBreaker::new(Operation::CreateCredential, config());
        for _ in 0..3 {
            fail(&breaker).await.unwrap_err();
        }
        breaker.reset();
        assert_eq!(breaker.status(), CircuitStatus::Closed);
        succeed(&breaker).await.unwrap();
    }

    #[test]
    fn test_percentiles() {
        let samples: VecDeque<u64> = (1..=100).collect();
        let p = percentiles(&samples);
        assert_eq!(p.p50, 50);
        assert_eq!(p.p90, 90);
        assert_eq!(p.p99, 99);
        assert_eq!(p.max, 100);

        assert_eq!(percentiles(&VecDeque::new()), LatencyPercentiles::default());
    }
}
