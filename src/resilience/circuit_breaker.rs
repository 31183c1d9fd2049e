//! Per-dependency circuit breaker.
//!
//! A closed breaker counts consecutive failures and opens at the configured
//! threshold. Once the reset timeout has passed since the last failure, one
//! trial call is admitted: success closes the breaker, failure reopens it.
//!
//! All state lives in atomics. Transitions use compare-and-set so that two
//! concurrent failures can never both move the breaker, and the half-open
//! trial is claimed through a single flag so exactly one trial call reaches a
//! recovering dependency.

use crate::constants::circuit_breaker::EVENT_CHANNEL_CAPACITY;
use crate::resilience::{CircuitBreakerConfig, CircuitBreakerMetrics};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

/// Sentinel for "no failure recorded yet"
const NO_FAILURE: u64 = u64::MAX;

#[derive(Debug, Default)]
struct CallCounters {
    calls: AtomicU64,
    successes: AtomicU64,
    failures: AtomicU64,
    rejections: AtomicU64,
    /// Consecutive failures while closed
    streak: AtomicU64,
    busy_nanos: AtomicU64,
}

impl CallCounters {
    fn completed(&self, succeeded: bool, elapsed: Duration) {
        let outcome = if succeeded {
            &self.successes
        } else {
            &self.failures
        };
        outcome.fetch_add(1, Ordering::Relaxed);
        self.calls.fetch_add(1, Ordering::Relaxed);
        self.busy_nanos
            .fetch_add(elapsed.as_nanos() as u64, Ordering::Relaxed);
    }

    fn rejected(&self) {
        self.rejections.fetch_add(1, Ordering::Relaxed);
    }

    /// Returns the streak length including this failure
    fn extend_streak(&self) -> u64 {
        self.streak.fetch_add(1, Ordering::AcqRel) + 1
    }

    fn clear_streak(&self) {
        self.streak.store(0, Ordering::Release);
    }

    fn ratio(part: u64, whole: u64) -> f64 {
        if whole == 0 {
            0.0
        } else {
            part as f64 / whole as f64
        }
    }

    fn snapshot(
        &self,
        state: CircuitState,
        since_last_failure: Option<Duration>,
    ) -> CircuitBreakerMetrics {
        let calls = self.calls.load(Ordering::Relaxed);
        let successes = self.successes.load(Ordering::Relaxed);
        let failures = self.failures.load(Ordering::Relaxed);
        let busy_nanos = self.busy_nanos.load(Ordering::Relaxed);

        CircuitBreakerMetrics {
            total_calls: calls,
            success_count: successes,
            failure_count: failures,
            rejected_count: self.rejections.load(Ordering::Relaxed),
            consecutive_failures: self.streak.load(Ordering::Relaxed),
            total_duration: Duration::from_nanos(busy_nanos),
            current_state: state,
            failure_rate: Self::ratio(failures, calls),
            success_rate: Self::ratio(successes, calls),
            average_duration: Duration::from_nanos(busy_nanos.checked_div(calls).unwrap_or(0)),
            since_last_failure,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CircuitState {
    /// Calls pass through and failures are counted
    #[default]
    Closed = 0,
    /// Calls are rejected until the reset timeout elapses
    Open = 1,
    /// One trial call decides between closing and reopening
    HalfOpen = 2,
}

impl CircuitState {
    /// Unknown encodings read as open
    const fn decode(raw: u8) -> Self {
        match raw {
            0 => Self::Closed,
            2 => Self::HalfOpen,
            _ => Self::Open,
        }
    }
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Closed => "CLOSED",
            Self::Open => "OPEN",
            Self::HalfOpen => "HALF_OPEN",
        })
    }
}

/// Published on every state transition
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CircuitStateChange {
    pub component: String,
    pub from: CircuitState,
    pub to: CircuitState,
    pub at: DateTime<Utc>,
}

#[derive(Debug, thiserror::Error)]
pub enum CircuitBreakerError<E> {
    /// Rejected without running the operation
    #[error("{component} circuit is open; retry in {retry_after:?}")]
    CircuitOpen {
        component: String,
        retry_after: Duration,
    },

    /// The operation ran and returned an error
    #[error("{0}")]
    OperationFailed(E),
}

impl<E> CircuitBreakerError<E> {
    pub fn is_circuit_open(&self) -> bool {
        matches!(self, Self::CircuitOpen { .. })
    }
}

/// How a call was let through
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Admission {
    Normal,
    Trial,
    Rejected,
}

/// Breaker guarding one named dependency
#[derive(Debug)]
pub struct CircuitBreaker {
    name: String,
    /// [`CircuitState`] as `u8`
    state: AtomicU8,
    config: CircuitBreakerConfig,
    counters: CallCounters,

    /// Reference point for the nanosecond timestamps below
    origin: Instant,

    /// Nanos since `origin` of the most recent failure
    last_failure_nanos: AtomicU64,

    /// Set while the half-open trial call is running
    trial_in_flight: AtomicBool,

    events: broadcast::Sender<CircuitStateChange>,
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        let name = name.into();
        debug!(
            component = %name,
            failure_threshold = config.failure_threshold,
            reset_timeout_ms = config.reset_timeout.as_millis() as u64,
            "Breaker created"
        );

        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

        Self {
            name,
            state: AtomicU8::new(CircuitState::Closed as u8),
            config,
            counters: CallCounters::default(),
            origin: Instant::now(),
            last_failure_nanos: AtomicU64::new(NO_FAILURE),
            trial_in_flight: AtomicBool::new(false),
            events,
        }
    }

    pub fn state(&self) -> CircuitState {
        CircuitState::decode(self.state.load(Ordering::Acquire))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    /// Receive every state transition of this breaker
    pub fn subscribe(&self) -> broadcast::Receiver<CircuitStateChange> {
        self.events.subscribe()
    }

    /// Run `operation` if the breaker admits it.
    ///
    /// Rejected calls return [`CircuitBreakerError::CircuitOpen`] without
    /// running `operation`.
    pub async fn execute<F, Fut, T, E>(&self, operation: F) -> Result<T, CircuitBreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let admission = self.admit();
        if admission == Admission::Rejected {
            self.counters.rejected();
            debug!(component = %self.name, "Rejected: circuit open");
            return Err(CircuitBreakerError::CircuitOpen {
                component: self.name.clone(),
                retry_after: self.retry_after(),
            });
        }

        self.run(admission, operation)
            .await
            .map_err(CircuitBreakerError::OperationFailed)
    }

    /// Execute an operation, substituting `fallback` when the circuit rejects the call
    ///
    /// Failures of the operation itself are still returned to the caller.
    pub async fn execute_with_fallback<F, Fut, T, E, FB>(
        &self,
        operation: F,
        fallback: FB,
    ) -> Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        FB: FnOnce() -> T,
    {
        let admission = self.admit();
        if admission == Admission::Rejected {
            self.counters.rejected();
            debug!(component = %self.name, "Rejected: circuit open, serving fallback");
            return Ok(fallback());
        }

        self.run(admission, operation).await
    }

    async fn run<F, Fut, T, E>(&self, admission: Admission, operation: F) -> Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        // Reopens the circuit if the trial future is dropped before completing
        let mut trial_guard = (admission == Admission::Trial).then(|| TrialGuard { breaker: self });

        let started = Instant::now();
        let result = operation().await;
        let elapsed = started.elapsed();

        if let Some(guard) = trial_guard.take() {
            std::mem::forget(guard);
        }

        if result.is_ok() {
            self.on_success(admission, elapsed);
        } else {
            self.on_failure(admission, elapsed);
        }

        result
    }

    /// Decide whether a call may proceed
    fn admit(&self) -> Admission {
        match self.state() {
            CircuitState::Closed => Admission::Normal,
            CircuitState::Open => {
                if !self.reset_timeout_elapsed() {
                    return Admission::Rejected;
                }
                self.transition(CircuitState::Open, CircuitState::HalfOpen);
                self.claim_trial()
            }
            CircuitState::HalfOpen => self.claim_trial(),
        }
    }

    fn claim_trial(&self) -> Admission {
        if self
            .trial_in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Admission::Rejected;
        }

        // The previous trial may have finished between the state read and the claim
        match self.state() {
            CircuitState::HalfOpen => Admission::Trial,
            CircuitState::Closed => {
                self.release_trial();
                Admission::Normal
            }
            CircuitState::Open => {
                self.release_trial();
                Admission::Rejected
            }
        }
    }

    fn release_trial(&self) {
        self.trial_in_flight.store(false, Ordering::Release);
    }

    fn on_success(&self, admission: Admission, elapsed: Duration) {
        self.counters.completed(true, elapsed);

        match admission {
            Admission::Trial => {
                self.counters.clear_streak();
                if self.transition(CircuitState::HalfOpen, CircuitState::Closed) {
                    info!(
                        component = %self.name,
                        trial_ms = elapsed.as_millis() as u64,
                        "Dependency recovered, circuit closed"
                    );
                }
                self.release_trial();
            }
            Admission::Normal if self.state() == CircuitState::Closed => {
                self.counters.clear_streak();
            }
            _ => {}
        }
    }

    fn on_failure(&self, admission: Admission, elapsed: Duration) {
        self.counters.completed(false, elapsed);
        self.mark_failure_time();

        match admission {
            Admission::Normal if self.state() == CircuitState::Closed => {
                let streak = self.counters.extend_streak();
                debug!(
                    component = %self.name,
                    streak,
                    elapsed_ms = elapsed.as_millis() as u64,
                    "Guarded call failed"
                );
                if streak >= u64::from(self.config.failure_threshold)
                    && self.transition(CircuitState::Closed, CircuitState::Open)
                {
                    error!(
                        component = %self.name,
                        streak,
                        reset_timeout_ms = self.config.reset_timeout.as_millis() as u64,
                        "Failure threshold reached, circuit open"
                    );
                }
            }
            Admission::Trial => {
                if self.transition(CircuitState::HalfOpen, CircuitState::Open) {
                    error!(component = %self.name, "Trial call failed, circuit open again");
                }
                self.release_trial();
            }
            _ => {}
        }
    }

    fn mark_failure_time(&self) {
        self.last_failure_nanos
            .store(self.now_nanos(), Ordering::Release);
    }

    /// Compare-and-set transition; returns whether this caller performed it
    fn transition(&self, from: CircuitState, to: CircuitState) -> bool {
        let swapped = self
            .state
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok();

        if swapped {
            if to == CircuitState::HalfOpen {
                info!(component = %self.name, "Reset timeout elapsed, circuit half-open");
            }
            self.publish(from, to);
        }
        swapped
    }

    fn publish(&self, from: CircuitState, to: CircuitState) {
        // No subscribers is not an error
        let _ = self.events.send(CircuitStateChange {
            component: self.name.clone(),
            from,
            to,
            at: Utc::now(),
        });
    }

    fn now_nanos(&self) -> u64 {
        self.origin.elapsed().as_nanos() as u64
    }

    fn since_last_failure(&self) -> Option<Duration> {
        match self.last_failure_nanos.load(Ordering::Acquire) {
            NO_FAILURE => None,
            nanos => Some(Duration::from_nanos(self.now_nanos().saturating_sub(nanos))),
        }
    }

    fn reset_timeout_elapsed(&self) -> bool {
        match self.since_last_failure() {
            Some(elapsed) => elapsed > self.config.reset_timeout,
            None => {
                warn!(component = %self.name, "Circuit open but no failure timestamp recorded");
                true
            }
        }
    }

    /// Remaining time until a trial call will be admitted
    pub fn retry_after(&self) -> Duration {
        match self.since_last_failure() {
            Some(elapsed) => self.config.reset_timeout.saturating_sub(elapsed),
            None => Duration::ZERO,
        }
    }

    /// Trip the breaker regardless of recent outcomes
    pub fn force_open(&self) {
        warn!(component = %self.name, "Circuit forced open");
        self.mark_failure_time();
        self.force(CircuitState::Open);
    }

    pub fn force_closed(&self) {
        warn!(component = %self.name, "Circuit forced closed");
        self.counters.clear_streak();
        self.force(CircuitState::Closed);
        self.release_trial();
    }

    fn force(&self, to: CircuitState) {
        let from = CircuitState::decode(self.state.swap(to as u8, Ordering::AcqRel));
        if from != to {
            self.publish(from, to);
        }
    }

    pub fn metrics(&self) -> CircuitBreakerMetrics {
        self.counters
            .snapshot(self.state(), self.since_last_failure())
    }

    /// See [`CircuitBreakerMetrics::is_healthy`]
    pub fn is_healthy(&self) -> bool {
        self.metrics().is_healthy()
    }
}

/// Treats an abandoned trial call as a failed one
struct TrialGuard<'a> {
    breaker: &'a CircuitBreaker,
}

impl Drop for TrialGuard<'_> {
    fn drop(&mut self) {
        let breaker = self.breaker;
        breaker.mark_failure_time();
        if breaker.transition(CircuitState::HalfOpen, CircuitState::Open) {
            warn!(component = %breaker.name, "Trial call dropped, circuit open again");
        }
        breaker.release_trial();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;
    use std::sync::Arc;
    use tokio::sync::oneshot;

    fn config(failure_threshold: u32, reset_timeout_ms: u64) -> CircuitBreakerConfig {
        CircuitBreakerConfig {
            failure_threshold,
            reset_timeout: Duration::from_millis(reset_timeout_ms),
        }
    }

    async fn fail(circuit: &CircuitBreaker) {
        let _ = circuit.execute(|| async { Err::<(), _>("boom") }).await;
    }

    #[tokio::test]
    async fn test_circuit_breaker_normal_operation() {
        let circuit = CircuitBreaker::new("test", config(3, 100));

        assert_eq!(circuit.state(), CircuitState::Closed);

        let result = circuit.execute(|| async { Ok::<_, String>("success") }).await;
        assert!(result.is_ok());

        let metrics = circuit.metrics();
        assert_eq!(metrics.total_calls, 1);
        assert_eq!(metrics.success_count, 1);
        assert_eq!(metrics.failure_count, 0);
        assert_eq!(metrics.success_rate, 1.0);
    }

    #[tokio::test]
    async fn test_success_resets_consecutive_failures() {
        let circuit = CircuitBreaker::new("test", config(3, 100));

        fail(&circuit).await;
        fail(&circuit).await;
        assert_eq!(circuit.metrics().consecutive_failures, 2);

        let _ = circuit.execute(|| async { Ok::<_, &str>(()) }).await;
        assert_eq!(circuit.metrics().consecutive_failures, 0);

        fail(&circuit).await;
        fail(&circuit).await;
        assert_eq!(circuit.state(), CircuitState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_open_circuit_uses_fallback_without_calling_operation() {
        let circuit = CircuitBreaker::new("inference", config(2, 1_000));
        let calls = AtomicU32::new(0);

        fail(&circuit).await;
        assert_eq!(circuit.state(), CircuitState::Closed);
        fail(&circuit).await;
        assert_eq!(circuit.state(), CircuitState::Open);

        tokio::time::advance(Duration::from_millis(500)).await;

        let result = circuit
            .execute_with_fallback(
                || async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok::<_, &str>("live")
                },
                || "degraded",
            )
            .await;

        assert_eq!(result, Ok("degraded"));
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        let rejected = circuit
            .execute(|| async { Ok::<_, &str>("should not execute") })
            .await;
        match rejected {
            Err(CircuitBreakerError::CircuitOpen { retry_after, .. }) => {
                assert_eq!(retry_after, Duration::from_millis(500));
            }
            other => panic!("expected open circuit, got {other:?}"),
        }
        assert_eq!(circuit.metrics().rejected_count, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reset_timeout_must_strictly_elapse() {
        let circuit = CircuitBreaker::new("test", config(1, 100));
        fail(&circuit).await;

        tokio::time::advance(Duration::from_millis(100)).await;
        let result = circuit.execute(|| async { Ok::<_, &str>(()) }).await;
        assert!(result.unwrap_err().is_circuit_open());

        tokio::time::advance(Duration::from_millis(1)).await;
        let result = circuit.execute(|| async { Ok::<_, &str>(()) }).await;
        assert!(result.is_ok());
        assert_eq!(circuit.state(), CircuitState::Closed);
        assert_eq!(circuit.metrics().consecutive_failures, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_trial_reopens_circuit() {
        let circuit = CircuitBreaker::new("test", config(1, 50));
        fail(&circuit).await;

        tokio::time::advance(Duration::from_millis(60)).await;
        fail(&circuit).await;
        assert_eq!(circuit.state(), CircuitState::Open);

        // lastFailTime was reset by the failed trial
        tokio::time::advance(Duration::from_millis(30)).await;
        let result = circuit.execute(|| async { Ok::<_, &str>(()) }).await;
        assert!(result.unwrap_err().is_circuit_open());

        tokio::time::advance(Duration::from_millis(30)).await;
        let result = circuit.execute(|| async { Ok::<_, &str>(()) }).await;
        assert!(result.is_ok());
        assert_eq!(circuit.state(), CircuitState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_half_open_admits_single_trial() {
        let circuit = Arc::new(CircuitBreaker::new("inference", config(1, 100)));
        fail(&circuit).await;
        tokio::time::advance(Duration::from_millis(101)).await;

        let (release_tx, release_rx) = oneshot::channel::<()>();
        let trial = {
            let circuit = Arc::clone(&circuit);
            tokio::spawn(async move {
                circuit
                    .execute(|| async move {
                        let _ = release_rx.await;
                        Ok::<_, &str>("recovered")
                    })
                    .await
            })
        };

        while circuit.state() != CircuitState::HalfOpen {
            tokio::task::yield_now().await;
        }

        let concurrent = circuit.execute(|| async { Ok::<_, &str>("second") }).await;
        assert!(concurrent.unwrap_err().is_circuit_open());

        release_tx.send(()).unwrap();
        assert_eq!(trial.await.unwrap().unwrap(), "recovered");
        assert_eq!(circuit.state(), CircuitState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_abandoned_trial_reopens_circuit() {
        let circuit = CircuitBreaker::new("test", config(1, 100));
        fail(&circuit).await;
        tokio::time::advance(Duration::from_millis(101)).await;

        let pending = circuit.execute(|| async {
            std::future::pending::<()>().await;
            Ok::<_, &str>(())
        });
        let _ = tokio::time::timeout(Duration::from_millis(10), pending).await;

        assert_eq!(circuit.state(), CircuitState::Open);
    }

    #[tokio::test]
    async fn test_state_change_events_published() {
        let circuit = CircuitBreaker::new("database", config(1, 10_000));
        let mut events = circuit.subscribe();

        fail(&circuit).await;
        circuit.force_closed();

        let opened = events.recv().await.unwrap();
        assert_eq!(opened.component, "database");
        assert_eq!(opened.from, CircuitState::Closed);
        assert_eq!(opened.to, CircuitState::Open);

        let closed = events.recv().await.unwrap();
        assert_eq!(closed.to, CircuitState::Closed);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_failures_open_exactly_once() {
        const CALLERS: usize = 8;
        let circuit = Arc::new(CircuitBreaker::new("inference", config(3, 60_000)));
        let mut events = circuit.subscribe();
        let barrier = Arc::new(tokio::sync::Barrier::new(CALLERS));

        let callers: Vec<_> = (0..CALLERS)
            .map(|_| {
                let circuit = Arc::clone(&circuit);
                let barrier = Arc::clone(&barrier);
                tokio::spawn(async move {
                    barrier.wait().await;
                    fail(&circuit).await;
                })
            })
            .collect();
        for caller in callers {
            caller.await.unwrap();
        }

        assert_eq!(circuit.state(), CircuitState::Open);
        let opened = events.try_recv().unwrap();
        assert_eq!(
            (opened.from, opened.to),
            (CircuitState::Closed, CircuitState::Open)
        );
        assert!(matches!(
            events.try_recv(),
            Err(broadcast::error::TryRecvError::Empty)
        ));

        let metrics = circuit.metrics();
        assert_eq!(metrics.failure_count + metrics.rejected_count, CALLERS as u64);
        assert!(metrics.failure_count >= 3);
    }

    #[tokio::test]
    async fn test_health_follows_metrics_snapshot() {
        let circuit = CircuitBreaker::new("test", config(50, 1_000));

        for _ in 0..9 {
            fail(&circuit).await;
        }
        assert!(circuit.is_healthy(), "too few calls to judge");

        fail(&circuit).await;
        assert!(!circuit.is_healthy());
        assert_eq!(circuit.is_healthy(), circuit.metrics().is_healthy());
    }

    #[tokio::test]
    async fn test_force_operations() {
        let circuit = CircuitBreaker::new("test", config(1, 1_000));

        circuit.force_open();
        assert_eq!(circuit.state(), CircuitState::Open);
        assert!(!circuit.is_healthy());

        circuit.force_closed();
        assert_eq!(circuit.state(), CircuitState::Closed);
        assert!(circuit.is_healthy());
    }
}
