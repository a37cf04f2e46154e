//! Circuit breaker for dependency protection.
//!
//! # States
//! - Closed: normal operation, calls pass through
//! - Open: dependency assumed down, calls fail fast
//! - Half-Open: limited probes test whether the dependency recovered
//!
//! # State Transitions
//! ```text
//! Closed → Open: consecutive failures >= max_failures
//! Open → Half-Open: admission after reset_timeout has elapsed
//! Half-Open → Closed: max_half_open_probes consecutive probes succeed
//! Half-Open → Open: any probe fails
//! ```
//!
//! # Design Decisions
//! - Admission and outcome recording are each atomic under one mutex;
//!   the lock is never held across an await point
//! - Timeouts count as failures and surface as a distinct error kind
//! - The breaker never retries; retry policy belongs to the caller

use std::future::Future;
use std::sync::Mutex;
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;
use tokio::time::Instant;

use crate::observability::metrics;

/// Error returned by [`CircuitBreaker::call`].
///
/// `Open` and `Timeout` are synthesized by the breaker; `Inner` passes the
/// wrapped operation's own error through unchanged.
#[derive(Debug, Error)]
pub enum BreakerError<E: std::error::Error> {
    /// Admission denied: the circuit is open and the cooldown has not elapsed.
    #[error("circuit breaker is open")]
    Open,

    /// The wrapped operation exceeded the configured call deadline.
    #[error("circuit breaker call timed out")]
    Timeout,

    /// The wrapped operation returned an error of its own.
    #[error("{0}")]
    Inner(E),
}

/// Current state of the circuit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl CircuitState {
    pub fn as_str(&self) -> &'static str {
        match self {
            CircuitState::Closed => "closed",
            CircuitState::Open => "open",
            CircuitState::HalfOpen => "half-open",
        }
    }
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Circuit breaker configuration, immutable after construction.
#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures before the circuit opens.
    pub max_failures: u32,

    /// How long the circuit stays open before admitting a probe.
    pub reset_timeout: Duration,

    /// Deadline applied to each individual call.
    pub call_timeout: Duration,

    /// Successful probes required to close the circuit again.
    pub max_half_open_probes: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            max_failures: 5,
            reset_timeout: Duration::from_secs(30),
            call_timeout: Duration::from_secs(10),
            max_half_open_probes: 3,
        }
    }
}

/// Read-only snapshot of breaker internals for health endpoints.
#[derive(Debug, Clone, Serialize)]
pub struct BreakerStats {
    pub state: CircuitState,
    pub failures: u32,
    pub probes: u32,
    /// Seconds since the most recent recorded failure, if any.
    pub seconds_since_last_failure: Option<f64>,
}

/// Mutable breaker fields; they transition as one atomic unit under the mutex.
struct Shared {
    state: CircuitState,
    failures: u32,
    probes: u32,
    last_failure: Option<Instant>,
}

/// A three-state circuit breaker shared by all concurrent callers.
pub struct CircuitBreaker {
    config: CircuitBreakerConfig,
    shared: Mutex<Shared>,
}

impl CircuitBreaker {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config,
            shared: Mutex::new(Shared {
                state: CircuitState::Closed,
                failures: 0,
                probes: 0,
                last_failure: None,
            }),
        }
    }

    /// Run `op` with circuit breaker protection.
    ///
    /// If admission is denied the operation is never invoked and
    /// [`BreakerError::Open`] is returned immediately. Otherwise the
    /// operation runs under `call_timeout`; an elapsed deadline is recorded
    /// as a failure and surfaces as [`BreakerError::Timeout`].
    pub async fn call<T, E, F, Fut>(&self, op: F) -> Result<T, BreakerError<E>>
    where
        E: std::error::Error,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        if !self.admit() {
            metrics::record_breaker_rejection();
            return Err(BreakerError::Open);
        }

        match tokio::time::timeout(self.config.call_timeout, op()).await {
            Ok(Ok(value)) => {
                self.record_success();
                Ok(value)
            }
            Ok(Err(err)) => {
                self.record_failure();
                Err(BreakerError::Inner(err))
            }
            Err(_elapsed) => {
                self.record_failure();
                Err(BreakerError::Timeout)
            }
        }
    }

    /// Decide whether a call may reach the protected operation.
    /// The open → half-open transition happens here, under the lock.
    fn admit(&self) -> bool {
        let mut shared = self.shared.lock().expect("breaker mutex poisoned");
        match shared.state {
            CircuitState::Closed => true,
            CircuitState::Open => {
                let cooled_down = shared
                    .last_failure
                    .is_some_and(|at| at.elapsed() > self.config.reset_timeout);
                if cooled_down {
                    shared.state = CircuitState::HalfOpen;
                    shared.probes = 0;
                    metrics::record_breaker_transition("half-open");
                    tracing::info!("Circuit breaker half-open, probing recovery");
                    true
                } else {
                    false
                }
            }
            CircuitState::HalfOpen => shared.probes < self.config.max_half_open_probes,
        }
    }

    fn record_success(&self) {
        let mut shared = self.shared.lock().expect("breaker mutex poisoned");
        match shared.state {
            CircuitState::Closed => shared.failures = 0,
            CircuitState::HalfOpen => {
                shared.probes += 1;
                if shared.probes >= self.config.max_half_open_probes {
                    shared.state = CircuitState::Closed;
                    shared.failures = 0;
                    shared.probes = 0;
                    metrics::record_breaker_transition("closed");
                    tracing::info!("Circuit breaker closed after successful probation");
                }
            }
            // A success cannot be recorded while Open: admission either
            // rejects the call or moves the state to HalfOpen first.
            CircuitState::Open => {}
        }
    }

    fn record_failure(&self) {
        let mut shared = self.shared.lock().expect("breaker mutex poisoned");
        shared.failures += 1;
        shared.last_failure = Some(Instant::now());
        match shared.state {
            CircuitState::Closed => {
                if shared.failures >= self.config.max_failures {
                    shared.state = CircuitState::Open;
                    metrics::record_breaker_transition("open");
                    tracing::warn!(
                        failures = shared.failures,
                        max_failures = self.config.max_failures,
                        "Circuit breaker opened"
                    );
                }
            }
            CircuitState::HalfOpen => {
                // No partial credit: one probe failure ends probation.
                shared.state = CircuitState::Open;
                metrics::record_breaker_transition("open");
                tracing::warn!("Circuit breaker reopened by a failed probe");
            }
            CircuitState::Open => {}
        }
    }

    /// Current circuit state; never mutates.
    pub fn state(&self) -> CircuitState {
        self.shared.lock().expect("breaker mutex poisoned").state
    }

    /// Snapshot of breaker internals; never mutates.
    pub fn stats(&self) -> BreakerStats {
        let shared = self.shared.lock().expect("breaker mutex poisoned");
        BreakerStats {
            state: shared.state,
            failures: shared.failures,
            probes: shared.probes,
            seconds_since_last_failure: shared.last_failure.map(|at| at.elapsed().as_secs_f64()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[derive(Debug, Error)]
    #[error("simulated dependency failure")]
    struct Boom;

    fn breaker(max_failures: u32, reset_secs: u64, probes: u32) -> CircuitBreaker {
        CircuitBreaker::new(CircuitBreakerConfig {
            max_failures,
            reset_timeout: Duration::from_secs(reset_secs),
            call_timeout: Duration::from_secs(1),
            max_half_open_probes: probes,
        })
    }

    async fn fail(cb: &CircuitBreaker) -> Result<(), BreakerError<Boom>> {
        cb.call(|| async { Err::<(), _>(Boom) }).await
    }

    async fn succeed(cb: &CircuitBreaker) -> Result<(), BreakerError<Boom>> {
        cb.call(|| async { Ok::<_, Boom>(()) }).await
    }

    #[tokio::test]
    async fn opens_after_failure_threshold() {
        let cb = breaker(3, 30, 2);
        for _ in 0..3 {
            assert!(matches!(fail(&cb).await, Err(BreakerError::Inner(_))));
        }
        assert_eq!(cb.state(), CircuitState::Open);

        // The rejected call must never reach the operation.
        let invoked = Arc::new(AtomicU32::new(0));
        let counter = invoked.clone();
        let result = cb
            .call(|| async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok::<_, Boom>(())
            })
            .await;
        assert!(matches!(result, Err(BreakerError::Open)));
        assert_eq!(invoked.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn success_resets_closed_failure_count() {
        let cb = breaker(3, 30, 2);
        fail(&cb).await.unwrap_err();
        fail(&cb).await.unwrap_err();
        succeed(&cb).await.unwrap();
        assert_eq!(cb.stats().failures, 0);
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn rejects_before_cooldown_and_half_opens_after() {
        let cb = breaker(3, 30, 2);
        for _ in 0..3 {
            fail(&cb).await.unwrap_err();
        }
        assert_eq!(cb.state(), CircuitState::Open);

        tokio::time::advance(Duration::from_secs(10)).await;
        assert!(matches!(succeed(&cb).await, Err(BreakerError::Open)));
        assert_eq!(cb.state(), CircuitState::Open);

        tokio::time::advance(Duration::from_secs(21)).await;
        succeed(&cb).await.unwrap();
        assert_eq!(cb.state(), CircuitState::HalfOpen);
        assert_eq!(cb.stats().probes, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn closes_after_successful_probation() {
        let cb = breaker(3, 30, 2);
        for _ in 0..3 {
            fail(&cb).await.unwrap_err();
        }
        tokio::time::advance(Duration::from_secs(31)).await;

        succeed(&cb).await.unwrap();
        assert_eq!(cb.state(), CircuitState::HalfOpen);
        succeed(&cb).await.unwrap();

        let stats = cb.stats();
        assert_eq!(stats.state, CircuitState::Closed);
        assert_eq!(stats.failures, 0);
        assert_eq!(stats.probes, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn probe_failure_reopens_immediately() {
        let cb = breaker(3, 30, 5);
        for _ in 0..3 {
            fail(&cb).await.unwrap_err();
        }
        tokio::time::advance(Duration::from_secs(31)).await;

        succeed(&cb).await.unwrap();
        assert_eq!(cb.state(), CircuitState::HalfOpen);
        fail(&cb).await.unwrap_err();
        assert_eq!(cb.state(), CircuitState::Open);
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_counts_as_failure() {
        let cb = breaker(3, 30, 2);
        let result = cb
            .call(|| async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok::<_, Boom>(())
            })
            .await;
        assert!(matches!(result, Err(BreakerError::Timeout)));
        assert_eq!(cb.stats().failures, 1);
    }

    #[tokio::test]
    async fn concurrent_failures_open_the_circuit() {
        let cb = Arc::new(breaker(5, 30, 2));
        let mut tasks = Vec::new();
        for _ in 0..32 {
            let cb = cb.clone();
            tasks.push(tokio::spawn(async move {
                let _ = fail(&cb).await;
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }
        assert_eq!(cb.state(), CircuitState::Open);
    }
}
