//! Circuit breaker for backend operations.
//!
//! # States
//! - Closed: normal operation, calls pass through
//! - Open: backend assumed down, calls fail fast
//! - Half-Open: probing whether the backend recovered
//!
//! # State Transitions
//! ```text
//! Closed → Open: failure_count >= failure_threshold
//! Open → Half-Open: on the next call once reset_timeout has elapsed since the last failure
//! Half-Open → Closed: close_threshold consecutive successes
//! Half-Open → Open: any failure (success progress is discarded)
//! ```
//!
//! # Design Decisions
//! - One breaker per operation name, owned by the retry executor
//! - Fail fast in Open state; the operation is never invoked
//! - Counters are advisory: overlapping calls don't queue, last writer wins

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use arc_swap::ArcSwap;
use serde::Serialize;
use thiserror::Error;
use tokio::time::Instant;

use crate::clock::unix_millis;
use crate::config::CircuitBreakerConfig;
use crate::observability::metrics;

/// Circuit breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Closed => write!(f, "closed"),
            Self::Open => write!(f, "open"),
            Self::HalfOpen => write!(f, "half_open"),
        }
    }
}

/// Error returned by `CircuitBreaker::execute`.
#[derive(Debug, Error)]
pub enum CircuitError<E> {
    /// The circuit is open; the operation was not invoked.
    #[error("circuit breaker '{name}' is open")]
    Open { name: String },

    /// The operation ran and failed. Displayed verbatim.
    #[error("{0}")]
    Inner(E),
}

impl<E> CircuitError<E> {
    pub fn is_open(&self) -> bool {
        matches!(self, CircuitError::Open { .. })
    }

    /// The operation's own error, if it ran.
    pub fn into_inner(self) -> Option<E> {
        match self {
            CircuitError::Inner(e) => Some(e),
            CircuitError::Open { .. } => None,
        }
    }
}

/// Point-in-time view of a breaker.
#[derive(Debug, Clone, Serialize)]
pub struct CircuitBreakerStatus {
    pub name: String,
    pub state: CircuitState,
    pub failure_count: u32,
    pub success_count: u32,
    /// Epoch millis of the last recorded failure.
    pub last_failure_ms: Option<u64>,
    pub total_calls: u64,
    pub total_rejections: u64,
}

#[derive(Debug)]
struct BreakerState {
    state: CircuitState,
    failure_count: u32,
    success_count: u32,
    last_failure: Option<Instant>,
    last_failure_ms: Option<u64>,
}

/// A named circuit breaker.
pub struct CircuitBreaker {
    name: String,
    config: ArcSwap<CircuitBreakerConfig>,
    state: Mutex<BreakerState>,
    total_calls: AtomicU64,
    total_rejections: AtomicU64,
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        Self {
            name: name.into(),
            config: ArcSwap::from_pointee(config),
            state: Mutex::new(BreakerState {
                state: CircuitState::Closed,
                failure_count: 0,
                success_count: 0,
                last_failure: None,
                last_failure_ms: None,
            }),
            total_calls: AtomicU64::new(0),
            total_rejections: AtomicU64::new(0),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Replace thresholds/timeouts; current state and counters are kept.
    pub fn update_config(&self, config: CircuitBreakerConfig) {
        self.config.store(config.into());
    }

    fn lock(&self) -> MutexGuard<'_, BreakerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Current state, without triggering the lazy Open → Half-Open move.
    pub fn state(&self) -> CircuitState {
        self.lock().state
    }

    /// Decide whether a call may proceed.
    ///
    /// An open circuit whose reset timeout has elapsed moves to half-open here.
    pub fn try_acquire(&self) -> bool {
        self.total_calls.fetch_add(1, Ordering::Relaxed);
        let config = self.config.load();
        let mut inner = self.lock();

        if inner.state == CircuitState::Open {
            let cooled_down = inner
                .last_failure
                .map_or(true, |at| at.elapsed() > config.reset_timeout());
            if cooled_down {
                inner.success_count = 0;
                self.transition(&mut inner, CircuitState::HalfOpen);
            } else {
                drop(inner);
                self.total_rejections.fetch_add(1, Ordering::Relaxed);
                metrics::record_circuit_rejection(&self.name);
                tracing::debug!(circuit = %self.name, "Circuit open, rejecting call");
                return false;
            }
        }
        true
    }

    /// Record a successful call.
    pub fn record_success(&self) {
        let close_threshold = self.config.load().close_threshold;
        let mut inner = self.lock();
        inner.failure_count = 0;
        if inner.state == CircuitState::HalfOpen {
            inner.success_count += 1;
            if inner.success_count >= close_threshold {
                inner.success_count = 0;
                self.transition(&mut inner, CircuitState::Closed);
            }
        }
    }

    /// Record a failed call.
    pub fn record_failure(&self) {
        let failure_threshold = self.config.load().failure_threshold;
        let mut inner = self.lock();
        inner.failure_count = inner.failure_count.saturating_add(1);
        inner.last_failure = Some(Instant::now());
        inner.last_failure_ms = Some(unix_millis());

        let reopen = inner.state == CircuitState::HalfOpen;
        if reopen || (inner.state == CircuitState::Closed && inner.failure_count >= failure_threshold) {
            inner.success_count = 0;
            self.transition(&mut inner, CircuitState::Open);
        }
    }

    /// Run `operation` through the breaker.
    pub async fn execute<F, Fut, T, E>(&self, operation: F) -> Result<T, CircuitError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        if !self.try_acquire() {
            return Err(CircuitError::Open {
                name: self.name.clone(),
            });
        }

        match operation().await {
            Ok(value) => {
                self.record_success();
                Ok(value)
            }
            Err(e) => {
                self.record_failure();
                Err(CircuitError::Inner(e))
            }
        }
    }

    /// Force the circuit closed with zeroed counters.
    pub fn reset(&self) {
        let mut inner = self.lock();
        inner.failure_count = 0;
        inner.success_count = 0;
        inner.last_failure = None;
        inner.last_failure_ms = None;
        if inner.state != CircuitState::Closed {
            self.transition(&mut inner, CircuitState::Closed);
        }
        tracing::info!(circuit = %self.name, "Circuit breaker reset");
    }

    pub fn status(&self) -> CircuitBreakerStatus {
        let inner = self.lock();
        CircuitBreakerStatus {
            name: self.name.clone(),
            state: inner.state,
            failure_count: inner.failure_count,
            success_count: inner.success_count,
            last_failure_ms: inner.last_failure_ms,
            total_calls: self.total_calls.load(Ordering::Relaxed),
            total_rejections: self.total_rejections.load(Ordering::Relaxed),
        }
    }

    fn transition(&self, inner: &mut BreakerState, to: CircuitState) {
        let from = inner.state;
        inner.state = to;
        match to {
            CircuitState::Open => tracing::warn!(
                circuit = %self.name,
                from = %from,
                failures = inner.failure_count,
                "Circuit opened"
            ),
            _ => tracing::info!(circuit = %self.name, from = %from, to = %to, "Circuit state changed"),
        }
        metrics::record_circuit_transition(&self.name, &to.to_string());
    }
}

impl std::fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("name", &self.name)
            .field("state", &self.state())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;
    use std::time::Duration;

    fn config(failure_threshold: u32, close_threshold: u32) -> CircuitBreakerConfig {
        CircuitBreakerConfig {
            failure_threshold,
            reset_timeout_ms: 1_000,
            close_threshold,
        }
    }

    async fn fail(cb: &CircuitBreaker) -> Result<(), CircuitError<&'static str>> {
        cb.execute(|| async { Err::<(), _>("boom") }).await
    }

    async fn succeed(cb: &CircuitBreaker) -> Result<(), CircuitError<&'static str>> {
        cb.execute(|| async { Ok::<_, &'static str>(()) }).await
    }

    #[tokio::test]
    async fn test_opens_after_threshold_for_any_threshold() {
        for threshold in 1..=6 {
            let cb = CircuitBreaker::new("db.select", config(threshold, 1));
            for i in 0..threshold {
                assert_eq!(cb.state(), CircuitState::Closed, "threshold {threshold}, call {i}");
                assert!(matches!(fail(&cb).await, Err(CircuitError::Inner("boom"))));
            }
            assert_eq!(cb.state(), CircuitState::Open);

            let invoked = AtomicU32::new(0);
            let result = cb
                .execute(|| async {
                    invoked.fetch_add(1, Ordering::SeqCst);
                    Ok::<_, &'static str>(())
                })
                .await;
            assert!(result.unwrap_err().is_open());
            assert_eq!(invoked.load(Ordering::SeqCst), 0);
        }
    }

    #[tokio::test]
    async fn test_success_resets_failure_streak() {
        let cb = CircuitBreaker::new("db.insert", config(3, 1));
        fail(&cb).await.unwrap_err();
        fail(&cb).await.unwrap_err();
        succeed(&cb).await.unwrap();
        assert_eq!(cb.status().failure_count, 0);
        fail(&cb).await.unwrap_err();
        fail(&cb).await.unwrap_err();
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_half_open_probe_and_close() {
        let cb = CircuitBreaker::new("db.update", config(2, 2));
        fail(&cb).await.unwrap_err();
        fail(&cb).await.unwrap_err();
        assert_eq!(cb.state(), CircuitState::Open);

        tokio::time::advance(Duration::from_millis(500)).await;
        assert!(fail(&cb).await.unwrap_err().is_open());

        tokio::time::advance(Duration::from_millis(600)).await;
        succeed(&cb).await.unwrap();
        assert_eq!(cb.state(), CircuitState::HalfOpen);
        succeed(&cb).await.unwrap();
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_half_open_failure_reopens_and_discards_progress() {
        let cb = CircuitBreaker::new("db.delete", config(1, 3));
        fail(&cb).await.unwrap_err();
        tokio::time::advance(Duration::from_millis(1_001)).await;

        succeed(&cb).await.unwrap();
        assert_eq!(cb.status().success_count, 1);
        fail(&cb).await.unwrap_err();
        assert_eq!(cb.state(), CircuitState::Open);
        assert_eq!(cb.status().success_count, 0);
    }

    #[tokio::test]
    async fn test_reset_forces_closed() {
        let cb = CircuitBreaker::new("rpc", config(1, 1));
        fail(&cb).await.unwrap_err();
        assert_eq!(cb.state(), CircuitState::Open);

        cb.reset();
        let status = cb.status();
        assert_eq!(status.state, CircuitState::Closed);
        assert_eq!(status.failure_count, 0);
        assert!(status.last_failure_ms.is_none());
        succeed(&cb).await.unwrap();
    }

    #[tokio::test]
    async fn test_status_counts_rejections() {
        let cb = CircuitBreaker::new("rpc", config(1, 1));
        fail(&cb).await.unwrap_err();
        fail(&cb).await.unwrap_err();
        fail(&cb).await.unwrap_err();
        let status = cb.status();
        assert_eq!(status.total_calls, 3);
        assert_eq!(status.total_rejections, 2);
    }
}
