//! Retry logic.
//!
//! # Responsibilities
//! - Classify operation errors as retryable or not (`Classify`)
//! - Execute retries with exponential backoff + jitter
//! - Keep one circuit breaker per operation name and consult it before every attempt
//!
//! # Design Decisions
//! - A circuit-open rejection never consumes an attempt
//! - `CircuitOpen` only when the breaker rejects the first attempt; a breaker
//!   opening mid-loop ends it as `Exhausted` with the last operation error
//! - Non-retryable errors count one breaker failure and surface immediately
//! - Exhaustion surfaces the last underlying error verbatim
//! - Options can be swapped live; breakers keep their counters

use std::future::Future;
use std::sync::Arc;

use arc_swap::ArcSwap;
use dashmap::DashMap;
use thiserror::Error;
use tokio::time::{sleep, Instant};

use crate::config::{CircuitBreakerConfig, RetryConfig};
use crate::error::Classify;
use crate::observability::metrics;
use crate::resilience::backoff::calculate_backoff;
use crate::resilience::circuit_breaker::{CircuitBreaker, CircuitBreakerStatus, CircuitState};

/// Error returned by `RetryExecutor::with_retry`.
///
/// Apart from `CircuitOpen`, every variant displays as the operation's own error.
#[derive(Debug, Error)]
pub enum RetryError<E> {
    /// The operation's circuit is open; it was not invoked.
    #[error("circuit breaker open for operation '{operation}'")]
    CircuitOpen { operation: String },

    /// The operation failed with an error that retrying cannot fix.
    #[error("{error}")]
    NonRetryable { operation: String, error: E },

    /// Every allowed attempt failed.
    #[error("{error}")]
    Exhausted {
        operation: String,
        attempts: u32,
        error: E,
    },
}

impl<E> RetryError<E> {
    pub fn is_circuit_open(&self) -> bool {
        matches!(self, RetryError::CircuitOpen { .. })
    }

    /// The underlying operation error, if the operation ran.
    pub fn inner(&self) -> Option<&E> {
        match self {
            RetryError::NonRetryable { error, .. } | RetryError::Exhausted { error, .. } => Some(error),
            RetryError::CircuitOpen { .. } => None,
        }
    }

    pub fn into_inner(self) -> Option<E> {
        match self {
            RetryError::NonRetryable { error, .. } | RetryError::Exhausted { error, .. } => Some(error),
            RetryError::CircuitOpen { .. } => None,
        }
    }
}

/// Wraps operations with retry, backoff and per-operation circuit breaking.
pub struct RetryExecutor {
    options: ArcSwap<RetryConfig>,
    breaker_config: ArcSwap<CircuitBreakerConfig>,
    breakers: DashMap<String, Arc<CircuitBreaker>>,
}

impl RetryExecutor {
    pub fn new(options: RetryConfig, breaker_config: CircuitBreakerConfig) -> Self {
        Self {
            options: ArcSwap::from_pointee(options),
            breaker_config: ArcSwap::from_pointee(breaker_config),
            breakers: DashMap::new(),
        }
    }

    pub fn options(&self) -> RetryConfig {
        self.options.load().as_ref().clone()
    }

    /// Swap retry options for future calls.
    pub fn update_options(&self, options: RetryConfig) {
        tracing::info!(
            max_attempts = options.max_attempts,
            base_delay_ms = options.base_delay_ms,
            max_delay_ms = options.max_delay_ms,
            "Retry options updated"
        );
        self.options.store(Arc::new(options));
    }

    /// Swap breaker settings for existing and future breakers.
    pub fn update_breaker_config(&self, config: CircuitBreakerConfig) {
        for breaker in self.breakers.iter() {
            breaker.value().update_config(config.clone());
        }
        self.breaker_config.store(Arc::new(config));
    }

    /// Breaker for `operation_name`, created on first use.
    fn breaker(&self, operation_name: &str) -> Arc<CircuitBreaker> {
        if let Some(existing) = self.breakers.get(operation_name) {
            return existing.value().clone();
        }
        self.breakers
            .entry(operation_name.to_string())
            .or_insert_with(|| {
                tracing::debug!(operation = %operation_name, "Creating circuit breaker");
                Arc::new(CircuitBreaker::new(
                    operation_name,
                    self.breaker_config.load().as_ref().clone(),
                ))
            })
            .value()
            .clone()
    }

    /// Run `operation` with retries under the breaker named `operation_name`.
    pub async fn with_retry<F, Fut, T, E>(
        &self,
        operation_name: &str,
        mut operation: F,
    ) -> Result<T, RetryError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Classify + std::fmt::Display,
    {
        let options = self.options.load_full();
        let breaker = self.breaker(operation_name);
        let max_attempts = options.max_attempts.max(1);
        let deadline = options.max_execution_time().map(|max| Instant::now() + max);
        let mut attempt = 0;

        loop {
            if !breaker.try_acquire() {
                tracing::warn!(operation = %operation_name, "Circuit open, failing fast");
                metrics::record_retry_attempt(operation_name, "rejected");
                return Err(RetryError::CircuitOpen {
                    operation: operation_name.to_string(),
                });
            }

            attempt += 1;
            match operation().await {
                Ok(value) => {
                    breaker.record_success();
                    metrics::record_retry_attempt(operation_name, "success");
                    if attempt > 1 {
                        tracing::info!(operation = %operation_name, attempts = attempt, "Operation succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(error) => {
                    breaker.record_failure();

                    if !error.is_retryable() {
                        metrics::record_retry_attempt(operation_name, "non_retryable");
                        tracing::warn!(operation = %operation_name, attempt, error = %error, "Non-retryable error");
                        return Err(RetryError::NonRetryable {
                            operation: operation_name.to_string(),
                            error,
                        });
                    }

                    let out_of_time = deadline.is_some_and(|d| Instant::now() >= d);
                    // A breaker opened by this failure ends the loop with the real error.
                    let circuit_opened = breaker.state() == CircuitState::Open;
                    if attempt >= max_attempts || out_of_time || circuit_opened {
                        metrics::record_retry_attempt(operation_name, "exhausted");
                        tracing::warn!(
                            operation = %operation_name,
                            attempts = attempt,
                            out_of_time,
                            circuit_opened,
                            error = %error,
                            "Retries exhausted"
                        );
                        return Err(RetryError::Exhausted {
                            operation: operation_name.to_string(),
                            attempts: attempt,
                            error,
                        });
                    }

                    let delay = calculate_backoff(attempt, &options);
                    metrics::record_retry_attempt(operation_name, "retry");
                    tracing::info!(
                        operation = %operation_name,
                        attempt,
                        max_attempts,
                        delay = ?delay,
                        error = %error,
                        "Retrying operation"
                    );
                    sleep(delay).await;
                }
            }
        }
    }

    /// Status of the breaker for `operation_name`, if one was created.
    pub fn circuit_breaker_status(&self, operation_name: &str) -> Option<CircuitBreakerStatus> {
        self.breakers.get(operation_name).map(|b| b.value().status())
    }

    /// Status of every breaker, sorted by name.
    pub fn all_circuit_breaker_status(&self) -> Vec<CircuitBreakerStatus> {
        let mut all: Vec<_> = self.breakers.iter().map(|b| b.value().status()).collect();
        all.sort_by(|a, b| a.name.cmp(&b.name));
        all
    }

    /// Force the breaker for `operation_name` closed. Returns false if unknown.
    pub fn reset_circuit_breaker(&self, operation_name: &str) -> bool {
        match self.breakers.get(operation_name) {
            Some(b) => {
                b.value().reset();
                true
            }
            None => false,
        }
    }

    /// Number of breakers currently open.
    pub fn open_circuits(&self) -> usize {
        self.breakers
            .iter()
            .filter(|b| b.value().state() == CircuitState::Open)
            .count()
    }
}

impl Default for RetryExecutor {
    fn default() -> Self {
        Self::new(RetryConfig::default(), CircuitBreakerConfig::default())
    }
}
