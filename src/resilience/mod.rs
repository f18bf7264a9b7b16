//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Caller operation:
//!     → retries.rs (RetryExecutor::with_retry)
//!         → circuit_breaker.rs (per-operation breaker: allow? record outcome)
//!         → error.rs Classify (retryable or not)
//!         → backoff.rs (delay before the next attempt)
//!     → value, resurfaced operation error, or synthetic circuit-open error
//! ```
//!
//! # Design Decisions
//! - Breakers are created lazily and owned by the executor, one per operation name
//! - Jittered backoff prevents thundering herd
//! - Operation errors are never swallowed: classified, counted, returned

pub mod backoff;
pub mod circuit_breaker;
pub mod retries;

pub use circuit_breaker::{CircuitBreaker, CircuitBreakerStatus, CircuitError, CircuitState};
pub use retries::{RetryError, RetryExecutor};
