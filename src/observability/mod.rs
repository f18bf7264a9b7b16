//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All components produce:
//!     → logging.rs (structured log events via tracing)
//!     → metrics.rs (counters, gauges, histograms)
//!     → history.rs (capped event buffers read by collaborators)
//!     → subscribers.rs (push callbacks with unsubscribe tokens)
//! ```
//!
//! # Design Decisions
//! - Structured logging (JSON optional) for machine parsing
//! - Metrics are cheap facade calls
//! - Read-only accessors are polled; subscriptions are optional push

pub mod history;
pub mod logging;
pub mod metrics;
pub mod subscribers;

pub use history::EventHistory;
pub use subscribers::{SubscriptionId, Subscribers};
