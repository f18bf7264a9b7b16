//! Multi-endpoint failover subsystem.
//!
//! # Data Flow
//! ```text
//! Caller reports outcome (report_error / report_success)
//!     → endpoint.rs (counters, rolling outcome window)
//!     → manager.rs (threshold reached on the active endpoint?)
//!         → strategy.rs (pick a target: cascade order, then strategy)
//!         → graceful drain (wait for leases on the source to drop)
//!         → active endpoint switched, events.rs records the transition
//!
//! Monitor tick
//!     → probe.rs (HTTP round trip or error-ratio proxy per endpoint)
//!     → active endpoint failing? → failover
//!     → failed over with auto-recovery? → schedule recovery timer
//! ```
//!
//! # Design Decisions
//! - The manager owns the endpoint table; callers only see snapshots
//! - Unhealthy endpoints are excluded from selection until a probe passes
//! - Only one transition (failover or recovery) runs at a time

pub mod endpoint;
pub mod events;
pub mod manager;
pub mod probe;
pub mod strategy;

use serde::{Deserialize, Serialize};

pub use endpoint::{Endpoint, EndpointLease};
pub use events::{FailoverEvent, FailoverEventKind};
pub use manager::{FailoverError, FailoverManager, FailoverState, FailoverStatus};
pub use probe::{AutoProbe, EndpointProbe, ErrorRatioProbe, HttpProbe, ProbeError};

/// How a failover target is chosen among healthy candidates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum FailoverStrategy {
    /// Lowest priority number; ties go to the primary, then registration order.
    #[default]
    Priority,
    /// Lowest last observed latency.
    LowestLatency,
    /// Rotate through healthy candidates.
    RoundRobin,
}

impl std::fmt::Display for FailoverStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Priority => write!(f, "priority"),
            Self::LowestLatency => write!(f, "lowest_latency"),
            Self::RoundRobin => write!(f, "round_robin"),
        }
    }
}
