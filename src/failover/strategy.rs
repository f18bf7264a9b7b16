//! Failover target selection.
//!
//! A cascade order, when configured, is consulted first; the strategy only
//! decides among candidates the cascade does not name (or when none of the
//! named ones is viable).

use std::sync::atomic::{AtomicUsize, Ordering};

use crate::failover::endpoint::Endpoint;
use crate::failover::FailoverStrategy;

/// Picks failover targets. Holds the round-robin cursor.
#[derive(Debug, Default)]
pub struct TargetSelector {
    cursor: AtomicUsize,
}

impl TargetSelector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Select a healthy endpoint other than `exclude`.
    ///
    /// `endpoints` must be in registration order.
    pub fn select<'a>(
        &self,
        endpoints: &'a [Endpoint],
        exclude: Option<&str>,
        cascade: &[String],
        strategy: FailoverStrategy,
    ) -> Option<&'a Endpoint> {
        let viable = |e: &&Endpoint| e.is_healthy && Some(e.id.as_str()) != exclude;

        for id in cascade {
            if let Some(endpoint) = endpoints.iter().filter(viable).find(|e| &e.id == id) {
                return Some(endpoint);
            }
        }

        let candidates: Vec<&Endpoint> = endpoints.iter().filter(viable).collect();
        if candidates.is_empty() {
            return None;
        }

        match strategy {
            FailoverStrategy::Priority => candidates.into_iter().min_by_key(|e| rank(e)),
            FailoverStrategy::LowestLatency => candidates
                .into_iter()
                .min_by_key(|e| (e.latency_ms.unwrap_or(u64::MAX), rank(e))),
            FailoverStrategy::RoundRobin => {
                let index = self.cursor.fetch_add(1, Ordering::Relaxed) % candidates.len();
                Some(candidates[index])
            }
        }
    }
}

/// Priority ordering key; `min_by_key` keeps registration order on ties.
fn rank(endpoint: &Endpoint) -> (u32, bool) {
    (endpoint.priority, !endpoint.is_primary)
}
