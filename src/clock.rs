//! Wall-clock helpers for timestamps reported to collaborators.
//!
//! Internal timing (TTLs, timeouts, availability) uses the monotonic tokio
//! clock; only values that leave the crate are converted to epoch millis.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Milliseconds since the Unix epoch.
pub(crate) fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// Epoch millis for an instant that happened `ago` before now.
pub(crate) fn unix_millis_ago(ago: Duration) -> u64 {
    unix_millis().saturating_sub(ago.as_millis() as u64)
}
