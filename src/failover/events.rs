//! Failover and recovery events.

use serde::Serialize;
use uuid::Uuid;

use crate::clock::unix_millis;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailoverEventKind {
    FailoverStart,
    FailoverComplete,
    FailoverFailed,
    RecoveryStart,
    RecoveryComplete,
    RecoveryFailed,
}

/// An immutable record of one step of a transition.
#[derive(Debug, Clone, Serialize)]
pub struct FailoverEvent {
    pub id: Uuid,
    /// Epoch millis.
    pub timestamp_ms: u64,
    pub kind: FailoverEventKind,
    pub from_endpoint: Option<String>,
    pub to_endpoint: Option<String>,
    pub reason: String,
    /// Set on completion/failure events.
    pub duration_ms: Option<u64>,
}

impl FailoverEvent {
    pub(crate) fn new(
        kind: FailoverEventKind,
        from_endpoint: Option<&str>,
        to_endpoint: Option<&str>,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp_ms: unix_millis(),
            kind,
            from_endpoint: from_endpoint.map(str::to_string),
            to_endpoint: to_endpoint.map(str::to_string),
            reason: reason.into(),
            duration_ms: None,
        }
    }

    pub(crate) fn with_duration(mut self, duration: std::time::Duration) -> Self {
        self.duration_ms = Some(duration.as_millis() as u64);
        self
    }
}
