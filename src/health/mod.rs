//! Health orchestration subsystem.
//!
//! # Data Flow
//! ```text
//! Quick tick (critical services) / full tick (all services)
//!     → orchestrator.rs runs each registered check (timeout + panic isolation)
//!     → level change? → HealthEvent to history and subscribers
//!     → aggregate: worst level, weighted score
//!     → degraded services after a full check? → recovery pass
//!
//! probes.rs adapts the cache, failover manager and retry executor into checks.
//! ```
//!
//! # Design Decisions
//! - The orchestrator owns registrations only; checks read the services' own state
//! - A failing, hanging or panicking check yields `unavailable`, never aborts a pass

pub mod orchestrator;
pub mod probes;

use serde::Serialize;

pub use orchestrator::{
    HealthError, HealthEvent, HealthEventKind, HealthOrchestrator, RecoveryReport, SystemHealth,
};

/// Service health level, ordered worst to best.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthLevel {
    Unavailable,
    Critical,
    Degraded,
    Healthy,
    Optimal,
}

impl HealthLevel {
    /// Healthy or better.
    pub fn is_ok(self) -> bool {
        self >= HealthLevel::Healthy
    }

    /// Levels a recovery pass re-checks.
    pub fn needs_recovery(self) -> bool {
        matches!(self, HealthLevel::Degraded | HealthLevel::Critical)
    }

    /// Score used when a check reports a level without its own score.
    pub fn default_score(self) -> u8 {
        match self {
            HealthLevel::Optimal => 100,
            HealthLevel::Healthy => 85,
            HealthLevel::Degraded => 60,
            HealthLevel::Critical => 30,
            HealthLevel::Unavailable => 0,
        }
    }
}

impl std::fmt::Display for HealthLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            HealthLevel::Unavailable => "unavailable",
            HealthLevel::Critical => "critical",
            HealthLevel::Degraded => "degraded",
            HealthLevel::Healthy => "healthy",
            HealthLevel::Optimal => "optimal",
        };
        f.write_str(s)
    }
}

/// What a health check returns.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HealthReport {
    pub level: HealthLevel,
    /// 0-100.
    pub score: u8,
    pub message: String,
    pub details: serde_json::Value,
}

impl HealthReport {
    pub fn new(level: HealthLevel, score: u8, message: impl Into<String>) -> Self {
        Self {
            level,
            score: score.min(100),
            message: message.into(),
            details: serde_json::Value::Null,
        }
    }

    /// A report scored with the level's default score.
    pub fn from_level(level: HealthLevel, message: impl Into<String>) -> Self {
        Self::new(level, level.default_score(), message)
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = details;
        self
    }
}

/// Last known health of a registered service.
#[derive(Debug, Clone, Serialize)]
pub struct ServiceHealth {
    pub id: String,
    pub name: String,
    pub level: HealthLevel,
    pub score: u8,
    /// Epoch millis.
    pub last_check_ms: u64,
    pub check_duration_ms: u64,
    pub message: String,
    pub dependencies: Vec<String>,
    pub details: serde_json::Value,
}
