//! Resilience and caching core for remote backend access.

pub mod app;
pub mod cache;
mod clock;
pub mod config;
pub mod error;
pub mod failover;
pub mod health;
pub mod lifecycle;
pub mod observability;
pub mod resilience;

pub use app::{PlanCache, Shield, ShieldError, ShieldStatus};
pub use config::ShieldConfig;
pub use error::{BackendError, Classify};
pub use lifecycle::Shutdown;
