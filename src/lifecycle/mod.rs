//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (app.rs):
//!     Build components → register probes → spawn periodic tasks
//!
//! Shutdown (shutdown.rs):
//!     Signal received → broadcast → periodic loops exit → handles joined
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → trigger graceful shutdown
//! ```
//!
//! # Design Decisions
//! - Every periodic task owns a shutdown receiver; no leaked timers
//! - Periodic passes never overlap (pass.rs)

pub mod pass;
pub mod shutdown;
pub mod signals;

pub use pass::PassGuard;
pub use shutdown::Shutdown;
