//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → ShieldConfig (validated)
//!     → sections handed to each component's constructor
//!
//! On file change:
//!     watcher.rs detects change
//!     → loader.rs loads + validates
//!     → Shield::apply_config swaps live retry/breaker options
//! ```
//!
//! # Design Decisions
//! - Components only take option structs; file handling stays out of the core
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;
pub mod watcher;

pub use loader::{load_config, parse_config, ConfigError};
pub use schema::{
    CacheConfig, CircuitBreakerConfig, EndpointConfig, FailoverConfig, HealthConfig, LogFormat,
    ObservabilityConfig, ProbeConfig, ProbeKind, RetryConfig, ShieldConfig,
};
pub use validation::{validate_config, ValidationError};
