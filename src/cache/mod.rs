//! Query plan caching.
//!
//! # Data Flow
//! ```text
//! get(query, params)
//!     → normalize.rs (fold case/whitespace, wildcard literals and placeholders)
//!     → plan_cache.rs (lookup, TTL check, hit/miss accounting)
//!
//! set(query, params, value)
//!     → size estimate (serialized JSON length + key length)
//!     → policy.rs (pick victims until both budgets fit)
//!     → insert
//! ```

pub mod normalize;
pub mod plan_cache;
pub mod policy;

pub use normalize::normalize_query;
pub use plan_cache::{CacheEntry, CacheEvent, CacheHealth, CacheStats, QueryPlanCache};
pub use policy::EvictionPolicy;
