//! Configuration schema definitions.
//!
//! One option struct per component, each with defaults, so a component can be
//! built from `Default::default()` in code or from a TOML section on disk.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::cache::EvictionPolicy;
use crate::failover::FailoverStrategy;

/// Root configuration.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ShieldConfig {
    /// Per-operation circuit breaker settings.
    pub circuit_breaker: CircuitBreakerConfig,

    /// Retry and backoff settings.
    pub retry: RetryConfig,

    /// Endpoint failover settings.
    pub failover: FailoverConfig,

    /// Query plan cache settings.
    pub cache: CacheConfig,

    /// Health orchestrator settings.
    pub health: HealthConfig,

    /// Logging and metrics settings.
    pub observability: ObservabilityConfig,
}

/// Circuit breaker configuration.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures that open the circuit.
    pub failure_threshold: u32,

    /// Time the circuit stays open before a half-open probe is allowed.
    pub reset_timeout_ms: u64,

    /// Consecutive half-open successes that close the circuit.
    pub close_threshold: u32,
}

impl CircuitBreakerConfig {
    pub fn reset_timeout(&self) -> Duration {
        Duration::from_millis(self.reset_timeout_ms)
    }
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            reset_timeout_ms: 60_000,
            close_threshold: 2,
        }
    }
}

/// Retry configuration.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Total attempts including the first one.
    pub max_attempts: u32,

    /// Delay before the second attempt, in milliseconds.
    pub base_delay_ms: u64,

    /// Growth factor applied per attempt.
    pub backoff_multiplier: f64,

    /// Upper bound for a single delay (before jitter), in milliseconds.
    pub max_delay_ms: u64,

    /// Optional cap on total time spent in one retry loop.
    pub max_execution_time_ms: Option<u64>,
}

impl RetryConfig {
    pub fn max_execution_time(&self) -> Option<Duration> {
        self.max_execution_time_ms.map(Duration::from_millis)
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 1_000,
            backoff_multiplier: 2.0,
            max_delay_ms: 10_000,
            max_execution_time_ms: None,
        }
    }
}

/// How endpoint health is probed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ProbeKind {
    /// HTTP round trip for `http(s)://` addresses, error ratio otherwise.
    #[default]
    Auto,
    /// Always use an HTTP round trip.
    Http,
    /// Use the endpoint's own recent error ratio.
    ErrorRatio,
}

/// Endpoint probe configuration.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ProbeConfig {
    pub kind: ProbeKind,

    /// Path requested by the HTTP probe.
    pub path: String,

    /// HTTP probe timeout in milliseconds.
    pub timeout_ms: u64,

    /// Error ratio above which the error-ratio probe fails.
    pub max_error_ratio: f64,

    /// Outcomes required before the error ratio is trusted.
    pub min_samples: usize,
}

impl ProbeConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            kind: ProbeKind::Auto,
            path: "/health".to_string(),
            timeout_ms: 5_000,
            max_error_ratio: 0.5,
            min_samples: 5,
        }
    }
}

/// A backend endpoint definition.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct EndpointConfig {
    /// Unique endpoint identifier.
    pub id: String,

    /// Display name (defaults to the id).
    #[serde(default)]
    pub name: Option<String>,

    /// Endpoint address (e.g. "https://db-eu.example.com").
    pub address: String,

    /// Failover priority; lower is preferred.
    #[serde(default = "default_priority")]
    pub priority: u32,

    /// Deployment region.
    #[serde(default)]
    pub region: Option<String>,

    /// Default preference; at most one endpoint may be primary.
    #[serde(default)]
    pub primary: bool,
}

fn default_priority() -> u32 {
    100
}

/// Failover manager configuration.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct FailoverConfig {
    /// Run the periodic endpoint monitor.
    pub monitor_enabled: bool,

    /// Errors on the active endpoint that trigger failover.
    pub failure_threshold: u32,

    /// Endpoint health check interval in milliseconds.
    pub health_check_interval_ms: u64,

    /// Wait for in-flight requests on the source endpoint before switching.
    pub graceful_drain: bool,

    /// Upper bound on the drain wait in milliseconds.
    pub graceful_timeout_ms: u64,

    /// Schedule a recovery attempt after failing over.
    pub auto_recovery: bool,

    /// Delay before an automatic recovery attempt in milliseconds.
    pub auto_recovery_delay_ms: u64,

    /// Target selection strategy.
    pub strategy: FailoverStrategy,

    /// Explicit failover order by endpoint id; overrides the strategy.
    pub cascade_order: Vec<String>,

    /// Failover events kept in history.
    pub max_history: usize,

    /// Rolling success ratio that marks a degraded manager healthy again.
    pub recovery_success_ratio: f64,

    /// Endpoint probe settings.
    pub probe: ProbeConfig,

    /// Endpoints registered at startup.
    pub endpoints: Vec<EndpointConfig>,
}

impl FailoverConfig {
    pub fn health_check_interval(&self) -> Duration {
        Duration::from_millis(self.health_check_interval_ms)
    }

    pub fn graceful_timeout(&self) -> Duration {
        Duration::from_millis(self.graceful_timeout_ms)
    }

    pub fn auto_recovery_delay(&self) -> Duration {
        Duration::from_millis(self.auto_recovery_delay_ms)
    }
}

impl Default for FailoverConfig {
    fn default() -> Self {
        Self {
            monitor_enabled: true,
            failure_threshold: 5,
            health_check_interval_ms: 30_000,
            graceful_drain: true,
            graceful_timeout_ms: 5_000,
            auto_recovery: true,
            auto_recovery_delay_ms: 60_000,
            strategy: FailoverStrategy::Priority,
            cascade_order: Vec::new(),
            max_history: 100,
            recovery_success_ratio: 0.8,
            probe: ProbeConfig::default(),
            endpoints: Vec::new(),
        }
    }
}

/// Query plan cache configuration.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Maximum resident entries.
    pub max_entries: usize,

    /// Maximum resident bytes (estimated).
    pub max_size_bytes: usize,

    /// Entry time-to-live in milliseconds.
    pub ttl_ms: u64,

    /// Victim selection under pressure.
    pub eviction_policy: EvictionPolicy,

    /// Share entries between structurally identical queries.
    pub normalize_queries: bool,

    /// Expired-entry sweep interval in milliseconds.
    pub sweep_interval_ms: u64,
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_millis(self.ttl_ms)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.sweep_interval_ms)
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_entries: 1_000,
            max_size_bytes: 50 * 1024 * 1024,
            ttl_ms: 60 * 60 * 1_000,
            eviction_policy: EvictionPolicy::Lru,
            normalize_queries: true,
            sweep_interval_ms: 5 * 60 * 1_000,
        }
    }
}

/// Health orchestrator configuration.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct HealthConfig {
    /// Run periodic health checks.
    pub enabled: bool,

    /// Quick check interval (critical services only) in milliseconds.
    pub check_interval_ms: u64,

    /// Full check interval (all services) in milliseconds.
    pub full_check_interval_ms: u64,

    /// Per-probe timeout in milliseconds.
    pub check_timeout_ms: u64,

    /// Services polled by quick checks and weighted 2x in the overall score.
    pub critical_services: Vec<String>,

    /// Trigger recovery after a full check finds degraded services.
    pub auto_recovery: bool,

    /// Re-checks per degraded service during recovery.
    pub recovery_attempts: u32,

    /// Delay between recovery re-checks in milliseconds.
    pub recovery_delay_ms: u64,

    /// Health events kept in history.
    pub max_history: usize,
}

impl HealthConfig {
    pub fn check_interval(&self) -> Duration {
        Duration::from_millis(self.check_interval_ms)
    }

    pub fn full_check_interval(&self) -> Duration {
        Duration::from_millis(self.full_check_interval_ms)
    }

    pub fn check_timeout(&self) -> Duration {
        Duration::from_millis(self.check_timeout_ms)
    }

    pub fn recovery_delay(&self) -> Duration {
        Duration::from_millis(self.recovery_delay_ms)
    }
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            check_interval_ms: 30_000,
            full_check_interval_ms: 5 * 60 * 1_000,
            check_timeout_ms: 10_000,
            critical_services: vec!["failover".to_string(), "retry".to_string()],
            auto_recovery: true,
            recovery_attempts: 3,
            recovery_delay_ms: 5_000,
            max_history: 100,
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    #[default]
    Plain,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Log output format.
    pub log_format: LogFormat,

    /// Enable the Prometheus endpoint.
    pub metrics_enabled: bool,

    /// Prometheus endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Plain,
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_toml_uses_defaults() {
        let config: ShieldConfig = toml::from_str(
            r#"
            [retry]
            max_attempts = 5

            [[failover.endpoints]]
            id = "primary"
            address = "https://db-eu.example.com"
            primary = true
            "#,
        )
        .unwrap();

        assert_eq!(config.retry.max_attempts, 5);
        assert_eq!(config.retry.base_delay_ms, 1_000);
        assert_eq!(config.failover.endpoints.len(), 1);
        assert_eq!(config.failover.endpoints[0].priority, 100);
        assert!(config.failover.endpoints[0].primary);
        assert_eq!(config.cache.eviction_policy, EvictionPolicy::Lru);
    }

    #[test]
    fn test_enums_parse_from_snake_case() {
        let config: ShieldConfig = toml::from_str(
            r#"
            [cache]
            eviction_policy = "lfu"

            [failover]
            strategy = "lowest_latency"

            [failover.probe]
            kind = "error_ratio"

            [observability]
            log_format = "json"
            "#,
        )
        .unwrap();

        assert_eq!(config.cache.eviction_policy, EvictionPolicy::Lfu);
        assert_eq!(config.failover.strategy, FailoverStrategy::LowestLatency);
        assert_eq!(config.failover.probe.kind, ProbeKind::ErrorRatio);
        assert_eq!(config.observability.log_format, LogFormat::Json);
    }

    #[test]
    fn test_default_config_round_trips_through_toml() {
        let rendered = toml::to_string_pretty(&ShieldConfig::default()).unwrap();
        let parsed: ShieldConfig = toml::from_str(&rendered).unwrap();
        assert_eq!(parsed.cache, CacheConfig::default());
        assert_eq!(parsed.health, HealthConfig::default());
    }
}
