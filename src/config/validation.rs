//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Check referential integrity (cascade order references known endpoints)
//! - Validate value ranges (thresholds ≥ 1, intervals > 0)
//!
//! # Design Decisions
//! - Returns all validation errors, not just the first
//! - Pure function: ShieldConfig → Result<(), Vec<ValidationError>>

use std::collections::HashSet;
use std::net::SocketAddr;

use thiserror::Error;

use crate::config::schema::ShieldConfig;

/// A single semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{field}: {message}")]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Validate a configuration, collecting every error.
pub fn validate_config(config: &ShieldConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    let cb = &config.circuit_breaker;
    if cb.failure_threshold == 0 {
        errors.push(ValidationError::new("circuit_breaker.failure_threshold", "must be at least 1"));
    }
    if cb.close_threshold == 0 {
        errors.push(ValidationError::new("circuit_breaker.close_threshold", "must be at least 1"));
    }

    let retry = &config.retry;
    if retry.max_attempts == 0 {
        errors.push(ValidationError::new("retry.max_attempts", "must be at least 1"));
    }
    if !(retry.backoff_multiplier >= 1.0) {
        errors.push(ValidationError::new("retry.backoff_multiplier", "must be >= 1.0"));
    }
    if retry.max_delay_ms < retry.base_delay_ms {
        errors.push(ValidationError::new("retry.max_delay_ms", "must be >= retry.base_delay_ms"));
    }

    let failover = &config.failover;
    if failover.failure_threshold == 0 {
        errors.push(ValidationError::new("failover.failure_threshold", "must be at least 1"));
    }
    if failover.health_check_interval_ms == 0 {
        errors.push(ValidationError::new("failover.health_check_interval_ms", "must be > 0"));
    }
    if !(0.0..=1.0).contains(&failover.recovery_success_ratio) {
        errors.push(ValidationError::new("failover.recovery_success_ratio", "must be within 0.0..=1.0"));
    }
    if !(0.0..=1.0).contains(&failover.probe.max_error_ratio) {
        errors.push(ValidationError::new("failover.probe.max_error_ratio", "must be within 0.0..=1.0"));
    }

    let mut ids = HashSet::new();
    let mut primaries = 0;
    for (i, endpoint) in failover.endpoints.iter().enumerate() {
        if endpoint.id.trim().is_empty() {
            errors.push(ValidationError::new(format!("failover.endpoints[{i}].id"), "must not be empty"));
        } else if !ids.insert(endpoint.id.as_str()) {
            errors.push(ValidationError::new(
                format!("failover.endpoints[{i}].id"),
                format!("duplicate endpoint id '{}'", endpoint.id),
            ));
        }
        if endpoint.address.trim().is_empty() {
            errors.push(ValidationError::new(format!("failover.endpoints[{i}].address"), "must not be empty"));
        } else if endpoint.address.contains("://") && url::Url::parse(&endpoint.address).is_err() {
            errors.push(ValidationError::new(
                format!("failover.endpoints[{i}].address"),
                format!("invalid URL '{}'", endpoint.address),
            ));
        }
        if endpoint.primary {
            primaries += 1;
        }
    }
    if primaries > 1 {
        errors.push(ValidationError::new("failover.endpoints", "at most one endpoint may be primary"));
    }
    for id in &failover.cascade_order {
        if !ids.contains(id.as_str()) {
            errors.push(ValidationError::new(
                "failover.cascade_order",
                format!("unknown endpoint id '{id}'"),
            ));
        }
    }

    let cache = &config.cache;
    if cache.max_entries == 0 {
        errors.push(ValidationError::new("cache.max_entries", "must be at least 1"));
    }
    if cache.max_size_bytes == 0 {
        errors.push(ValidationError::new("cache.max_size_bytes", "must be > 0"));
    }
    if cache.ttl_ms == 0 {
        errors.push(ValidationError::new("cache.ttl_ms", "must be > 0"));
    }
    if cache.sweep_interval_ms == 0 {
        errors.push(ValidationError::new("cache.sweep_interval_ms", "must be > 0"));
    }

    let health = &config.health;
    if health.check_interval_ms == 0 {
        errors.push(ValidationError::new("health.check_interval_ms", "must be > 0"));
    }
    if health.full_check_interval_ms == 0 {
        errors.push(ValidationError::new("health.full_check_interval_ms", "must be > 0"));
    }
    if health.check_timeout_ms == 0 {
        errors.push(ValidationError::new("health.check_timeout_ms", "must be > 0"));
    }

    let obs = &config.observability;
    if obs.metrics_enabled && obs.metrics_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "observability.metrics_address",
            format!("invalid socket address '{}'", obs.metrics_address),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
