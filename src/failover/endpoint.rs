//! Backend endpoint abstraction.
//!
//! # Responsibilities
//! - Represent a single backend endpoint and its health counters
//! - Track in-flight requests (for graceful drain during failover)
//! - Keep a short rolling window of outcomes for success-ratio decisions

use std::collections::VecDeque;
use std::ops::Deref;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;

use crate::config::EndpointConfig;

/// Outcomes kept in the rolling window.
const OUTCOME_WINDOW: usize = 20;

/// A single backend endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct Endpoint {
    pub id: String,
    pub name: String,
    pub address: String,
    /// Failover priority; lower is preferred.
    pub priority: u32,
    pub region: Option<String>,
    pub is_primary: bool,
    /// Eligible as a failover target.
    pub is_healthy: bool,
    /// Epoch millis of the last probe.
    pub last_health_check: Option<u64>,
    /// Last observed latency in milliseconds.
    pub latency_ms: Option<u64>,
    pub error_count: u32,
    pub success_count: u64,

    #[serde(skip)]
    in_flight: Arc<AtomicUsize>,
    #[serde(skip)]
    outcomes: VecDeque<bool>,
}

impl Endpoint {
    pub fn new(id: impl Into<String>, address: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            address: address.into(),
            priority: 100,
            region: None,
            is_primary: false,
            is_healthy: true,
            last_health_check: None,
            latency_ms: None,
            error_count: 0,
            success_count: 0,
            in_flight: Arc::new(AtomicUsize::new(0)),
            outcomes: VecDeque::with_capacity(OUTCOME_WINDOW),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_priority(mut self, priority: u32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = Some(region.into());
        self
    }

    /// Mark this endpoint as the default preference.
    pub fn primary(mut self) -> Self {
        self.is_primary = true;
        self
    }

    /// Requests currently leased against this endpoint.
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::Relaxed)
    }

    pub(crate) fn in_flight_counter(&self) -> Arc<AtomicUsize> {
        self.in_flight.clone()
    }

    pub(crate) fn record_outcome(&mut self, success: bool) {
        if self.outcomes.len() == OUTCOME_WINDOW {
            self.outcomes.pop_front();
        }
        self.outcomes.push_back(success);
    }

    /// Start a fresh outcome window, e.g. once traffic moved away.
    pub(crate) fn clear_outcomes(&mut self) {
        self.outcomes.clear();
    }

    pub(crate) fn record_latency(&mut self, latency: Duration) {
        self.latency_ms = Some(latency.as_millis() as u64);
    }

    /// Outcomes in the rolling window.
    pub fn sample_count(&self) -> usize {
        self.outcomes.len()
    }

    /// Success ratio over the rolling window (1.0 with no samples).
    pub fn success_ratio(&self) -> f64 {
        if self.outcomes.is_empty() {
            return 1.0;
        }
        let ok = self.outcomes.iter().filter(|o| **o).count();
        ok as f64 / self.outcomes.len() as f64
    }

    pub fn error_ratio(&self) -> f64 {
        1.0 - self.success_ratio()
    }

    /// True for addresses the HTTP probe can reach.
    pub fn is_http(&self) -> bool {
        self.address.starts_with("http://") || self.address.starts_with("https://")
    }
}

impl From<EndpointConfig> for Endpoint {
    fn from(config: EndpointConfig) -> Self {
        let mut endpoint = Endpoint::new(config.id, config.address).with_priority(config.priority);
        if let Some(name) = config.name {
            endpoint.name = name;
        }
        endpoint.region = config.region;
        endpoint.is_primary = config.primary;
        endpoint
    }
}

/// A lease on the active endpoint; the in-flight count drops with it.
#[derive(Debug)]
pub struct EndpointLease {
    endpoint_id: String,
    address: String,
    counter: Arc<AtomicUsize>,
}

impl EndpointLease {
    pub(crate) fn new(endpoint: &Endpoint) -> Self {
        let counter = endpoint.in_flight_counter();
        counter.fetch_add(1, Ordering::Relaxed);
        Self {
            endpoint_id: endpoint.id.clone(),
            address: endpoint.address.clone(),
            counter,
        }
    }

    pub fn endpoint_id(&self) -> &str {
        &self.endpoint_id
    }
}

impl Deref for EndpointLease {
    type Target = str;

    /// The leased endpoint's address.
    fn deref(&self) -> &Self::Target {
        &self.address
    }
}

impl Drop for EndpointLease {
    fn drop(&mut self) {
        self.counter.fetch_sub(1, Ordering::Relaxed);
    }
}
