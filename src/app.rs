//! Composition root.
//!
//! # Responsibilities
//! - Build one instance of every component from `ShieldConfig`
//! - Register configured endpoints and the built-in health checks
//! - Start and stop background tasks through one shutdown handle
//! - Apply hot-reloaded retry/breaker options
//!
//! # Data Flow
//! ```text
//! ShieldConfig
//!     → RetryExecutor (retry + circuit_breaker sections)
//!     → FailoverManager (failover section, endpoints registered)
//!     → QueryPlanCache (cache section)
//!     → HealthOrchestrator (health section) ← probes for the three above
//! start():  endpoint monitor, cache sweeper, health loop
//! stop():   shutdown broadcast → loops exit → handles joined
//! ```

use std::sync::{Arc, Mutex, PoisonError};

use serde::Serialize;
use thiserror::Error;
use tokio::task::JoinHandle;

use crate::cache::{CacheStats, QueryPlanCache};
use crate::config::ShieldConfig;
use crate::failover::{Endpoint, EndpointProbe, FailoverError, FailoverManager, FailoverStatus};
use crate::health::probes::{self, CACHE_SERVICE, FAILOVER_SERVICE, RETRY_SERVICE};
use crate::health::{HealthError, HealthOrchestrator, SystemHealth};
use crate::lifecycle::Shutdown;
use crate::resilience::{CircuitBreakerStatus, RetryExecutor};

/// Plan cache holding JSON-encoded artifacts.
pub type PlanCache = QueryPlanCache<serde_json::Value>;

#[derive(Debug, Error)]
pub enum ShieldError {
    #[error("failover setup failed: {0}")]
    Failover(#[from] FailoverError),

    #[error("health setup failed: {0}")]
    Health(#[from] HealthError),
}

/// Combined status of every component.
#[derive(Debug, Clone, Serialize)]
pub struct ShieldStatus {
    pub health: SystemHealth,
    pub failover: FailoverStatus,
    pub cache: CacheStats,
    pub circuits: Vec<CircuitBreakerStatus>,
}

/// Owns the resilience and caching components.
pub struct Shield {
    retry: Arc<RetryExecutor>,
    failover: Arc<FailoverManager>,
    cache: Arc<PlanCache>,
    health: Arc<HealthOrchestrator>,
    shutdown: Shutdown,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl Shield {
    pub fn new(config: &ShieldConfig) -> Result<Self, ShieldError> {
        Self::build(config, FailoverManager::new(config.failover.clone()))
    }

    /// Build with a custom endpoint probe.
    pub fn with_endpoint_probe(
        config: &ShieldConfig,
        probe: Arc<dyn EndpointProbe>,
    ) -> Result<Self, ShieldError> {
        Self::build(
            config,
            FailoverManager::with_probe(config.failover.clone(), probe),
        )
    }

    fn build(config: &ShieldConfig, failover: FailoverManager) -> Result<Self, ShieldError> {
        for endpoint in &config.failover.endpoints {
            failover.register_endpoint(Endpoint::from(endpoint.clone()))?;
        }

        let shield = Self {
            retry: Arc::new(RetryExecutor::new(
                config.retry.clone(),
                config.circuit_breaker.clone(),
            )),
            failover: Arc::new(failover),
            cache: Arc::new(QueryPlanCache::new(config.cache.clone())),
            health: Arc::new(HealthOrchestrator::new(config.health.clone())),
            shutdown: Shutdown::new(),
            tasks: Mutex::new(Vec::new()),
        };
        shield.register_builtin_probes()?;

        tracing::info!(
            endpoints = config.failover.endpoints.len(),
            cache_max_entries = config.cache.max_entries,
            eviction_policy = %config.cache.eviction_policy,
            "Shield components initialized"
        );
        Ok(shield)
    }

    fn register_builtin_probes(&self) -> Result<(), HealthError> {
        self.health.register_service(
            CACHE_SERVICE,
            "Query plan cache",
            probes::cache_check(self.cache.clone()),
            Vec::new(),
        )?;
        self.health.register_service(
            FAILOVER_SERVICE,
            "Endpoint failover",
            probes::failover_check(self.failover.clone()),
            Vec::new(),
        )?;
        self.health.register_service(
            RETRY_SERVICE,
            "Retry executor",
            probes::retry_check(self.retry.clone()),
            vec![FAILOVER_SERVICE.to_string()],
        )?;
        Ok(())
    }

    pub fn retry(&self) -> &Arc<RetryExecutor> {
        &self.retry
    }

    pub fn failover(&self) -> &Arc<FailoverManager> {
        &self.failover
    }

    pub fn cache(&self) -> &Arc<PlanCache> {
        &self.cache
    }

    pub fn health(&self) -> &Arc<HealthOrchestrator> {
        &self.health
    }

    pub fn shutdown_handle(&self) -> &Shutdown {
        &self.shutdown
    }

    /// Spawn the endpoint monitor, cache sweeper and health loop.
    pub fn start(&self) {
        let mut tasks = self.tasks.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(handle) = self.failover.spawn_monitor(self.shutdown.subscribe()) {
            tasks.push(handle);
        }
        tasks.push(self.cache.spawn_sweeper(self.shutdown.subscribe()));
        if let Some(handle) = self.health.start(self.shutdown.subscribe()) {
            tasks.push(handle);
        }
        tracing::info!(tasks = tasks.len(), "Background tasks started");
    }

    /// Signal every background task and wait for them to exit.
    pub async fn stop(&self) {
        self.shutdown.trigger();
        self.failover.cancel_recovery();

        let handles: Vec<JoinHandle<()>> = self
            .tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain(..)
            .collect();
        for handle in handles {
            if let Err(e) = handle.await {
                tracing::error!(error = %e, "Background task ended abnormally");
            }
        }
        tracing::info!("Background tasks stopped");
    }

    /// Apply a reloaded configuration.
    ///
    /// Retry and breaker options take effect immediately; other sections
    /// need a restart.
    pub fn apply_config(&self, config: &ShieldConfig) {
        self.retry.update_options(config.retry.clone());
        self.retry
            .update_breaker_config(config.circuit_breaker.clone());

        if &config.failover != self.failover.config()
            || &config.cache != self.cache.config()
            || &config.health != self.health.config()
        {
            tracing::warn!("Failover, cache and health changes take effect after restart");
        }
    }

    pub fn status(&self) -> ShieldStatus {
        ShieldStatus {
            health: self.health.get_status(),
            failover: self.failover.get_status(),
            cache: self.cache.stats(),
            circuits: self.retry.all_circuit_breaker_status(),
        }
    }
}
