//! Failover manager.
//!
//! # States
//! ```text
//! Healthy → Degraded:      active endpoint's error count reaches half the threshold
//! Degraded → Healthy:      rolling success ratio recovers
//! * → FailingOver:         threshold reached, probe failed, or manual trigger
//! FailingOver → FailedOver: switched to a non-primary target
//! FailingOver → Healthy:    switched to the primary
//! FailingOver → Unavailable: no viable target
//! FailedOver → Recovering → Healthy: primary probe passed, switched back
//! ```
//!
//! # Design Decisions
//! - Exactly one active endpoint; callers lease it with `acquire`
//! - Failover and recovery share one in-progress flag, so they never overlap
//! - Graceful drain waits for the source's leases, bounded by a timeout;
//!   on timeout the switch proceeds anyway
//! - The endpoint table lock is never held across a probe or a drain wait

use std::fmt::Display;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant};

use crate::clock::unix_millis;
use crate::config::FailoverConfig;
use crate::failover::endpoint::{Endpoint, EndpointLease};
use crate::failover::events::{FailoverEvent, FailoverEventKind};
use crate::failover::probe::{self, EndpointProbe};
use crate::failover::strategy::TargetSelector;
use crate::lifecycle::PassGuard;
use crate::observability::{metrics, EventHistory};

/// Poll interval while waiting for in-flight requests to drain.
const DRAIN_POLL: Duration = Duration::from_millis(50);

/// Manager-level state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailoverState {
    Healthy,
    Degraded,
    FailingOver,
    FailedOver,
    Recovering,
    Unavailable,
}

impl FailoverState {
    /// States that count as healthy time for `FailoverStatus::availability`.
    ///
    /// Only `Healthy` and `FailedOver` count: the active endpoint is serving
    /// without a known problem. Degraded, transitional and unavailable time
    /// does not.
    pub fn is_available(self) -> bool {
        matches!(self, Self::Healthy | Self::FailedOver)
    }
}

impl std::fmt::Display for FailoverState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Healthy => "healthy",
            Self::Degraded => "degraded",
            Self::FailingOver => "failing_over",
            Self::FailedOver => "failed_over",
            Self::Recovering => "recovering",
            Self::Unavailable => "unavailable",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FailoverError {
    #[error("unknown endpoint '{0}'")]
    UnknownEndpoint(String),

    #[error("endpoint '{0}' is already registered")]
    DuplicateEndpoint(String),

    #[error("endpoint '{existing}' is already the primary")]
    DuplicatePrimary { existing: String },

    #[error("endpoint '{0}' is active and cannot be unregistered")]
    ActiveEndpoint(String),

    #[error("no healthy failover target available")]
    NoHealthyTarget,

    #[error("a failover or recovery is already in progress")]
    InProgress,

    #[error("no active endpoint")]
    NoActiveEndpoint,

    #[error("all endpoints are unavailable")]
    Unavailable,
}

/// Point-in-time view of the manager.
#[derive(Debug, Clone, Serialize)]
pub struct FailoverStatus {
    pub state: FailoverState,
    pub active_endpoint: Option<String>,
    pub total_endpoints: usize,
    pub healthy_endpoints: usize,
    pub total_failovers: u64,
    pub total_recoveries: u64,
    /// Epoch millis of the last completed failover.
    pub last_failover_ms: Option<u64>,
    /// Fraction of elapsed time spent in an available state.
    pub availability: f64,
    pub uptime_ms: u64,
}

/// Accumulates time spent in available states.
#[derive(Debug)]
struct AvailabilityClock {
    started: Instant,
    since: Instant,
    available: Duration,
}

impl AvailabilityClock {
    fn new() -> Self {
        let now = Instant::now();
        Self {
            started: now,
            since: now,
            available: Duration::ZERO,
        }
    }

    fn leave(&mut self, state: FailoverState) {
        let now = Instant::now();
        if state.is_available() {
            self.available += now - self.since;
        }
        self.since = now;
    }

    fn ratio(&self, current: FailoverState) -> f64 {
        let now = Instant::now();
        let total = now - self.started;
        if total.is_zero() {
            return if current.is_available() { 1.0 } else { 0.0 };
        }
        let mut available = self.available;
        if current.is_available() {
            available += now - self.since;
        }
        available.as_secs_f64() / total.as_secs_f64()
    }
}

struct ManagerState {
    /// Registration order.
    endpoints: Vec<Endpoint>,
    active: Option<String>,
    state: FailoverState,
    total_failovers: u64,
    total_recoveries: u64,
    last_failover_ms: Option<u64>,
    clock: AvailabilityClock,
}

impl ManagerState {
    fn endpoint(&self, id: &str) -> Option<&Endpoint> {
        self.endpoints.iter().find(|e| e.id == id)
    }

    fn endpoint_mut(&mut self, id: &str) -> Option<&mut Endpoint> {
        self.endpoints.iter_mut().find(|e| e.id == id)
    }

    fn is_active(&self, id: &str) -> bool {
        self.active.as_deref() == Some(id)
    }

    /// Move to `next`, returning the previous state.
    fn set_state(&mut self, next: FailoverState) -> FailoverState {
        let previous = self.state;
        if previous != next {
            self.clock.leave(previous);
            self.state = next;
            tracing::debug!(from = %previous, to = %next, "Failover manager state changed");
        }
        previous
    }

    fn drain_counter(&self, id: Option<&str>) -> Option<Arc<AtomicUsize>> {
        id.and_then(|id| self.endpoint(id))
            .map(Endpoint::in_flight_counter)
    }
}

/// Tracks endpoints and switches the active one.
pub struct FailoverManager {
    config: FailoverConfig,
    probe: Arc<dyn EndpointProbe>,
    selector: TargetSelector,
    inner: Mutex<ManagerState>,
    history: EventHistory<FailoverEvent>,
    transitioning: AtomicBool,
    monitoring: AtomicBool,
    recovery_timer: Mutex<Option<JoinHandle<()>>>,
}

impl FailoverManager {
    /// Create a manager using the probe described by `config.probe`.
    pub fn new(config: FailoverConfig) -> Self {
        let probe = probe::from_config(&config.probe);
        Self::with_probe(config, probe)
    }

    pub fn with_probe(config: FailoverConfig, probe: Arc<dyn EndpointProbe>) -> Self {
        Self {
            history: EventHistory::new(config.max_history),
            config,
            probe,
            selector: TargetSelector::new(),
            inner: Mutex::new(ManagerState {
                endpoints: Vec::new(),
                active: None,
                state: FailoverState::Healthy,
                total_failovers: 0,
                total_recoveries: 0,
                last_failover_ms: None,
                clock: AvailabilityClock::new(),
            }),
            transitioning: AtomicBool::new(false),
            monitoring: AtomicBool::new(false),
            recovery_timer: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &FailoverConfig {
        &self.config
    }

    fn lock(&self) -> MutexGuard<'_, ManagerState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Add an endpoint.
    ///
    /// The primary becomes active unless another primary already is; any
    /// endpoint becomes active when none is.
    pub fn register_endpoint(&self, endpoint: Endpoint) -> Result<(), FailoverError> {
        let mut inner = self.lock();
        if inner.endpoint(&endpoint.id).is_some() {
            return Err(FailoverError::DuplicateEndpoint(endpoint.id));
        }
        if endpoint.is_primary {
            if let Some(existing) = inner.endpoints.iter().find(|e| e.is_primary) {
                return Err(FailoverError::DuplicatePrimary {
                    existing: existing.id.clone(),
                });
            }
        }

        let becomes_active = match inner.active.as_deref() {
            None => true,
            Some(active) => {
                endpoint.is_primary
                    && inner.state == FailoverState::Healthy
                    && !inner.endpoint(active).is_some_and(|e| e.is_primary)
            }
        };

        tracing::info!(
            endpoint = %endpoint.id,
            address = %endpoint.address,
            priority = endpoint.priority,
            primary = endpoint.is_primary,
            active = becomes_active,
            "Endpoint registered"
        );

        if becomes_active {
            inner.active = Some(endpoint.id.clone());
        }
        inner.endpoints.push(endpoint);
        Ok(())
    }

    /// Remove an endpoint. The active endpoint cannot be removed.
    pub fn unregister_endpoint(&self, endpoint_id: &str) -> Result<Endpoint, FailoverError> {
        let mut inner = self.lock();
        if inner.is_active(endpoint_id) {
            return Err(FailoverError::ActiveEndpoint(endpoint_id.to_string()));
        }
        let index = inner
            .endpoints
            .iter()
            .position(|e| e.id == endpoint_id)
            .ok_or_else(|| FailoverError::UnknownEndpoint(endpoint_id.to_string()))?;
        tracing::info!(endpoint = %endpoint_id, "Endpoint unregistered");
        Ok(inner.endpoints.remove(index))
    }

    /// Record a failed call against an endpoint.
    ///
    /// Reaching the failure threshold on the active endpoint triggers a
    /// failover; a failover already in progress is not an error here.
    pub async fn report_error<E>(&self, endpoint_id: &str, error: E) -> Result<(), FailoverError>
    where
        E: Display + Send,
    {
        let threshold = self.config.failure_threshold.max(1);
        let should_failover = {
            let mut inner = self.lock();
            let is_active = inner.is_active(endpoint_id);
            let endpoint = inner
                .endpoint_mut(endpoint_id)
                .ok_or_else(|| FailoverError::UnknownEndpoint(endpoint_id.to_string()))?;
            endpoint.error_count = endpoint.error_count.saturating_add(1);
            endpoint.record_outcome(false);
            let error_count = endpoint.error_count;

            tracing::warn!(
                endpoint = %endpoint_id,
                error_count,
                error = %error,
                "Endpoint reported an error"
            );

            if !is_active {
                false
            } else if error_count >= threshold {
                true
            } else {
                if error_count >= threshold.div_ceil(2) && inner.state == FailoverState::Healthy {
                    inner.set_state(FailoverState::Degraded);
                    tracing::warn!(endpoint = %endpoint_id, error_count, "Active endpoint degraded");
                }
                false
            }
        };

        if should_failover {
            let reason = format!("error threshold reached: {error}");
            match self.trigger_failover(Some(endpoint_id), &reason).await {
                Ok(_) | Err(FailoverError::InProgress) => {}
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    /// Record a successful call and its latency.
    pub fn report_success(&self, endpoint_id: &str, latency: Duration) -> Result<(), FailoverError> {
        let mut inner = self.lock();
        let is_active = inner.is_active(endpoint_id);
        let endpoint = inner
            .endpoint_mut(endpoint_id)
            .ok_or_else(|| FailoverError::UnknownEndpoint(endpoint_id.to_string()))?;
        endpoint.success_count += 1;
        endpoint.error_count = endpoint.error_count.saturating_sub(1);
        endpoint.record_latency(latency);
        endpoint.record_outcome(true);
        let ratio = endpoint.success_ratio();

        if is_active {
            metrics::record_endpoint_latency(endpoint_id, latency);
            let recovering = matches!(
                inner.state,
                FailoverState::Degraded | FailoverState::Recovering
            );
            if recovering && ratio >= self.config.recovery_success_ratio {
                inner.set_state(FailoverState::Healthy);
                tracing::info!(endpoint = %endpoint_id, success_ratio = ratio, "Active endpoint healthy again");
            }
        }
        Ok(())
    }

    /// Switch the active endpoint away from `from` (default: the active one).
    ///
    /// Returns the id of the new active endpoint.
    pub async fn trigger_failover(
        &self,
        from: Option<&str>,
        reason: &str,
    ) -> Result<String, FailoverError> {
        let Some(_transition) = PassGuard::enter(&self.transitioning) else {
            return Err(FailoverError::InProgress);
        };
        let started = Instant::now();

        let (source, target, drain) = {
            let mut inner = self.lock();
            let source = match from {
                Some(id) if inner.endpoint(id).is_none() => {
                    return Err(FailoverError::UnknownEndpoint(id.to_string()));
                }
                Some(id) => Some(id.to_string()),
                None => inner.active.clone(),
            };

            inner.set_state(FailoverState::FailingOver);
            self.history.push(FailoverEvent::new(
                FailoverEventKind::FailoverStart,
                source.as_deref(),
                None,
                reason,
            ));
            tracing::warn!(from = ?source, reason, "Failover started");

            // The source gets no traffic after the switch, so its outcome
            // window is restarted for the error-ratio probe to judge afresh.
            if let Some(endpoint) = source.as_deref().and_then(|id| inner.endpoint_mut(id)) {
                endpoint.is_healthy = false;
                endpoint.clear_outcomes();
            }

            let target = self
                .selector
                .select(
                    &inner.endpoints,
                    source.as_deref(),
                    &self.config.cascade_order,
                    self.config.strategy,
                )
                .map(|e| e.id.clone());

            let Some(target) = target else {
                inner.set_state(FailoverState::Unavailable);
                self.history.push(
                    FailoverEvent::new(
                        FailoverEventKind::FailoverFailed,
                        source.as_deref(),
                        None,
                        "no healthy failover target",
                    )
                    .with_duration(started.elapsed()),
                );
                metrics::record_failover("failed");
                tracing::error!(from = ?source, "Failover failed: no healthy target");
                return Err(FailoverError::NoHealthyTarget);
            };

            let drain = inner.drain_counter(source.as_deref());
            (source, target, drain)
        };

        if self.config.graceful_drain {
            if let Some(counter) = drain {
                self.drain(&counter).await;
            }
        }

        let mut inner = self.lock();
        let Some(endpoint) = inner.endpoint_mut(&target) else {
            inner.set_state(FailoverState::Unavailable);
            self.history.push(
                FailoverEvent::new(
                    FailoverEventKind::FailoverFailed,
                    source.as_deref(),
                    Some(&target),
                    "target unregistered during drain",
                )
                .with_duration(started.elapsed()),
            );
            metrics::record_failover("failed");
            return Err(FailoverError::NoHealthyTarget);
        };
        endpoint.error_count = 0;
        let to_primary = endpoint.is_primary;

        inner.active = Some(target.clone());
        inner.set_state(if to_primary {
            FailoverState::Healthy
        } else {
            FailoverState::FailedOver
        });
        inner.total_failovers += 1;
        inner.last_failover_ms = Some(unix_millis());

        let elapsed = started.elapsed();
        self.history.push(
            FailoverEvent::new(
                FailoverEventKind::FailoverComplete,
                source.as_deref(),
                Some(&target),
                reason,
            )
            .with_duration(elapsed),
        );
        metrics::record_failover("completed");
        tracing::info!(
            from = ?source,
            to = %target,
            duration_ms = elapsed.as_millis() as u64,
            "Failover complete"
        );
        Ok(target)
    }

    /// Switch back to the primary if it is not active and its probe passes.
    ///
    /// Returns true if the primary is active afterwards because of this call.
    pub async fn attempt_recovery(&self) -> Result<bool, FailoverError> {
        let Some(_transition) = PassGuard::enter(&self.transitioning) else {
            return Err(FailoverError::InProgress);
        };
        let started = Instant::now();

        let (primary, previous, from) = {
            let mut inner = self.lock();
            let Some(primary) = inner.endpoints.iter().find(|e| e.is_primary).cloned() else {
                return Ok(false);
            };
            if inner.is_active(&primary.id) {
                return Ok(false);
            }
            let previous = inner.set_state(FailoverState::Recovering);
            let from = inner.active.clone();
            self.history.push(FailoverEvent::new(
                FailoverEventKind::RecoveryStart,
                from.as_deref(),
                Some(&primary.id),
                "attempting recovery to primary",
            ));
            (primary, previous, from)
        };

        match self.probe.probe(&primary).await {
            Ok(latency) => {
                let mut inner = self.lock();
                if let Some(endpoint) = inner.endpoint_mut(&primary.id) {
                    endpoint.is_healthy = true;
                    endpoint.last_health_check = Some(unix_millis());
                    endpoint.record_latency(latency);
                }
            }
            Err(e) => {
                let mut inner = self.lock();
                if let Some(endpoint) = inner.endpoint_mut(&primary.id) {
                    endpoint.is_healthy = false;
                    endpoint.last_health_check = Some(unix_millis());
                }
                inner.set_state(previous);
                self.history.push(
                    FailoverEvent::new(
                        FailoverEventKind::RecoveryFailed,
                        from.as_deref(),
                        Some(&primary.id),
                        e.to_string(),
                    )
                    .with_duration(started.elapsed()),
                );
                metrics::record_failover("recovery_failed");
                tracing::warn!(primary = %primary.id, error = %e, "Recovery aborted: primary still failing");
                return Ok(false);
            }
        }

        if self.config.graceful_drain {
            let drain = self.lock().drain_counter(from.as_deref());
            if let Some(counter) = drain {
                self.drain(&counter).await;
            }
        }

        let mut inner = self.lock();
        let Some(endpoint) = inner.endpoint_mut(&primary.id) else {
            inner.set_state(previous);
            self.history.push(
                FailoverEvent::new(
                    FailoverEventKind::RecoveryFailed,
                    from.as_deref(),
                    Some(&primary.id),
                    "primary unregistered during recovery",
                )
                .with_duration(started.elapsed()),
            );
            metrics::record_failover("recovery_failed");
            return Ok(false);
        };
        endpoint.error_count = 0;

        inner.active = Some(primary.id.clone());
        inner.set_state(FailoverState::Healthy);
        inner.total_recoveries += 1;

        let elapsed = started.elapsed();
        self.history.push(
            FailoverEvent::new(
                FailoverEventKind::RecoveryComplete,
                from.as_deref(),
                Some(&primary.id),
                "primary healthy",
            )
            .with_duration(elapsed),
        );
        metrics::record_failover("recovered");
        tracing::info!(
            from = ?from,
            to = %primary.id,
            duration_ms = elapsed.as_millis() as u64,
            "Recovered to primary endpoint"
        );
        Ok(true)
    }

    /// Wait until the counter reaches zero or the graceful timeout elapses.
    async fn drain(&self, in_flight: &AtomicUsize) {
        let wait = async {
            while in_flight.load(Ordering::Relaxed) > 0 {
                time::sleep(DRAIN_POLL).await;
            }
        };
        if time::timeout(self.config.graceful_timeout(), wait).await.is_err() {
            tracing::warn!(
                in_flight = in_flight.load(Ordering::Relaxed),
                timeout_ms = self.config.graceful_timeout_ms,
                "Graceful drain timed out, switching anyway"
            );
        }
    }

    /// Probe every endpoint once.
    ///
    /// A failing active endpoint triggers failover. Overlapping passes are
    /// skipped.
    pub async fn check_all_endpoints(&self) {
        let Some(_pass) = PassGuard::enter(&self.monitoring) else {
            tracing::debug!("Endpoint check already running, skipping");
            return;
        };

        let mut active_failed = false;
        let mut active_passed = false;

        for endpoint in self.endpoints() {
            let result = self.probe.probe(&endpoint).await;

            let mut inner = self.lock();
            let is_active = inner.is_active(&endpoint.id);
            let Some(current) = inner.endpoint_mut(&endpoint.id) else {
                continue;
            };
            current.last_health_check = Some(unix_millis());

            match result {
                Ok(latency) => {
                    if !current.is_healthy {
                        tracing::info!(endpoint = %endpoint.id, "Endpoint passed health check");
                    }
                    current.is_healthy = true;
                    current.record_latency(latency);
                    active_passed |= is_active;
                }
                Err(e) => {
                    if current.is_healthy {
                        tracing::warn!(endpoint = %endpoint.id, error = %e, "Endpoint failed health check");
                    }
                    current.is_healthy = false;
                    active_failed |= is_active;
                }
            }
        }

        if active_failed {
            let active = self.lock().active.clone();
            if let Some(active) = active {
                match self
                    .trigger_failover(Some(&active), "active endpoint failed health check")
                    .await
                {
                    Ok(_) | Err(FailoverError::InProgress) => {}
                    Err(e) => tracing::error!(error = %e, "Failover after health check failed"),
                }
            }
        } else if active_passed {
            let mut inner = self.lock();
            if inner.state == FailoverState::Unavailable {
                let on_primary = inner
                    .active
                    .as_deref()
                    .and_then(|id| inner.endpoint(id))
                    .is_some_and(|e| e.is_primary);
                inner.set_state(if on_primary {
                    FailoverState::Healthy
                } else {
                    FailoverState::FailedOver
                });
                tracing::info!("Active endpoint reachable again");
            }
        }
    }

    /// Start the periodic endpoint monitor.
    ///
    /// Returns `None` when the monitor is disabled.
    pub fn spawn_monitor(
        self: &Arc<Self>,
        shutdown: broadcast::Receiver<()>,
    ) -> Option<JoinHandle<()>> {
        if !self.config.monitor_enabled {
            tracing::info!("Endpoint monitor disabled");
            return None;
        }
        let manager = self.clone();
        Some(tokio::spawn(async move { manager.run_monitor(shutdown).await }))
    }

    async fn run_monitor(self: Arc<Self>, mut shutdown: broadcast::Receiver<()>) {
        tracing::info!(
            interval_ms = self.config.health_check_interval_ms,
            endpoints = self.lock().endpoints.len(),
            "Endpoint monitor starting"
        );

        let mut ticker = time::interval(self.config.health_check_interval());
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.check_all_endpoints().await;
                    self.schedule_recovery();
                }
                _ = shutdown.recv() => {
                    tracing::info!("Endpoint monitor received shutdown signal, exiting loop");
                    break;
                }
            }
        }
        self.cancel_recovery();
    }

    /// Arm the recovery timer when failed over with auto-recovery on.
    ///
    /// Returns false if nothing was scheduled.
    pub fn schedule_recovery(self: &Arc<Self>) -> bool {
        if !self.config.auto_recovery || self.state() != FailoverState::FailedOver {
            return false;
        }

        let mut timer = self
            .recovery_timer
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if timer.as_ref().is_some_and(|h| !h.is_finished()) {
            return false;
        }

        let delay = self.config.auto_recovery_delay();
        let manager = Arc::downgrade(self);
        *timer = Some(tokio::spawn(async move {
            time::sleep(delay).await;
            let Some(manager) = manager.upgrade() else {
                return;
            };
            match manager.attempt_recovery().await {
                Ok(true) => {}
                Ok(false) => tracing::debug!("Automatic recovery did not switch endpoints"),
                Err(e) => tracing::debug!(error = %e, "Automatic recovery skipped"),
            }
        }));
        tracing::info!(delay_ms = self.config.auto_recovery_delay_ms, "Automatic recovery scheduled");
        true
    }

    /// Abort a pending recovery timer.
    pub fn cancel_recovery(&self) {
        let handle = self
            .recovery_timer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            handle.abort();
        }
    }

    /// Lease the active endpoint.
    pub fn acquire(&self) -> Result<EndpointLease, FailoverError> {
        let inner = self.lock();
        if inner.state == FailoverState::Unavailable {
            return Err(FailoverError::Unavailable);
        }
        let endpoint = inner
            .active
            .as_deref()
            .and_then(|id| inner.endpoint(id))
            .ok_or(FailoverError::NoActiveEndpoint)?;
        Ok(EndpointLease::new(endpoint))
    }

    pub fn state(&self) -> FailoverState {
        self.lock().state
    }

    pub fn active_endpoint(&self) -> Option<Endpoint> {
        let inner = self.lock();
        inner.active.as_deref().and_then(|id| inner.endpoint(id)).cloned()
    }

    pub fn endpoint(&self, endpoint_id: &str) -> Option<Endpoint> {
        self.lock().endpoint(endpoint_id).cloned()
    }

    /// Snapshot of all endpoints in registration order.
    pub fn endpoints(&self) -> Vec<Endpoint> {
        self.lock().endpoints.clone()
    }

    pub fn get_status(&self) -> FailoverStatus {
        let inner = self.lock();
        FailoverStatus {
            state: inner.state,
            active_endpoint: inner.active.clone(),
            total_endpoints: inner.endpoints.len(),
            healthy_endpoints: inner.endpoints.iter().filter(|e| e.is_healthy).count(),
            total_failovers: inner.total_failovers,
            total_recoveries: inner.total_recoveries,
            last_failover_ms: inner.last_failover_ms,
            availability: inner.clock.ratio(inner.state),
            uptime_ms: inner.clock.started.elapsed().as_millis() as u64,
        }
    }

    /// The newest `limit` events, oldest first.
    pub fn event_history(&self, limit: usize) -> Vec<FailoverEvent> {
        self.history.recent(limit)
    }
}
