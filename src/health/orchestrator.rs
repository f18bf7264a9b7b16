//! Health orchestrator.
//!
//! # Responsibilities
//! - Hold health check registrations and their last results
//! - Run quick checks (critical services) and full checks (everything) on timers
//! - Emit degradation/recovery events on level changes
//! - Aggregate into one overall level and score
//! - Re-check degraded services in a recovery pass
//!
//! # Design Decisions
//! - Checks run with a timeout and panic isolation; any failure maps to
//!   `unavailable` with score 0
//! - The first result for a service has no prior level and emits no event
//! - Services never checked are left out of the aggregate

use std::error::Error as StdError;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use futures_util::future::{join_all, BoxFuture};
use futures_util::FutureExt;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant};
use uuid::Uuid;

use crate::clock::unix_millis;
use crate::config::HealthConfig;
use crate::health::{HealthLevel, HealthReport, ServiceHealth};
use crate::lifecycle::PassGuard;
use crate::observability::{metrics, EventHistory, SubscriptionId, Subscribers};

/// Error type a health check may fail with.
pub type BoxError = Box<dyn StdError + Send + Sync>;

/// The future a health check returns.
pub type CheckFuture = BoxFuture<'static, Result<HealthReport, BoxError>>;

type CheckFn = Arc<dyn Fn() -> CheckFuture + Send + Sync>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HealthError {
    #[error("unknown service '{0}'")]
    UnknownService(String),

    #[error("service '{0}' is already registered")]
    DuplicateService(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthEventKind {
    Degradation,
    Recovery,
}

/// A level change of one service.
#[derive(Debug, Clone, Serialize)]
pub struct HealthEvent {
    pub id: Uuid,
    /// Epoch millis.
    pub timestamp_ms: u64,
    pub service_id: String,
    pub kind: HealthEventKind,
    pub from: HealthLevel,
    pub to: HealthLevel,
    pub message: String,
}

/// Aggregate view across services.
#[derive(Debug, Clone, Serialize)]
pub struct SystemHealth {
    pub overall: HealthLevel,
    pub score: u8,
    /// Checked services, sorted by id.
    pub services: Vec<ServiceHealth>,
    /// Registered services without a result yet, sorted. They do not affect
    /// `overall` or `score`.
    pub pending: Vec<String>,
    /// Epoch millis of the last full check.
    pub last_full_check_ms: Option<u64>,
    pub recovery_in_progress: bool,
}

/// Outcome of one recovery pass.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RecoveryReport {
    pub attempted: Vec<String>,
    pub recovered: Vec<String>,
    pub still_failing: Vec<String>,
}

struct Registration {
    name: String,
    dependencies: Vec<String>,
    check: CheckFn,
}

/// Polls registered health checks and aggregates them.
pub struct HealthOrchestrator {
    config: HealthConfig,
    registrations: DashMap<String, Arc<Registration>>,
    results: DashMap<String, ServiceHealth>,
    history: EventHistory<HealthEvent>,
    subscribers: Subscribers<HealthEvent>,
    last_full_check_ms: AtomicU64,
    quick_pass: AtomicBool,
    full_pass: AtomicBool,
    recovering: AtomicBool,
}

impl HealthOrchestrator {
    pub fn new(config: HealthConfig) -> Self {
        Self {
            history: EventHistory::new(config.max_history),
            config,
            registrations: DashMap::new(),
            results: DashMap::new(),
            subscribers: Subscribers::new(),
            last_full_check_ms: AtomicU64::new(0),
            quick_pass: AtomicBool::new(false),
            full_pass: AtomicBool::new(false),
            recovering: AtomicBool::new(false),
        }
    }

    pub fn config(&self) -> &HealthConfig {
        &self.config
    }

    /// Register a health check.
    pub fn register_service<F, Fut>(
        &self,
        id: impl Into<String>,
        name: impl Into<String>,
        check: F,
        dependencies: Vec<String>,
    ) -> Result<(), HealthError>
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<HealthReport, BoxError>> + Send + 'static,
    {
        let id = id.into();
        if self.registrations.contains_key(&id) {
            return Err(HealthError::DuplicateService(id));
        }

        let check: CheckFn = Arc::new(move || Box::pin(check()) as CheckFuture);
        let registration = Registration {
            name: name.into(),
            dependencies,
            check,
        };
        tracing::info!(service = %id, name = %registration.name, "Health check registered");
        self.registrations.insert(id, Arc::new(registration));
        Ok(())
    }

    /// Remove a registration and its last result.
    pub fn unregister_service(&self, id: &str) -> bool {
        self.results.remove(id);
        self.registrations.remove(id).is_some()
    }

    /// Run one service's check and store the result.
    pub async fn run_service_check(&self, id: &str) -> Result<ServiceHealth, HealthError> {
        let registration = self
            .registrations
            .get(id)
            .map(|r| r.value().clone())
            .ok_or_else(|| HealthError::UnknownService(id.to_string()))?;

        let started = Instant::now();
        let check = registration.check.clone();
        let outcome = AssertUnwindSafe(async move { check().await }).catch_unwind();

        let report = match time::timeout(self.config.check_timeout(), outcome).await {
            Ok(Ok(Ok(report))) => report,
            Ok(Ok(Err(e))) => {
                HealthReport::new(HealthLevel::Unavailable, 0, format!("health check failed: {e}"))
            }
            Ok(Err(_)) => HealthReport::new(HealthLevel::Unavailable, 0, "health check panicked"),
            Err(_) => HealthReport::new(
                HealthLevel::Unavailable,
                0,
                format!("health check timed out after {}ms", self.config.check_timeout_ms),
            ),
        };

        let health = ServiceHealth {
            id: id.to_string(),
            name: registration.name.clone(),
            level: report.level,
            score: report.score.min(100),
            last_check_ms: unix_millis(),
            check_duration_ms: started.elapsed().as_millis() as u64,
            message: report.message,
            dependencies: registration.dependencies.clone(),
            details: report.details,
        };

        metrics::record_service_health(id, health.score);

        // Unregistered while the check ran.
        if !self.registrations.contains_key(id) {
            return Ok(health);
        }

        let previous = self
            .results
            .insert(id.to_string(), health.clone())
            .map(|old| old.level);

        if let Some(previous) = previous {
            if previous != health.level {
                self.emit(id, previous, &health);
            }
        }
        Ok(health)
    }

    fn emit(&self, id: &str, from: HealthLevel, health: &ServiceHealth) {
        let kind = if health.level > from {
            HealthEventKind::Recovery
        } else {
            HealthEventKind::Degradation
        };
        match kind {
            HealthEventKind::Degradation => tracing::warn!(
                service = %id,
                from = %from,
                to = %health.level,
                message = %health.message,
                "Service health degraded"
            ),
            HealthEventKind::Recovery => tracing::info!(
                service = %id,
                from = %from,
                to = %health.level,
                "Service health recovered"
            ),
        }

        let event = HealthEvent {
            id: Uuid::new_v4(),
            timestamp_ms: unix_millis(),
            service_id: id.to_string(),
            kind,
            from,
            to: health.level,
            message: health.message.clone(),
        };
        self.history.push(event.clone());
        self.subscribers.notify(&event);
    }

    async fn run_checks(&self, ids: Vec<String>) -> Vec<ServiceHealth> {
        let checks = ids.iter().map(|id| self.run_service_check(id));
        join_all(checks)
            .await
            .into_iter()
            .filter_map(Result::ok)
            .collect()
    }

    /// Check the configured critical services that are registered.
    ///
    /// Returns `None` if a quick pass is already running.
    pub async fn quick_check(&self) -> Option<Vec<ServiceHealth>> {
        let _pass = PassGuard::enter(&self.quick_pass)?;
        let ids: Vec<String> = self
            .config
            .critical_services
            .iter()
            .filter(|id| self.registrations.contains_key(id.as_str()))
            .cloned()
            .collect();
        Some(self.run_checks(ids).await)
    }

    /// Check every registered service.
    ///
    /// Returns `None` if a full pass is already running.
    pub async fn full_check(&self) -> Option<SystemHealth> {
        let _pass = PassGuard::enter(&self.full_pass)?;
        let ids: Vec<String> = self.registrations.iter().map(|r| r.key().clone()).collect();
        self.run_checks(ids).await;
        self.last_full_check_ms
            .store(unix_millis(), Ordering::Relaxed);
        Some(self.get_status())
    }

    /// Full check followed by a recovery pass in the background when
    /// auto-recovery is on and a service needs it.
    pub async fn full_check_and_recover(self: &Arc<Self>) -> Option<SystemHealth> {
        let status = self.full_check().await?;
        let needs_recovery = status.services.iter().any(|s| s.level.needs_recovery());
        if self.config.auto_recovery && needs_recovery && !status.recovery_in_progress {
            let orchestrator = self.clone();
            tokio::spawn(async move {
                orchestrator.attempt_recovery().await;
            });
        }
        Some(status)
    }

    /// Re-check degraded and critical services until they recover or the
    /// attempts run out.
    ///
    /// Returns `None` if a recovery pass is already running.
    pub async fn attempt_recovery(&self) -> Option<RecoveryReport> {
        let _pass = PassGuard::enter(&self.recovering)?;

        let mut targets: Vec<String> = self
            .results
            .iter()
            .filter(|r| r.value().level.needs_recovery())
            .map(|r| r.key().clone())
            .collect();
        targets.sort();
        if targets.is_empty() {
            return Some(RecoveryReport::default());
        }

        tracing::info!(services = ?targets, "Health recovery pass starting");

        let attempts = self.config.recovery_attempts.max(1);
        let delay = self.config.recovery_delay();
        let passes = targets.iter().map(|id| async move {
            for attempt in 1..=attempts {
                match self.run_service_check(id).await {
                    Ok(health) if health.level.is_ok() => return (id.clone(), true),
                    Err(_) => return (id.clone(), false),
                    Ok(_) if attempt < attempts => time::sleep(delay).await,
                    Ok(_) => {}
                }
            }
            (id.clone(), false)
        });

        let mut report = RecoveryReport {
            attempted: targets.clone(),
            ..Default::default()
        };
        for (id, recovered) in join_all(passes).await {
            if recovered {
                report.recovered.push(id);
            } else {
                report.still_failing.push(id);
            }
        }

        tracing::info!(
            recovered = report.recovered.len(),
            still_failing = report.still_failing.len(),
            "Health recovery pass finished"
        );
        Some(report)
    }

    /// Start the quick/full check loop. Runs one full check immediately.
    ///
    /// Returns `None` when health checking is disabled.
    pub fn start(self: &Arc<Self>, shutdown: broadcast::Receiver<()>) -> Option<JoinHandle<()>> {
        if !self.config.enabled {
            tracing::info!("Health orchestrator disabled");
            return None;
        }
        let orchestrator = self.clone();
        Some(tokio::spawn(async move { orchestrator.run(shutdown).await }))
    }

    async fn run(self: Arc<Self>, mut shutdown: broadcast::Receiver<()>) {
        tracing::info!(
            check_interval_ms = self.config.check_interval_ms,
            full_check_interval_ms = self.config.full_check_interval_ms,
            services = self.registrations.len(),
            "Health orchestrator starting"
        );

        let mut quick = time::interval(self.config.check_interval());
        let mut full = time::interval(self.config.full_check_interval());
        // Both first ticks fire at once; the startup full check covers them.
        quick.tick().await;
        full.tick().await;
        self.full_check_and_recover().await;

        loop {
            tokio::select! {
                _ = quick.tick() => {
                    self.quick_check().await;
                }
                _ = full.tick() => {
                    self.full_check_and_recover().await;
                }
                _ = shutdown.recv() => {
                    tracing::info!("Health orchestrator received shutdown signal, exiting loop");
                    break;
                }
            }
        }
    }

    /// Aggregate of the last results.
    ///
    /// Overall level is the worst service level; the score is a weighted
    /// average with critical services counted twice. Services registered but
    /// never checked are listed in `pending` and left out of both.
    pub fn get_status(&self) -> SystemHealth {
        let mut services: Vec<ServiceHealth> =
            self.results.iter().map(|r| r.value().clone()).collect();
        services.sort_by(|a, b| a.id.cmp(&b.id));

        let mut pending: Vec<String> = self
            .registrations
            .iter()
            .filter(|r| !self.results.contains_key(r.key()))
            .map(|r| r.key().clone())
            .collect();
        pending.sort();

        let overall = services
            .iter()
            .map(|s| s.level)
            .min()
            .unwrap_or(HealthLevel::Healthy);

        let (weighted, weights) = services.iter().fold((0u32, 0u32), |(sum, total), s| {
            let weight = if self.is_critical(&s.id) { 2 } else { 1 };
            (sum + s.score as u32 * weight, total + weight)
        });
        let score = if weights == 0 {
            100
        } else {
            (weighted as f64 / weights as f64).round() as u8
        };

        let last_full = self
            .last_full_check_ms
            .load(Ordering::Relaxed);

        SystemHealth {
            overall,
            score,
            services,
            pending,
            last_full_check_ms: (last_full > 0).then_some(last_full),
            recovery_in_progress: self
                .recovering
                .load(Ordering::Relaxed),
        }
    }

    fn is_critical(&self, id: &str) -> bool {
        self.config.critical_services.iter().any(|c| c == id)
    }

    pub fn service(&self, id: &str) -> Option<ServiceHealth> {
        self.results.get(id).map(|r| r.value().clone())
    }

    /// Registered service ids, sorted.
    pub fn service_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.registrations.iter().map(|r| r.key().clone()).collect();
        ids.sort();
        ids
    }

    /// The newest `limit` events, oldest first.
    pub fn event_history(&self, limit: usize) -> Vec<HealthEvent> {
        self.history.recent(limit)
    }

    pub fn on_health_event<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(&HealthEvent) + Send + Sync + 'static,
    {
        self.subscribers.subscribe(callback)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.subscribers.unsubscribe(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU8, AtomicUsize};
    use std::time::Duration;

    fn orchestrator() -> Arc<HealthOrchestrator> {
        Arc::new(HealthOrchestrator::new(HealthConfig {
            check_timeout_ms: 1_000,
            recovery_delay_ms: 100,
            recovery_attempts: 3,
            critical_services: vec!["db".to_string()],
            ..Default::default()
        }))
    }

    fn fixed(level: HealthLevel) -> impl Fn() -> CheckFuture + Send + Sync + 'static {
        move || -> CheckFuture {
            Box::pin(async move {
                Ok::<_, BoxError>(HealthReport::from_level(level, level.to_string()))
            })
        }
    }

    /// A check whose level can be changed from the test.
    fn switchable(level: Arc<AtomicU8>) -> impl Fn() -> CheckFuture + Send + Sync + 'static {
        move || -> CheckFuture {
            let level = match level.load(Ordering::SeqCst) {
                0 => HealthLevel::Unavailable,
                1 => HealthLevel::Critical,
                2 => HealthLevel::Degraded,
                3 => HealthLevel::Healthy,
                _ => HealthLevel::Optimal,
            };
            Box::pin(async move { Ok::<_, BoxError>(HealthReport::from_level(level, "switchable")) })
        }
    }

    #[tokio::test]
    async fn test_overall_is_worst_level() {
        let orch = orchestrator();
        orch.register_service("db", "Database", fixed(HealthLevel::Critical), vec![])
            .unwrap();
        orch.register_service("cache", "Cache", fixed(HealthLevel::Optimal), vec![])
            .unwrap();

        let status = orch.full_check().await.unwrap();

        assert_eq!(status.overall, HealthLevel::Critical);
        // (30 * 2 + 100) / 3
        assert_eq!(status.score, 53);
        assert_eq!(status.services.len(), 2);
        assert!(status.last_full_check_ms.is_some());
    }

    #[test]
    fn test_no_services_is_healthy() {
        let status = orchestrator().get_status();
        assert_eq!(status.overall, HealthLevel::Healthy);
        assert_eq!(status.score, 100);
    }

    #[tokio::test]
    async fn test_unchecked_services_are_pending() {
        let orch = orchestrator();
        orch.register_service("db", "Database", fixed(HealthLevel::Critical), vec![])
            .unwrap();
        orch.register_service("cache", "Cache", fixed(HealthLevel::Optimal), vec![])
            .unwrap();

        let status = orch.get_status();
        assert_eq!(status.pending, vec!["cache", "db"]);
        assert!(status.services.is_empty());
        assert_eq!(status.overall, HealthLevel::Healthy);

        orch.run_service_check("cache").await.unwrap();
        let status = orch.get_status();
        assert_eq!(status.pending, vec!["db"]);
        assert_eq!(status.overall, HealthLevel::Optimal);
        assert_eq!(status.score, 100);
    }

    #[tokio::test]
    async fn test_failing_check_is_unavailable() {
        let orch = orchestrator();
        orch.register_service(
            "db",
            "Database",
            || async { Err::<HealthReport, BoxError>("connection refused".into()) },
            vec![],
        )
        .unwrap();

        let health = orch.run_service_check("db").await.unwrap();
        assert_eq!(health.level, HealthLevel::Unavailable);
        assert_eq!(health.score, 0);
        assert!(health.message.contains("connection refused"));
    }

    #[tokio::test]
    async fn test_panicking_check_is_isolated() {
        let orch = orchestrator();
        orch.register_service(
            "boom",
            "Boom",
            || async {
                if true {
                    panic!("probe bug");
                }
                Ok::<HealthReport, BoxError>(HealthReport::from_level(HealthLevel::Healthy, ""))
            },
            vec![],
        )
        .unwrap();
        orch.register_service("cache", "Cache", fixed(HealthLevel::Healthy), vec![])
            .unwrap();

        let status = orch.full_check().await.unwrap();
        assert_eq!(status.services.len(), 2);
        assert_eq!(orch.service("boom").unwrap().level, HealthLevel::Unavailable);
        assert_eq!(orch.service("cache").unwrap().level, HealthLevel::Healthy);
    }

    #[tokio::test(start_paused = true)]
    async fn test_hanging_check_times_out() {
        let orch = orchestrator();
        orch.register_service(
            "slow",
            "Slow",
            || async {
                time::sleep(Duration::from_secs(60)).await;
                Ok::<HealthReport, BoxError>(HealthReport::from_level(HealthLevel::Healthy, ""))
            },
            vec![],
        )
        .unwrap();

        let health = orch.run_service_check("slow").await.unwrap();
        assert_eq!(health.level, HealthLevel::Unavailable);
        assert!(health.message.contains("timed out"));
    }

    #[tokio::test]
    async fn test_level_changes_emit_events() {
        let orch = orchestrator();
        let level = Arc::new(AtomicU8::new(3));
        orch.register_service("db", "Database", switchable(level.clone()), vec![])
            .unwrap();

        let seen = Arc::new(AtomicUsize::new(0));
        let counter = seen.clone();
        let sub = orch.on_health_event(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        orch.run_service_check("db").await.unwrap();
        assert!(orch.event_history(10).is_empty());

        orch.run_service_check("db").await.unwrap();
        assert!(orch.event_history(10).is_empty());

        level.store(1, Ordering::SeqCst);
        orch.run_service_check("db").await.unwrap();
        level.store(4, Ordering::SeqCst);
        orch.run_service_check("db").await.unwrap();

        let events = orch.event_history(10);
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].kind, HealthEventKind::Degradation);
        assert_eq!(events[0].from, HealthLevel::Healthy);
        assert_eq!(events[0].to, HealthLevel::Critical);
        assert_eq!(events[1].kind, HealthEventKind::Recovery);
        assert_eq!(seen.load(Ordering::SeqCst), 2);

        assert!(orch.unsubscribe(sub));
    }

    #[tokio::test(start_paused = true)]
    async fn test_recovery_retries_until_healthy() {
        let orch = orchestrator();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        orch.register_service(
            "db",
            "Database",
            move || {
                let n = counter.fetch_add(1, Ordering::SeqCst);
                Box::pin(async move {
                    // Initial check plus one failed recovery attempt.
                    let level = if n < 2 {
                        HealthLevel::Degraded
                    } else {
                        HealthLevel::Healthy
                    };
                    Ok::<_, BoxError>(HealthReport::from_level(level, "db"))
                }) as CheckFuture
            },
            vec![],
        )
        .unwrap();
        orch.register_service("cache", "Cache", fixed(HealthLevel::Critical), vec![])
            .unwrap();

        orch.full_check().await.unwrap();
        let report = orch.attempt_recovery().await.unwrap();

        assert_eq!(report.attempted, vec!["cache".to_string(), "db".to_string()]);
        assert_eq!(report.recovered, vec!["db".to_string()]);
        assert_eq!(report.still_failing, vec!["cache".to_string()]);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_quick_check_only_runs_critical_services() {
        let orch = orchestrator();
        orch.register_service("db", "Database", fixed(HealthLevel::Healthy), vec![])
            .unwrap();
        orch.register_service("cache", "Cache", fixed(HealthLevel::Healthy), vec![])
            .unwrap();

        let checked = orch.quick_check().await.unwrap();
        assert_eq!(checked.len(), 1);
        assert_eq!(checked[0].id, "db");
        assert!(orch.service("cache").is_none());
    }

    #[tokio::test]
    async fn test_registration_errors() {
        let orch = orchestrator();
        orch.register_service("db", "Database", fixed(HealthLevel::Healthy), vec!["network".into()])
            .unwrap();
        assert_eq!(
            orch.register_service("db", "Again", fixed(HealthLevel::Healthy), vec![]),
            Err(HealthError::DuplicateService("db".into()))
        );
        assert_eq!(
            orch.run_service_check("nope").await.unwrap_err(),
            HealthError::UnknownService("nope".into())
        );

        let health = orch.run_service_check("db").await.unwrap();
        assert_eq!(health.dependencies, vec!["network".to_string()]);
        assert!(orch.unregister_service("db"));
        assert!(orch.service("db").is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_loop_runs_startup_full_check() {
        let orch = orchestrator();
        orch.register_service("cache", "Cache", fixed(HealthLevel::Healthy), vec![])
            .unwrap();
        let (tx, rx) = broadcast::channel(1);

        let handle = orch.start(rx).unwrap();
        time::sleep(Duration::from_millis(10)).await;
        assert_eq!(orch.service("cache").unwrap().level, HealthLevel::Healthy);

        tx.send(()).unwrap();
        handle.await.unwrap();
    }
}
