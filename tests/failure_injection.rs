//! Failure injection tests for backend-shield.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use backend_shield::config::FailoverConfig;
use backend_shield::failover::{FailoverEventKind, FailoverManager, FailoverState};
use backend_shield::health::HealthLevel;
use backend_shield::resilience::{CircuitState, RetryError};
use backend_shield::{BackendError, Shield};

mod common;

use common::{endpoint, shield_config, ScriptedProbe};

#[tokio::test(start_paused = true)]
async fn test_retry_on_transient_failure() {
    let shield = Shield::new(&shield_config()).unwrap();

    let call_count = Arc::new(AtomicU32::new(0));
    let cc = call_count.clone();
    let result = shield
        .retry()
        .with_retry("fetch_orders", move || {
            let cc = cc.clone();
            async move {
                if cc.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(BackendError::network("connection reset"))
                } else {
                    Ok("rows")
                }
            }
        })
        .await;

    assert_eq!(result.unwrap(), "rows", "Should eventually succeed after retries");
    assert_eq!(call_count.load(Ordering::SeqCst), 3);
    let status = shield.retry().circuit_breaker_status("fetch_orders").unwrap();
    assert_eq!(status.state, CircuitState::Closed);
    assert_eq!(status.failure_count, 0);
}

#[tokio::test(start_paused = true)]
async fn test_non_retryable_error_is_not_retried() {
    let shield = Shield::new(&shield_config()).unwrap();

    let call_count = Arc::new(AtomicU32::new(0));
    let cc = call_count.clone();
    let result: Result<(), _> = shield
        .retry()
        .with_retry("insert_user", move || {
            cc.fetch_add(1, Ordering::SeqCst);
            async { Err(BackendError::new("duplicate key").with_code("23505")) }
        })
        .await;

    assert!(matches!(result, Err(RetryError::NonRetryable { .. })));
    assert_eq!(call_count.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn test_circuit_breaker_opens_and_recovers() {
    let mut config = shield_config();
    config.retry.max_attempts = 1;
    config.circuit_breaker.failure_threshold = 3;
    config.circuit_breaker.reset_timeout_ms = 5_000;
    config.circuit_breaker.close_threshold = 2;
    let shield = Shield::new(&config).unwrap();

    let backend_up = Arc::new(AtomicU32::new(0));
    let call_count = Arc::new(AtomicU32::new(0));
    let call = || {
        let up = backend_up.clone();
        let cc = call_count.clone();
        move || {
            let up = up.clone();
            let cc = cc.clone();
            async move {
                cc.fetch_add(1, Ordering::SeqCst);
                if up.load(Ordering::SeqCst) == 1 {
                    Ok(())
                } else {
                    Err(BackendError::new("upstream down").with_status(503))
                }
            }
        }
    };

    for _ in 0..3 {
        let result = shield.retry().with_retry("report", call()).await;
        assert!(matches!(result, Err(RetryError::Exhausted { .. })));
    }
    assert_eq!(shield.retry().open_circuits(), 1);

    // Open circuit fails fast without invoking the operation.
    let result = shield.retry().with_retry("report", call()).await;
    assert!(result.unwrap_err().is_circuit_open());
    assert_eq!(call_count.load(Ordering::SeqCst), 3);

    backend_up.store(1, Ordering::SeqCst);
    tokio::time::sleep(Duration::from_millis(5_100)).await;

    shield.retry().with_retry("report", call()).await.unwrap();
    assert_eq!(
        shield.retry().circuit_breaker_status("report").unwrap().state,
        CircuitState::HalfOpen
    );
    shield.retry().with_retry("report", call()).await.unwrap();
    assert_eq!(
        shield.retry().circuit_breaker_status("report").unwrap().state,
        CircuitState::Closed
    );
}

#[tokio::test(start_paused = true)]
async fn test_reported_errors_fail_over_and_degrade_health() {
    let shield = Shield::with_endpoint_probe(&shield_config(), Arc::new(ScriptedProbe::default()))
        .unwrap();
    let failover = shield.failover();
    assert_eq!(failover.active_endpoint().unwrap().id, "eu");

    for _ in 0..3 {
        let lease = failover.acquire().unwrap();
        let endpoint_id = lease.endpoint_id().to_string();
        drop(lease);
        failover
            .report_error(&endpoint_id, BackendError::network("connection refused"))
            .await
            .unwrap();
    }

    assert_eq!(failover.active_endpoint().unwrap().id, "us");
    assert_eq!(failover.state(), FailoverState::FailedOver);
    assert_eq!(failover.get_status().total_failovers, 1);

    let kinds: Vec<_> = failover
        .event_history(10)
        .into_iter()
        .map(|e| e.kind)
        .collect();
    assert_eq!(
        kinds,
        vec![FailoverEventKind::FailoverStart, FailoverEventKind::FailoverComplete]
    );

    let system = shield.health().full_check().await.unwrap();
    let failover_health = system
        .services
        .iter()
        .find(|s| s.id == "failover")
        .unwrap();
    assert_eq!(failover_health.level, HealthLevel::Degraded);
    assert_eq!(system.overall, HealthLevel::Degraded);
}

#[tokio::test(start_paused = true)]
async fn test_all_endpoints_down_is_unavailable() {
    let probe = Arc::new(ScriptedProbe::default());
    let shield = Shield::with_endpoint_probe(&shield_config(), probe.clone()).unwrap();
    probe.fail("eu");
    probe.fail("us");

    shield.failover().check_all_endpoints().await;

    assert_eq!(shield.failover().state(), FailoverState::Unavailable);
    assert!(shield.failover().acquire().is_err());

    let system = shield.health().full_check().await.unwrap();
    assert_eq!(system.overall, HealthLevel::Unavailable);

    probe.pass("eu");
    probe.pass("us");
    shield.failover().check_all_endpoints().await;
    assert_eq!(shield.failover().state(), FailoverState::Healthy);
    assert!(shield.failover().state().is_available());
}

#[tokio::test(start_paused = true)]
async fn test_automatic_recovery_to_primary() {
    let probe = Arc::new(ScriptedProbe::default());
    let shield = Arc::new(Shield::with_endpoint_probe(&shield_config(), probe.clone()).unwrap());
    shield.start();
    tokio::time::sleep(Duration::from_millis(10)).await;

    probe.fail("eu");
    tokio::time::sleep(Duration::from_millis(600)).await;
    assert_eq!(shield.failover().active_endpoint().unwrap().id, "us");

    probe.pass("eu");
    tokio::time::sleep(Duration::from_millis(2_000)).await;

    assert_eq!(shield.failover().active_endpoint().unwrap().id, "eu");
    assert_eq!(shield.failover().state(), FailoverState::Healthy);
    assert_eq!(shield.failover().get_status().total_recoveries, 1);

    shield.stop().await;
}

#[tokio::test]
async fn test_http_probe_detects_failing_backend() {
    let healthy = common::start_programmable_backend(|| async { (200, "ok".into()) }).await;
    let broken =
        common::start_programmable_backend(|| async { (503, "Service Unavailable".into()) })
            .await;

    let manager = FailoverManager::new(FailoverConfig {
        monitor_enabled: false,
        graceful_drain: false,
        auto_recovery: false,
        ..Default::default()
    });
    manager
        .register_endpoint(endpoint("primary", &format!("http://{broken}"), 1, true).into())
        .unwrap();
    manager
        .register_endpoint(endpoint("standby", &format!("http://{healthy}"), 2, false).into())
        .unwrap();

    manager.check_all_endpoints().await;

    assert_eq!(manager.active_endpoint().unwrap().id, "standby");
    assert!(!manager.endpoint("primary").unwrap().is_healthy);
    let standby = manager.endpoint("standby").unwrap();
    assert!(standby.is_healthy);
    assert!(standby.last_health_check.is_some());
    assert!(standby.latency_ms.is_some());

    // Primary still failing, so recovery is refused.
    assert!(!manager.attempt_recovery().await.unwrap());
    assert_eq!(manager.active_endpoint().unwrap().id, "standby");
}
