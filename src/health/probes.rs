//! Built-in health checks for the shield's own components.

use std::sync::Arc;

use serde::Serialize;

use crate::cache::QueryPlanCache;
use crate::failover::{FailoverManager, FailoverState};
use crate::health::orchestrator::{BoxError, CheckFuture};
use crate::health::{HealthLevel, HealthReport};
use crate::resilience::{CircuitState, RetryExecutor};

/// Service ids the built-in checks are registered under.
pub const CACHE_SERVICE: &str = "cache";
pub const FAILOVER_SERVICE: &str = "failover";
pub const RETRY_SERVICE: &str = "retry";

fn ready(report: HealthReport) -> CheckFuture {
    Box::pin(async move { Ok::<_, BoxError>(report) })
}

fn details<T: Serialize>(value: &T) -> serde_json::Value {
    serde_json::to_value(value).unwrap_or_default()
}

/// Memory pressure and hit rate of the plan cache.
pub fn cache_check<V>(cache: Arc<QueryPlanCache<V>>) -> impl Fn() -> CheckFuture + Send + Sync + 'static
where
    V: Clone + Serialize + Send + Sync + 'static,
{
    move || {
        let health = cache.health_status();
        ready(
            HealthReport::from_level(health.level, health.message)
                .with_details(details(&cache.stats())),
        )
    }
}

/// Manager state of the failover subsystem.
pub fn failover_check(
    manager: Arc<FailoverManager>,
) -> impl Fn() -> CheckFuture + Send + Sync + 'static {
    move || {
        let status = manager.get_status();
        let (level, message) = match status.state {
            _ if status.total_endpoints == 0 => {
                (HealthLevel::Healthy, "no endpoints registered".to_string())
            }
            FailoverState::Healthy if status.healthy_endpoints == status.total_endpoints => {
                (HealthLevel::Optimal, "all endpoints healthy".to_string())
            }
            FailoverState::Healthy => (
                HealthLevel::Healthy,
                format!(
                    "{} of {} endpoints healthy",
                    status.healthy_endpoints, status.total_endpoints
                ),
            ),
            FailoverState::FailedOver => (
                HealthLevel::Degraded,
                format!(
                    "running on failover endpoint '{}'",
                    status.active_endpoint.as_deref().unwrap_or("none")
                ),
            ),
            FailoverState::Degraded | FailoverState::FailingOver | FailoverState::Recovering => {
                (HealthLevel::Degraded, format!("failover manager {}", status.state))
            }
            FailoverState::Unavailable => (
                HealthLevel::Unavailable,
                "no healthy endpoint available".to_string(),
            ),
        };
        ready(HealthReport::from_level(level, message).with_details(details(&status)))
    }
}

/// Share of open circuit breakers.
pub fn retry_check(executor: Arc<RetryExecutor>) -> impl Fn() -> CheckFuture + Send + Sync + 'static {
    move || {
        let breakers = executor.all_circuit_breaker_status();
        let total = breakers.len();
        let open = breakers
            .iter()
            .filter(|b| b.state == CircuitState::Open)
            .count();
        let half_open = breakers
            .iter()
            .filter(|b| b.state == CircuitState::HalfOpen)
            .count();

        let level = if total == 0 {
            HealthLevel::Healthy
        } else if open == 0 && half_open == 0 {
            HealthLevel::Optimal
        } else if open == 0 {
            HealthLevel::Healthy
        } else if open * 2 >= total {
            HealthLevel::Critical
        } else {
            HealthLevel::Degraded
        };
        let message = format!("{open} of {total} circuits open, {half_open} half-open");
        ready(HealthReport::from_level(level, message).with_details(details(&breakers)))
    }
}
