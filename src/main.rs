//! backend-shield daemon.
//!
//! # Architecture Overview
//!
//! ```text
//!                  ┌──────────────────────────────────────────────────────┐
//!                  │                      SHIELD                          │
//!                  │                                                      │
//!   caller op ─────┼─▶ RetryExecutor ──▶ CircuitBreaker (per operation)  │
//!                  │                                                      │
//!   outcomes  ─────┼─▶ FailoverManager ──▶ active endpoint lease ────────┼──▶ backend
//!                  │        ▲ monitor (probes)                            │
//!                  │                                                      │
//!   plans     ─────┼─▶ QueryPlanCache (TTL, budgets, sweeper)            │
//!                  │                                                      │
//!                  │   HealthOrchestrator ◀── probes of the three above  │
//!                  │                                                      │
//!                  │   config (TOML + watcher) │ observability │ lifecycle │
//!                  └──────────────────────────────────────────────────────┘
//! ```
//!
//! Loads configuration, wires every component, runs background tasks until
//! Ctrl-C/SIGTERM and hot-reloads retry/breaker options when `--watch` is set.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;

use backend_shield::config::watcher::ConfigWatcher;
use backend_shield::config::{load_config, ShieldConfig};
use backend_shield::lifecycle::signals::wait_for_signal;
use backend_shield::observability::{logging, metrics};
use backend_shield::resilience::CircuitState;
use backend_shield::Shield;

#[derive(Parser)]
#[command(name = "backend-shield")]
#[command(about = "Resilience and caching core for a remote backend", long_about = None)]
struct Args {
    /// Configuration file (TOML). Defaults are used when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Reload retry and breaker options when the config file changes.
    #[arg(short, long)]
    watch: bool,

    /// Seconds between status log lines; 0 disables them.
    #[arg(long, default_value_t = 60)]
    status_interval_secs: u64,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => load_config(path)?,
        None => ShieldConfig::default(),
    };

    logging::init_logging(&config.observability)?;
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "backend-shield starting");
    tracing::info!(
        config = ?args.config,
        endpoints = config.failover.endpoints.len(),
        max_attempts = config.retry.max_attempts,
        failure_threshold = config.circuit_breaker.failure_threshold,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr)?,
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let shield = Arc::new(Shield::new(&config)?);
    shield.start();

    // Keep the watcher alive for the lifetime of the process.
    let _watcher = match (&args.config, args.watch) {
        (Some(path), true) => {
            let (watcher, mut updates) = ConfigWatcher::new(path, config.clone());
            let watcher = watcher.run()?;
            let shield = shield.clone();
            tokio::spawn(async move {
                while let Some(reloaded) = updates.recv().await {
                    shield.apply_config(&reloaded);
                }
            });
            Some(watcher)
        }
        (None, true) => {
            tracing::warn!("--watch ignored: no config file given");
            None
        }
        _ => None,
    };

    if args.status_interval_secs > 0 {
        let shield = shield.clone();
        let mut shutdown = shield.shutdown_handle().subscribe();
        let period = Duration::from_secs(args.status_interval_secs);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            loop {
                tokio::select! {
                    _ = ticker.tick() => log_status(&shield),
                    _ = shutdown.recv() => break,
                }
            }
        });
    }

    wait_for_signal().await;
    tracing::info!("Shutting down");
    shield.stop().await;

    tracing::info!("Shutdown complete");
    Ok(())
}

fn log_status(shield: &Shield) {
    let status = shield.status();
    let open_circuits = status
        .circuits
        .iter()
        .filter(|c| c.state == CircuitState::Open)
        .count();
    tracing::info!(
        overall = %status.health.overall,
        score = status.health.score,
        failover_state = %status.failover.state,
        active_endpoint = ?status.failover.active_endpoint,
        availability = status.failover.availability,
        cache_entries = status.cache.entries,
        cache_hit_rate = status.cache.hit_rate,
        open_circuits,
        "Shield status"
    );
}
