//! Load testing for backend-shield.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_util::future::join_all;
use serde_json::json;

use backend_shield::config::CacheConfig;
use backend_shield::{BackendError, PlanCache, Shield};

mod common;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_cache_under_concurrent_load() {
    let cache = Arc::new(PlanCache::new(CacheConfig {
        max_entries: 100,
        ..Default::default()
    }));

    let start = Instant::now();
    let tasks = (0..16).map(|worker| {
        let cache = cache.clone();
        tokio::spawn(async move {
            for i in 0..500 {
                let table = (worker * 500 + i) % 250;
                let query = format!("SELECT * FROM t{table} WHERE id = {i}");
                if cache.get(&query, &[]).is_none() {
                    cache.set(&query, &[], json!({ "scan": "index", "table": table }));
                }
            }
        })
    });
    for result in join_all(tasks).await {
        result.unwrap();
    }
    let elapsed = start.elapsed();

    let stats = cache.stats();
    println!("Cache load results:");
    println!("  Lookups: {}", stats.hits + stats.misses);
    println!("  Hit rate: {:.2}", stats.hit_rate);
    println!("  Evictions: {}", stats.evictions);
    println!("  Elapsed: {:?}", elapsed);

    assert_eq!(stats.hits + stats.misses, 16 * 500);
    assert!(stats.entries <= 100, "Entry limit exceeded: {}", stats.entries);
    assert!(stats.size_bytes <= stats.max_size_bytes);
    // Literals normalize away, so 250 distinct shapes compete for 100 slots.
    assert!(stats.evictions >= 150);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_retries_share_one_breaker() {
    let mut config = common::shield_config();
    config.retry.base_delay_ms = 1;
    config.retry.max_delay_ms = 5;
    config.circuit_breaker.failure_threshold = 1_000;
    let shield = Arc::new(Shield::new(&config).unwrap());

    let calls = Arc::new(AtomicU32::new(0));
    let tasks = (0..200).map(|_| {
        let shield = shield.clone();
        let calls = calls.clone();
        tokio::spawn(async move {
            let attempt = Arc::new(AtomicU32::new(0));
            shield
                .retry()
                .with_retry("hot_path", move || {
                    let calls = calls.clone();
                    let attempt = attempt.clone();
                    async move {
                        calls.fetch_add(1, Ordering::Relaxed);
                        if attempt.fetch_add(1, Ordering::Relaxed) == 0 {
                            Err(BackendError::timeout("statement timed out"))
                        } else {
                            Ok(())
                        }
                    }
                })
                .await
        })
    });

    let results = join_all(tasks).await;
    let successful = results
        .into_iter()
        .filter(|r| matches!(r, Ok(Ok(()))))
        .count();

    assert_eq!(successful, 200);
    assert_eq!(calls.load(Ordering::Relaxed), 400);

    let status = shield.retry().all_circuit_breaker_status();
    assert_eq!(status.len(), 1);
    assert_eq!(status[0].name, "hot_path");
    assert_eq!(status[0].total_calls, 400);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_leases_balance_under_load() {
    let shield = Arc::new(
        Shield::with_endpoint_probe(
            &common::shield_config(),
            Arc::new(common::ScriptedProbe::default()),
        )
        .unwrap(),
    );

    let tasks = (0..100).map(|_| {
        let shield = shield.clone();
        tokio::spawn(async move {
            let lease = shield.failover().acquire().unwrap();
            tokio::time::sleep(Duration::from_millis(5)).await;
            shield
                .failover()
                .report_success(lease.endpoint_id(), Duration::from_millis(5))
                .unwrap();
        })
    });
    for result in join_all(tasks).await {
        result.unwrap();
    }

    let active = shield.failover().active_endpoint().unwrap();
    assert_eq!(active.id, "eu");
    assert_eq!(active.in_flight(), 0);
    assert_eq!(active.success_count, 100);
    assert!(active.latency_ms.is_some());
}
