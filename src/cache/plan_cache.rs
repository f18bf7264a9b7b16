//! Bounded query plan cache.
//!
//! # Responsibilities
//! - Cache compiled artifacts keyed by (query, parameters)
//! - Enforce entry-count and byte budgets through the configured policy
//! - Expire entries after their TTL; a background sweep reclaims them
//!
//! # Design Decisions
//! - One mutex around the whole table: eviction needs a consistent view of
//!   every entry and of the byte total
//! - Misses and rejections are normal outcomes, never errors
//! - Subscribers are notified after the lock is released

use std::collections::HashMap;
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde::Serialize;
use serde_json::Value;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant};

use crate::cache::normalize::normalize_query;
use crate::cache::policy::{Candidate, EvictionPolicy};
use crate::clock::{unix_millis, unix_millis_ago};
use crate::config::CacheConfig;
use crate::health::HealthLevel;
use crate::lifecycle::PassGuard;
use crate::observability::{metrics, SubscriptionId, Subscribers};

/// Size charged for values that cannot be serialized.
const UNSERIALIZABLE_SIZE: usize = 1024;

/// A cached value and its bookkeeping.
#[derive(Debug, Clone, Serialize)]
pub struct CacheEntry<V> {
    pub key: String,
    /// The query as first stored.
    pub query: String,
    pub value: V,
    /// Epoch millis.
    pub compiled_at_ms: u64,
    /// Epoch millis.
    pub last_used_ms: u64,
    pub hit_count: u64,
    pub size_bytes: usize,
    pub ttl_ms: u64,

    #[serde(skip)]
    compiled_at: Instant,
    #[serde(skip)]
    ttl: Duration,
    #[serde(skip)]
    inserted_seq: u64,
    #[serde(skip)]
    last_used_seq: u64,
}

impl<V> CacheEntry<V> {
    fn is_expired(&self, now: Instant) -> bool {
        now.duration_since(self.compiled_at) > self.ttl
    }

    fn candidate(&self) -> Candidate<'_> {
        Candidate {
            key: &self.key,
            inserted_seq: self.inserted_seq,
            last_used_seq: self.last_used_seq,
            hit_count: self.hit_count,
        }
    }
}

/// Cache activity pushed to subscribers.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CacheEvent {
    Hit { key: String },
    Miss { key: String },
    Stored { key: String, size_bytes: usize },
    Evicted { key: String, policy: EvictionPolicy },
    Expired { key: String },
    Rejected { key: String, size_bytes: usize },
    Invalidated { table: Option<String>, count: usize },
}

#[derive(Debug, Clone, Serialize)]
pub struct CacheStats {
    pub entries: usize,
    pub max_entries: usize,
    pub size_bytes: usize,
    pub max_size_bytes: usize,
    /// Percent of the byte budget in use.
    pub memory_utilization: f64,
    pub hits: u64,
    pub misses: u64,
    /// hits / (hits + misses); 0 before any lookup.
    pub hit_rate: f64,
    pub evictions: u64,
    pub expirations: u64,
    pub rejections: u64,
    pub eviction_policy: EvictionPolicy,
    /// Epoch millis of the oldest resident entry.
    pub oldest_entry_ms: Option<u64>,
    /// Epoch millis of the newest resident entry.
    pub newest_entry_ms: Option<u64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CacheHealth {
    pub level: HealthLevel,
    pub memory_utilization: f64,
    pub hit_rate: f64,
    pub message: String,
}

enum Lookup<V> {
    Live(V),
    Expired,
    Absent,
}

struct CacheState<V> {
    entries: HashMap<String, CacheEntry<V>>,
    size_bytes: usize,
    seq: u64,
    hits: u64,
    misses: u64,
    evictions: u64,
    expirations: u64,
    rejections: u64,
}

impl<V> CacheState<V> {
    fn next_seq(&mut self) -> u64 {
        self.seq += 1;
        self.seq
    }

    fn remove(&mut self, key: &str) -> Option<CacheEntry<V>> {
        let entry = self.entries.remove(key)?;
        self.size_bytes = self.size_bytes.saturating_sub(entry.size_bytes);
        Some(entry)
    }
}

/// Fixed-budget cache of compiled query artifacts.
pub struct QueryPlanCache<V> {
    config: CacheConfig,
    state: Mutex<CacheState<V>>,
    subscribers: Subscribers<CacheEvent>,
    sweeping: AtomicBool,
}

impl<V> QueryPlanCache<V>
where
    V: Clone + Serialize + Send + Sync + 'static,
{
    pub fn new(config: CacheConfig) -> Self {
        Self {
            config,
            state: Mutex::new(CacheState {
                entries: HashMap::new(),
                size_bytes: 0,
                seq: 0,
                hits: 0,
                misses: 0,
                evictions: 0,
                expirations: 0,
                rejections: 0,
            }),
            subscribers: Subscribers::new(),
            sweeping: AtomicBool::new(false),
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    fn lock(&self) -> MutexGuard<'_, CacheState<V>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn notify(&self, events: Vec<CacheEvent>) {
        if self.subscribers.is_empty() {
            return;
        }
        for event in &events {
            self.subscribers.notify(event);
        }
    }

    /// The key an entry for (query, params) is stored under.
    pub fn lookup_key(&self, query: &str, params: &[Value]) -> String {
        if self.config.normalize_queries {
            format!("{}|{}", normalize_query(query), params.len())
        } else {
            let params = serde_json::to_string(params).unwrap_or_default();
            format!("{query}|{params}")
        }
    }

    /// Look up a live entry, recording a hit or a miss.
    pub fn get(&self, query: &str, params: &[Value]) -> Option<V> {
        let key = self.lookup_key(query, params);
        let now = Instant::now();
        let mut events = Vec::with_capacity(2);

        let result = {
            let mut state = self.lock();
            let seq = state.next_seq();
            let lookup = match state.entries.get_mut(&key) {
                Some(entry) if !entry.is_expired(now) => {
                    entry.hit_count += 1;
                    entry.last_used_seq = seq;
                    entry.last_used_ms = unix_millis();
                    Lookup::Live(entry.value.clone())
                }
                Some(_) => Lookup::Expired,
                None => Lookup::Absent,
            };

            match lookup {
                Lookup::Live(value) => {
                    state.hits += 1;
                    events.push(CacheEvent::Hit { key });
                    metrics::record_cache_lookup(true);
                    Some(value)
                }
                Lookup::Expired => {
                    state.remove(&key);
                    state.expirations += 1;
                    state.misses += 1;
                    events.push(CacheEvent::Expired { key: key.clone() });
                    events.push(CacheEvent::Miss { key });
                    metrics::record_cache_lookup(false);
                    None
                }
                Lookup::Absent => {
                    state.misses += 1;
                    events.push(CacheEvent::Miss { key });
                    metrics::record_cache_lookup(false);
                    None
                }
            }
        };

        self.notify(events);
        result
    }

    /// Look at an entry without counting a lookup.
    pub fn entry(&self, query: &str, params: &[Value]) -> Option<CacheEntry<V>> {
        let key = self.lookup_key(query, params);
        let now = Instant::now();
        self.lock()
            .entries
            .get(&key)
            .filter(|e| !e.is_expired(now))
            .cloned()
    }

    /// Store with the configured TTL. Returns false if the value was rejected.
    pub fn set(&self, query: &str, params: &[Value], value: V) -> bool {
        self.set_with_ttl(query, params, value, self.config.ttl())
    }

    /// Store with an explicit TTL. Returns false if the value was rejected.
    pub fn set_with_ttl(&self, query: &str, params: &[Value], value: V, ttl: Duration) -> bool {
        let key = self.lookup_key(query, params);
        let size_bytes = estimate_size(&key, &value);

        if size_bytes > self.config.max_size_bytes / 2 {
            self.lock().rejections += 1;
            tracing::warn!(
                key = %key,
                size_bytes,
                max_size_bytes = self.config.max_size_bytes,
                "Cache entry rejected: larger than half the byte budget"
            );
            self.notify(vec![CacheEvent::Rejected { key, size_bytes }]);
            return false;
        }

        let policy = self.config.eviction_policy;
        let mut events = Vec::new();
        {
            let mut state = self.lock();
            state.remove(&key);

            while !state.entries.is_empty()
                && (state.entries.len() >= self.config.max_entries
                    || state.size_bytes + size_bytes > self.config.max_size_bytes)
            {
                let victim = policy
                    .victim(state.entries.values().map(CacheEntry::candidate))
                    .map(str::to_string);
                let Some(victim) = victim else { break };
                state.remove(&victim);
                state.evictions += 1;
                metrics::record_cache_eviction(policy.as_str());
                tracing::debug!(key = %victim, policy = %policy, "Cache entry evicted");
                events.push(CacheEvent::Evicted { key: victim, policy });
            }

            let seq = state.next_seq();
            let now_ms = unix_millis();
            state.entries.insert(
                key.clone(),
                CacheEntry {
                    key: key.clone(),
                    query: query.to_string(),
                    value,
                    compiled_at_ms: now_ms,
                    last_used_ms: now_ms,
                    hit_count: 0,
                    size_bytes,
                    ttl_ms: ttl.as_millis() as u64,
                    compiled_at: Instant::now(),
                    ttl,
                    inserted_seq: seq,
                    last_used_seq: seq,
                },
            );
            state.size_bytes += size_bytes;
            metrics::record_cache_size(state.size_bytes, state.entries.len());
        }

        events.push(CacheEvent::Stored { key, size_bytes });
        self.notify(events);
        true
    }

    /// Remove the entry for (query, params).
    pub fn invalidate(&self, query: &str, params: &[Value]) -> bool {
        let key = self.lookup_key(query, params);
        let removed = self.lock().remove(&key).is_some();
        if removed {
            self.notify(vec![CacheEvent::Invalidated { table: None, count: 1 }]);
        }
        removed
    }

    /// Remove every entry whose query mentions `table` (case-insensitive).
    pub fn invalidate_table(&self, table: &str) -> usize {
        let needle = table.to_lowercase();
        let count = {
            let mut state = self.lock();
            let doomed: Vec<String> = state
                .entries
                .values()
                .filter(|e| e.query.to_lowercase().contains(&needle))
                .map(|e| e.key.clone())
                .collect();
            for key in &doomed {
                state.remove(key);
            }
            metrics::record_cache_size(state.size_bytes, state.entries.len());
            doomed.len()
        };

        tracing::debug!(table, count, "Cache invalidated by table");
        self.notify(vec![CacheEvent::Invalidated {
            table: Some(table.to_string()),
            count,
        }]);
        count
    }

    /// Drop every entry. Counters are kept.
    pub fn clear(&self) -> usize {
        let count = {
            let mut state = self.lock();
            let count = state.entries.len();
            state.entries.clear();
            state.size_bytes = 0;
            metrics::record_cache_size(0, 0);
            count
        };
        self.notify(vec![CacheEvent::Invalidated { table: None, count }]);
        count
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remove every entry past its TTL. Returns how many were removed.
    pub fn sweep_expired(&self) -> usize {
        let now = Instant::now();
        let expired: Vec<String> = {
            let mut state = self.lock();
            let expired: Vec<String> = state
                .entries
                .values()
                .filter(|e| e.is_expired(now))
                .map(|e| e.key.clone())
                .collect();
            for key in &expired {
                state.remove(key);
            }
            state.expirations += expired.len() as u64;
            metrics::record_cache_size(state.size_bytes, state.entries.len());
            expired
        };

        let count = expired.len();
        if count > 0 {
            tracing::debug!(count, "Expired cache entries swept");
        }
        self.notify(
            expired
                .into_iter()
                .map(|key| CacheEvent::Expired { key })
                .collect(),
        );
        count
    }

    /// Start the periodic expiry sweep.
    pub fn spawn_sweeper(self: &Arc<Self>, mut shutdown: broadcast::Receiver<()>) -> JoinHandle<()> {
        let cache = self.clone();
        tokio::spawn(async move {
            let mut ticker = time::interval(cache.config.sweep_interval());
            // The first tick completes immediately; nothing can be expired yet.
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if let Some(_pass) = PassGuard::enter(&cache.sweeping) {
                            cache.sweep_expired();
                        }
                    }
                    _ = shutdown.recv() => {
                        tracing::info!("Cache sweeper received shutdown signal, exiting loop");
                        break;
                    }
                }
            }
        })
    }

    pub fn stats(&self) -> CacheStats {
        let state = self.lock();
        let lookups = state.hits + state.misses;
        let hit_rate = if lookups == 0 {
            0.0
        } else {
            state.hits as f64 / lookups as f64
        };

        let now = Instant::now();
        let ages = state.entries.values().map(|e| now.duration_since(e.compiled_at));
        let oldest = ages.clone().max().map(unix_millis_ago);
        let newest = ages.min().map(unix_millis_ago);

        CacheStats {
            entries: state.entries.len(),
            max_entries: self.config.max_entries,
            size_bytes: state.size_bytes,
            max_size_bytes: self.config.max_size_bytes,
            memory_utilization: utilization(state.size_bytes, self.config.max_size_bytes),
            hits: state.hits,
            misses: state.misses,
            hit_rate,
            evictions: state.evictions,
            expirations: state.expirations,
            rejections: state.rejections,
            eviction_policy: self.config.eviction_policy,
            oldest_entry_ms: oldest,
            newest_entry_ms: newest,
        }
    }

    /// Critical above 90% memory or below 30% hit rate; degraded above 75%
    /// or below 50%. Hit rate only counts once a lookup happened.
    pub fn health_status(&self) -> CacheHealth {
        let stats = self.stats();
        let looked_up = stats.hits + stats.misses > 0;
        let memory = stats.memory_utilization;
        let hit_rate = stats.hit_rate;

        let (level, message) = if memory > 90.0 || (looked_up && hit_rate < 0.3) {
            (
                HealthLevel::Critical,
                format!("memory {memory:.1}%, hit rate {:.1}%", hit_rate * 100.0),
            )
        } else if memory > 75.0 || (looked_up && hit_rate < 0.5) {
            (
                HealthLevel::Degraded,
                format!("memory {memory:.1}%, hit rate {:.1}%", hit_rate * 100.0),
            )
        } else {
            (HealthLevel::Healthy, "cache operating normally".to_string())
        };

        CacheHealth {
            level,
            memory_utilization: memory,
            hit_rate,
            message,
        }
    }

    /// Subscribe to cache events.
    pub fn on_event<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(&CacheEvent) + Send + Sync + 'static,
    {
        self.subscribers.subscribe(callback)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.subscribers.unsubscribe(id)
    }
}

fn estimate_size<V: Serialize>(key: &str, value: &V) -> usize {
    let value_size = serde_json::to_vec(value)
        .map(|bytes| bytes.len())
        .unwrap_or(UNSERIALIZABLE_SIZE);
    value_size + key.len()
}

fn utilization(used: usize, limit: usize) -> f64 {
    if limit == 0 {
        return 100.0;
    }
    used as f64 / limit as f64 * 100.0
}
