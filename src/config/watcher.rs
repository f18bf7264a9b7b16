//! Configuration file watcher for hot reload.
//!
//! # Data Flow
//! ```text
//! notify event (modify/create)
//!     → reload loop (tokio task), waits for a quiet period
//!     → load_config (parse + validate)
//!     → diff against the last applied config, per section
//!     → send only when a section changed
//! ```
//!
//! # Design Decisions
//! - Editors save in bursts of events; one reload per burst
//! - An invalid file is logged and the last good config stays in effect

use std::path::{Path, PathBuf};
use std::time::Duration;

use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tokio::time;

use crate::config::loader::load_config;
use crate::config::schema::ShieldConfig;

/// Quiet period after the last file event before reloading.
const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(500);

/// Names of the top-level sections that differ between two configs.
pub fn changed_sections(old: &ShieldConfig, new: &ShieldConfig) -> Vec<&'static str> {
    let mut changed = Vec::new();
    if old.circuit_breaker != new.circuit_breaker {
        changed.push("circuit_breaker");
    }
    if old.retry != new.retry {
        changed.push("retry");
    }
    if old.failover != new.failover {
        changed.push("failover");
    }
    if old.cache != new.cache {
        changed.push("cache");
    }
    if old.health != new.health {
        changed.push("health");
    }
    if old.observability != new.observability {
        changed.push("observability");
    }
    changed
}

/// Monitors the configuration file and emits validated, changed reloads.
pub struct ConfigWatcher {
    path: PathBuf,
    current: ShieldConfig,
    debounce: Duration,
    update_tx: mpsc::UnboundedSender<ShieldConfig>,
}

impl ConfigWatcher {
    /// Create a watcher for `path`, starting from the config already applied.
    pub fn new(
        path: &Path,
        current: ShieldConfig,
    ) -> (Self, mpsc::UnboundedReceiver<ShieldConfig>) {
        let (update_tx, update_rx) = mpsc::unbounded_channel();
        (
            Self {
                path: path.to_path_buf(),
                current,
                debounce: DEFAULT_DEBOUNCE,
                update_tx,
            },
            update_rx,
        )
    }

    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }

    /// Start watching. Must be called inside a tokio runtime; the returned
    /// watcher must be kept alive.
    pub fn run(self) -> Result<RecommendedWatcher, notify::Error> {
        let (event_tx, event_rx) = mpsc::unbounded_channel();

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) if event.kind.is_modify() || event.kind.is_create() => {
                    let _ = event_tx.send(());
                }
                Ok(_) => {}
                Err(e) => tracing::error!(error = ?e, "Config watch error"),
            },
            Config::default().with_poll_interval(Duration::from_secs(2)),
        )?;
        watcher.watch(&self.path, RecursiveMode::NonRecursive)?;

        tracing::info!(
            path = ?self.path,
            debounce_ms = self.debounce.as_millis() as u64,
            "Config watcher started"
        );
        tokio::spawn(self.reload_loop(event_rx));
        Ok(watcher)
    }

    async fn reload_loop(mut self, mut events: mpsc::UnboundedReceiver<()>) {
        while events.recv().await.is_some() {
            loop {
                match time::timeout(self.debounce, events.recv()).await {
                    Ok(Some(())) => continue,
                    Ok(None) => return,
                    Err(_) => break,
                }
            }
            self.reload();
        }
    }

    /// Load the file and forward it if any section changed.
    ///
    /// Returns the changed sections.
    fn reload(&mut self) -> Vec<&'static str> {
        let new_config = match load_config(&self.path) {
            Ok(config) => config,
            Err(e) => {
                tracing::error!(path = ?self.path, error = %e, "Failed to reload config, keeping current configuration");
                return Vec::new();
            }
        };

        let changed = changed_sections(&self.current, &new_config);
        if changed.is_empty() {
            tracing::debug!(path = ?self.path, "Config file touched, no section changed");
            return changed;
        }

        tracing::info!(path = ?self.path, sections = ?changed, "Config reloaded");
        self.current = new_config.clone();
        if self.update_tx.send(new_config).is_err() {
            tracing::debug!("Config update receiver dropped");
        }
        changed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn temp_config(content: &str) -> PathBuf {
        let path = std::env::temp_dir().join(format!("shield-watch-{}.toml", uuid::Uuid::new_v4()));
        fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_changed_sections() {
        let old = ShieldConfig::default();
        let mut new = old.clone();
        assert!(changed_sections(&old, &new).is_empty());

        new.retry.max_attempts = 9;
        new.cache.max_entries = 10;
        assert_eq!(changed_sections(&old, &new), vec!["retry", "cache"]);
    }

    #[test]
    fn test_reload_forwards_only_changes() {
        let path = temp_config("[retry]\nmax_attempts = 3\n");
        let (mut watcher, mut rx) = ConfigWatcher::new(&path, ShieldConfig::default());

        // Same values as the defaults.
        assert!(watcher.reload().is_empty());
        assert!(rx.try_recv().is_err());

        fs::write(&path, "[retry]\nmax_attempts = 7\n").unwrap();
        assert_eq!(watcher.reload(), vec!["retry"]);
        assert_eq!(rx.try_recv().unwrap().retry.max_attempts, 7);

        // Invalid file keeps the last good config.
        fs::write(&path, "[retry]\nmax_attempts = 0\n").unwrap();
        assert!(watcher.reload().is_empty());
        assert!(rx.try_recv().is_err());
        assert_eq!(watcher.current.retry.max_attempts, 7);

        fs::remove_file(&path).unwrap_or_default();
    }

    #[tokio::test(start_paused = true)]
    async fn test_event_burst_reloads_once() {
        let path = temp_config("[cache]\nmax_entries = 5\n");
        let (watcher, mut rx) = ConfigWatcher::new(&path, ShieldConfig::default());
        let watcher = watcher.with_debounce(Duration::from_millis(200));

        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let handle = tokio::spawn(watcher.reload_loop(event_rx));

        for _ in 0..3 {
            event_tx.send(()).unwrap();
            time::sleep(Duration::from_millis(50)).await;
        }
        time::sleep(Duration::from_millis(300)).await;

        assert_eq!(rx.recv().await.unwrap().cache.max_entries, 5);
        assert!(rx.try_recv().is_err());

        drop(event_tx);
        handle.await.unwrap();
        fs::remove_file(&path).unwrap_or_default();
    }
}
