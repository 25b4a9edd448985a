//! Configuration file watcher for hot reload.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use arc_swap::ArcSwap;
use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::{broadcast, mpsc};
use crate::config::loader::load_config;
use crate::config::schema::{EngineConfig, RuntimeSettings};

/// Monitors the configuration file and emits validated configs.
pub struct ConfigWatcher {
    path: PathBuf,
    update_tx: mpsc::UnboundedSender<EngineConfig>,
}

impl ConfigWatcher {
    /// Create a new ConfigWatcher.
    ///
    /// Returns the watcher and a receiver for configuration updates.
    pub fn new(path: &Path) -> (Self, mpsc::UnboundedReceiver<EngineConfig>) {
        let (update_tx, update_rx) = mpsc::unbounded_channel();

        (Self {
            path: path.to_path_buf(),
            update_tx,
        }, update_rx)
    }

    /// Start watching the file. The returned watcher must be kept alive.
    pub fn run(self) -> Result<RecommendedWatcher, notify::Error> {
        let tx = self.update_tx.clone();
        let path = self.path.clone();

        let mut watcher = RecommendedWatcher::new(move |res: notify::Result<Event>| {
            match res {
                Ok(event) => {
                    if event.kind.is_modify() || event.kind.is_create() {
                        tracing::info!("Config file change detected, reloading...");
                        match load_config(&path) {
                            Ok(new_config) => {
                                let _ = tx.send(new_config);
                            }
                            Err(e) => {
                                tracing::error!("Failed to reload config: {}. Keeping current settings.", e);
                            }
                        }
                    }
                }
                Err(e) => tracing::error!("Watch error: {:?}", e),
            }
        }, Config::default().with_poll_interval(Duration::from_secs(2)))?;

        watcher.watch(&self.path, RecursiveMode::NonRecursive)?;

        tracing::info!(path = ?self.path, "Config watcher started");
        Ok(watcher)
    }
}

/// Apply reloaded configs to the live runtime settings until shutdown.
pub async fn apply_updates(
    mut updates: mpsc::UnboundedReceiver<EngineConfig>,
    settings: Arc<ArcSwap<RuntimeSettings>>,
    mut shutdown: broadcast::Receiver<()>,
) {
    loop {
        tokio::select! {
            update = updates.recv() => {
                let Some(config) = update else { break };
                let next = config.runtime_settings();
                if **settings.load() == next {
                    tracing::debug!("Reloaded config has no runtime changes");
                    continue;
                }
                settings.store(Arc::new(next));
                tracing::info!(
                    escalation_threshold = config.risk.escalation_threshold,
                    default_min_approvers = config.policy.default_min_approvers,
                    "Runtime settings reloaded"
                );
            }
            _ = shutdown.recv() => break,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_apply_updates_swaps_settings() {
        let settings = Arc::new(ArcSwap::from_pointee(RuntimeSettings::default()));
        let (tx, rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);

        let task = tokio::spawn(apply_updates(rx, settings.clone(), shutdown_rx));

        let mut config = EngineConfig::default();
        config.risk.escalation_threshold = 55;
        tx.send(config).unwrap();
        drop(tx);
        task.await.unwrap();
        drop(shutdown_tx);

        assert_eq!(settings.load().risk.escalation_threshold, 55);
    }
}
