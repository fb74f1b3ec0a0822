//! Hot reload of `config.yaml`
//!
//! notify delivers raw filesystem events on its own thread. They are
//! forwarded as bare "dirty" pings to a reload task, which waits for the
//! burst to end, re-reads the file once and only yields configs that
//! parse, validate and differ from the last one delivered.

use anyhow::{Context, Result};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use super::AppConfig;

/// Quiet period after the last event before re-reading the file
const RELOAD_DEBOUNCE: Duration = Duration::from_millis(100);

pub struct ConfigWatcher {
    _watcher: RecommendedWatcher,
    rx: mpsc::Receiver<AppConfig>,
}

impl ConfigWatcher {
    /// Load the config at `config_path` and start watching it
    pub async fn new(config_path: impl Into<PathBuf>) -> Result<(Self, AppConfig)> {
        let config_path = config_path.into();

        let initial = AppConfig::load(&config_path)
            .await
            .context("Failed to load initial config")?;

        let (dirty_tx, dirty_rx) = mpsc::unbounded_channel::<()>();
        let (config_tx, config_rx) = mpsc::channel(4);

        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| match res {
            Ok(event) if matches!(event.kind, EventKind::Modify(_) | EventKind::Create(_)) => {
                debug!(paths = ?event.paths, "Config file touched");
                let _ = dirty_tx.send(());
            }
            Ok(_) => {}
            Err(e) => error!("Config watch error: {}", e),
        })?;

        watcher
            .watch(&config_path, RecursiveMode::NonRecursive)
            .with_context(|| format!("Failed to watch config file: {}", config_path.display()))?;

        tokio::spawn(reload_loop(
            config_path.clone(),
            initial.clone(),
            dirty_rx,
            config_tx,
        ));

        info!("Watching {} for changes", config_path.display());

        Ok((
            Self {
                _watcher: watcher,
                rx: config_rx,
            },
            initial,
        ))
    }

    /// Next changed config; None once the watcher is gone
    pub async fn next_config(&mut self) -> Option<AppConfig> {
        self.rx.recv().await
    }
}

async fn reload_loop(
    path: PathBuf,
    mut current: AppConfig,
    mut dirty_rx: mpsc::UnboundedReceiver<()>,
    config_tx: mpsc::Sender<AppConfig>,
) {
    while dirty_rx.recv().await.is_some() {
        // Editors often write in several steps; wait until they settle
        loop {
            match tokio::time::timeout(RELOAD_DEBOUNCE, dirty_rx.recv()).await {
                Ok(Some(())) => continue,
                Ok(None) => return,
                Err(_) => break,
            }
        }

        let next = match AppConfig::load(&path).await {
            Ok(next) => next,
            Err(e) => {
                warn!("Config reload rejected, keeping current settings: {:#}", e);
                continue;
            }
        };

        if next == current {
            debug!("Config file rewritten without changes");
            continue;
        }

        info!("Configuration reloaded");
        current = next.clone();
        if config_tx.send(next).await.is_err() {
            debug!("Config consumer gone, stopping reload task");
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::Strategy;
    use std::fs;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_config_watcher_reloads_engine_section() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let config_path = temp_dir.path().join("config.yaml");

        fs::write(&config_path, "engine:\n  pause_delay_ms: 2000\n")?;

        let (mut watcher, config) = ConfigWatcher::new(&config_path).await?;
        assert_eq!(config.engine.pause_delay_ms, 2000);

        tokio::time::sleep(Duration::from_millis(100)).await;
        fs::write(
            &config_path,
            "engine:\n  pause_delay_ms: 2500\n  strategy: immediate\n",
        )?;

        let new_config = tokio::time::timeout(Duration::from_secs(2), watcher.next_config()).await?;

        // Some platforms coalesce or drop events; only check what arrived
        if let Some(new_config) = new_config {
            assert_eq!(new_config.engine.pause_delay_ms, 2500);
            assert_eq!(new_config.engine.strategy, Strategy::Immediate);
        }

        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn test_reload_skips_invalid_and_unchanged_files() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let path = temp_dir.path().join("config.yaml");
        fs::write(&path, "engine:\n  pause_delay_ms: 2000\n")?;
        let initial = AppConfig::load(&path).await?;

        let (dirty_tx, dirty_rx) = mpsc::unbounded_channel();
        let (config_tx, mut config_rx) = mpsc::channel(4);
        tokio::spawn(reload_loop(path.clone(), initial, dirty_rx, config_tx));

        // Same content: nothing delivered
        dirty_tx.send(())?;
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert!(config_rx.try_recv().is_err());

        // Broken YAML: rejected, nothing delivered
        fs::write(&path, "engine: [\n")?;
        dirty_tx.send(())?;
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert!(config_rx.try_recv().is_err());

        // A burst of pings yields a single reload
        fs::write(&path, "engine:\n  pause_delay_ms: 4000\n")?;
        for _ in 0..5 {
            dirty_tx.send(())?;
        }
        let reloaded = config_rx.recv().await.context("reload expected")?;
        assert_eq!(reloaded.engine.pause_delay_ms, 4000);
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert!(config_rx.try_recv().is_err());

        Ok(())
    }

    #[tokio::test]
    async fn test_missing_file_fails() {
        let temp_dir = TempDir::new().unwrap();
        let result = ConfigWatcher::new(temp_dir.path().join("absent.yaml")).await;
        assert!(result.is_err());
    }
}
