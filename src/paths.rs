//! Config file location for development, portable and installed modes.
//!
//! ## Mode Detection
//!
//! - **Dev mode** (debug builds only): `config.yaml` in the current working
//!   directory, which is what `cargo run` from the repo root finds.
//! - **Portable mode**: a `.portable` marker file next to the executable
//!   keeps the config in the same directory.
//! - **Installed mode** (default): the platform config directory, e.g.
//!   `~/.config/still-music` or `~/Library/Application Support/still-music`.

use crate::config::AppConfig;
use anyhow::Context;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Application name used for directories in installed mode
const APP_NAME: &str = "still-music";

const CONFIG_FILE: &str = "config.yaml";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppPaths {
    /// Path to the configuration file
    pub config: PathBuf,
    /// Whether the config lives next to the exe (or in the cwd)
    pub is_portable: bool,
}

impl AppPaths {
    /// Detect the config location based on the environment.
    pub fn detect() -> Self {
        let exe_dir = std::env::current_exe()
            .ok()
            .and_then(|p| p.parent().map(|p| p.to_path_buf()))
            .unwrap_or_else(|| PathBuf::from("."));

        #[cfg(debug_assertions)]
        {
            let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
            let cwd_config = cwd.join(CONFIG_FILE);
            if cwd_config.exists() {
                info!("Running in DEV mode (config.yaml found in {})", cwd.display());
                return Self {
                    config: cwd_config,
                    is_portable: true,
                };
            }
        }

        Self::resolve(&exe_dir, dirs::config_dir())
    }

    /// Pick portable or installed mode for a given exe directory
    fn resolve(exe_dir: &Path, config_dir: Option<PathBuf>) -> Self {
        if exe_dir.join(".portable").exists() {
            info!("Running in PORTABLE mode (.portable marker found)");
            return Self {
                config: exe_dir.join(CONFIG_FILE),
                is_portable: true,
            };
        }

        let base = config_dir
            .unwrap_or_else(|| {
                warn!("No platform config dir, falling back to exe dir");
                exe_dir.to_path_buf()
            })
            .join(APP_NAME);

        Self {
            config: base.join(CONFIG_FILE),
            is_portable: false,
        }
    }

    /// Directory holding the config file (for display in logs)
    pub fn base_dir(&self) -> PathBuf {
        self.config
            .parent()
            .map(|p| p.to_path_buf())
            .unwrap_or_else(|| PathBuf::from("."))
    }

    /// Make sure an installed-mode config exists, writing defaults if needed
    ///
    /// Returns true when a new file was written.
    pub async fn ensure_config(&self) -> anyhow::Result<bool> {
        if self.is_portable || self.config.exists() {
            return Ok(false);
        }

        let dir = self.base_dir();
        debug!("Creating config directory: {}", dir.display());
        tokio::fs::create_dir_all(&dir)
            .await
            .with_context(|| format!("Failed to create config directory: {}", dir.display()))?;

        AppConfig::default().save(&self.config).await?;
        info!("Wrote default config to {}", self.config.display());
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_portable_marker() {
        let exe_dir = TempDir::new().unwrap();
        std::fs::write(exe_dir.path().join(".portable"), "").unwrap();

        let paths = AppPaths::resolve(exe_dir.path(), Some(PathBuf::from("/nonexistent")));
        assert!(paths.is_portable);
        assert_eq!(paths.config, exe_dir.path().join("config.yaml"));
    }

    #[test]
    fn test_installed_mode_uses_config_dir() {
        let exe_dir = TempDir::new().unwrap();
        let config_dir = TempDir::new().unwrap();

        let paths = AppPaths::resolve(exe_dir.path(), Some(config_dir.path().to_path_buf()));
        assert!(!paths.is_portable);
        assert_eq!(
            paths.config,
            config_dir.path().join("still-music").join("config.yaml")
        );
    }

    #[tokio::test]
    async fn test_ensure_config_writes_defaults_once() {
        let exe_dir = TempDir::new().unwrap();
        let config_dir = TempDir::new().unwrap();
        let paths = AppPaths::resolve(exe_dir.path(), Some(config_dir.path().to_path_buf()));

        assert!(paths.ensure_config().await.unwrap());
        assert!(!paths.ensure_config().await.unwrap());

        let loaded = AppConfig::load(&paths.config).await.unwrap();
        assert_eq!(loaded, AppConfig::default());
    }
}
