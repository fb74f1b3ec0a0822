//! Configuration management for Still Music
//!
//! Handles loading, parsing, and hot-reloading of the YAML configuration
//! file. Every section has defaults, so an empty file is a valid config.

pub mod watcher;

use crate::engine::{EngineSettings, Strategy};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tokio::fs;

pub use watcher::ConfigWatcher;

/// Root configuration structure
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct AppConfig {
    pub player: PlayerConfig,
    pub engine: EngineConfig,
    pub detector: DetectorConfig,
}

/// How the managed player is driven
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PlayerKind {
    /// External commands (playerctl, osascript, ...)
    #[default]
    Command,
    /// Simulated in-process player
    Console,
}

/// Managed player configuration
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct PlayerConfig {
    pub kind: PlayerKind,
    /// Display name
    pub name: String,
    /// Application ids that belong to the managed player (substring, case-insensitive)
    pub identifiers: Vec<String>,
    pub commands: PlayerCommandsConfig,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            kind: PlayerKind::Command,
            name: "spotify".to_string(),
            identifiers: vec!["spotify".to_string()],
            commands: PlayerCommandsConfig::default(),
        }
    }
}

/// Argv commands used by the command player
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct PlayerCommandsConfig {
    /// Prints the playback status on stdout
    pub status: Vec<String>,
    pub pause: Vec<String>,
    pub play: Vec<String>,
    /// Optional liveness check; the status command's exit code is used otherwise
    pub running: Option<Vec<String>>,
    /// Status output meaning "playing"
    pub playing_output: String,
}

impl Default for PlayerCommandsConfig {
    fn default() -> Self {
        let playerctl = |action: &str| -> Vec<String> {
            ["playerctl", "-p", "spotify", action]
                .iter()
                .map(|s| s.to_string())
                .collect()
        };
        Self {
            status: playerctl("status"),
            pause: playerctl("pause"),
            play: playerctl("play"),
            running: None,
            playing_output: "Playing".to_string(),
        }
    }
}

/// Engine timing and strategy
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct EngineConfig {
    pub strategy: Strategy,
    pub pause_delay_ms: u64,
    pub resume_delay_ms: u64,
    pub poll_interval_ms: u64,
    pub controller_timeout_ms: u64,
    pub settle_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            strategy: Strategy::Debounce,
            pause_delay_ms: 3000,
            resume_delay_ms: 3000,
            poll_interval_ms: 1000,
            controller_timeout_ms: 2000,
            settle_ms: 1000,
        }
    }
}

impl EngineConfig {
    pub fn to_settings(&self) -> EngineSettings {
        EngineSettings {
            strategy: self.strategy,
            pause_delay: Duration::from_millis(self.pause_delay_ms),
            resume_delay: Duration::from_millis(self.resume_delay_ms),
            poll_interval: Duration::from_millis(self.poll_interval_ms),
            controller_timeout: Duration::from_millis(self.controller_timeout_ms),
            settle: Duration::from_millis(self.settle_ms),
        }
    }
}

/// Where other-audio signals come from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectorKind {
    /// Poll a now-playing command
    #[default]
    NowPlaying,
    /// Only reports typed into the console
    Manual,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct DetectorConfig {
    pub kind: DetectorKind,
    pub command: Vec<String>,
    pub interval_ms: u64,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            kind: DetectorKind::NowPlaying,
            command: vec!["media-control".to_string(), "get".to_string()],
            interval_ms: 500,
        }
    }
}

impl AppConfig {
    /// Load configuration from file with validation
    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config = Self::parse(&contents)
            .with_context(|| format!("Failed to parse YAML config: {}", path.display()))?;

        config.validate()?;

        Ok(config)
    }

    /// Parse YAML text; blank input yields the defaults
    pub fn parse(contents: &str) -> Result<Self> {
        if contents.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(contents)?)
    }

    /// Save configuration to file
    pub async fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let yaml = self.to_yaml()?;

        fs::write(path, yaml)
            .await
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        Ok(())
    }

    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self).context("Failed to serialize config to YAML")
    }

    /// Validate configuration for correctness and consistency
    pub fn validate(&self) -> Result<()> {
        if self.player.name.trim().is_empty() {
            anyhow::bail!("player.name cannot be empty");
        }

        if self.player.kind == PlayerKind::Command {
            let commands = &self.player.commands;
            for (field, argv) in [
                ("status", &commands.status),
                ("pause", &commands.pause),
                ("play", &commands.play),
            ] {
                validate_argv(argv).with_context(|| format!("Invalid player.commands.{}", field))?;
            }
            if let Some(running) = &commands.running {
                validate_argv(running).context("Invalid player.commands.running")?;
            }
            if commands.playing_output.trim().is_empty() {
                anyhow::bail!("player.commands.playing_output cannot be empty");
            }
        }

        if self.engine.poll_interval_ms == 0 {
            anyhow::bail!("engine.poll_interval_ms must be greater than 0");
        }
        if self.engine.controller_timeout_ms == 0 {
            anyhow::bail!("engine.controller_timeout_ms must be greater than 0");
        }

        if self.detector.kind == DetectorKind::NowPlaying {
            validate_argv(&self.detector.command).context("Invalid detector.command")?;
            if self.detector.interval_ms == 0 {
                anyhow::bail!("detector.interval_ms must be greater than 0");
            }
        }

        Ok(())
    }

    /// Whether moving to `other` needs a restart to take full effect
    ///
    /// Only the engine section is applied live.
    pub fn restart_required(&self, other: &AppConfig) -> bool {
        self.player != other.player || self.detector != other.detector
    }
}

fn validate_argv(argv: &[String]) -> Result<()> {
    match argv.first() {
        None => anyhow::bail!("command cannot be empty"),
        Some(program) if program.trim().is_empty() => {
            anyhow::bail!("command program cannot be blank")
        }
        Some(_) => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = AppConfig::parse("").unwrap();
        assert_eq!(config, AppConfig::default());
        config.validate().unwrap();

        let settings = config.engine.to_settings();
        assert_eq!(settings, EngineSettings::default());
    }

    #[test]
    fn test_partial_config() {
        let config = AppConfig::parse(
            r#"
player:
  kind: console
  name: Music
engine:
  strategy: immediate
  pause_delay_ms: 1500
detector:
  kind: manual
"#,
        )
        .unwrap();

        assert_eq!(config.player.kind, PlayerKind::Console);
        assert_eq!(config.player.name, "Music");
        assert_eq!(config.player.identifiers, vec!["spotify".to_string()]);
        assert_eq!(config.engine.strategy, Strategy::Immediate);
        assert_eq!(config.engine.pause_delay_ms, 1500);
        assert_eq!(config.engine.resume_delay_ms, 3000);
        assert_eq!(config.detector.kind, DetectorKind::Manual);
        assert_eq!(config.detector.interval_ms, 500);
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let mut config = AppConfig::default();
        config.engine.poll_interval_ms = 0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.player.commands.pause = Vec::new();
        let err = config.validate().unwrap_err();
        assert!(format!("{:#}", err).contains("player.commands.pause"));

        let mut config = AppConfig::default();
        config.detector.interval_ms = 0;
        assert!(config.validate().is_err());

        // Manual detectors don't need a command
        let mut config = AppConfig::default();
        config.detector.kind = DetectorKind::Manual;
        config.detector.command = Vec::new();
        config.validate().unwrap();
    }

    #[test]
    fn test_restart_required() {
        let base = AppConfig::default();

        let mut engine_only = base.clone();
        engine_only.engine.pause_delay_ms = 5000;
        assert!(!base.restart_required(&engine_only));

        let mut player_changed = base.clone();
        player_changed.player.name = "vlc".to_string();
        assert!(base.restart_required(&player_changed));
    }

    #[tokio::test]
    async fn test_save_and_load() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let path = temp_dir.path().join("config.yaml");

        let mut config = AppConfig::default();
        config.engine.resume_delay_ms = 4500;
        config.player.commands.running = Some(vec!["pgrep".to_string(), "spotify".to_string()]);
        config.save(&path).await?;

        let loaded = AppConfig::load(&path).await?;
        assert_eq!(loaded, config);
        Ok(())
    }

    #[tokio::test]
    async fn test_load_rejects_invalid_file() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let path = temp_dir.path().join("config.yaml");
        std::fs::write(&path, "engine:\n  controller_timeout_ms: 0\n")?;

        assert!(AppConfig::load(&path).await.is_err());
        assert!(AppConfig::load(temp_dir.path().join("missing.yaml")).await.is_err());
        Ok(())
    }
}
