//! Command player - controls the managed player through external commands
//!
//! Each operation runs a configured argv (for example `playerctl -p spotify
//! pause`). The status command's stdout is compared against the configured
//! "playing" token. Child processes are killed if the engine abandons a
//! call on timeout.

use crate::config::PlayerCommandsConfig;
use crate::player::{ControllerError, PlayerController};
use async_trait::async_trait;
use std::process::{Output, Stdio};
use tokio::process::Command;
use tracing::{debug, trace};

pub struct CommandPlayer {
    name: String,
    commands: PlayerCommandsConfig,
}

impl CommandPlayer {
    pub fn new(name: impl Into<String>, commands: PlayerCommandsConfig) -> Self {
        Self {
            name: name.into(),
            commands,
        }
    }

    async fn run(&self, argv: &[String]) -> Result<Output, ControllerError> {
        let (program, args) = argv
            .split_first()
            .ok_or_else(|| ControllerError::CommandFailed {
                command: String::new(),
                reason: "empty command".to_string(),
            })?;

        trace!(player = %self.name, command = %argv.join(" "), "Running player command");

        let output = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await?;

        Ok(output)
    }

    /// Run a command and require a zero exit status
    async fn run_checked(&self, argv: &[String]) -> Result<Output, ControllerError> {
        let output = self.run(argv).await?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            return Err(ControllerError::CommandFailed {
                command: argv.join(" "),
                reason: if stderr.is_empty() {
                    format!("exit status {}", output.status)
                } else {
                    stderr
                },
            });
        }
        Ok(output)
    }
}

#[async_trait]
impl PlayerController for CommandPlayer {
    fn name(&self) -> &str {
        &self.name
    }

    async fn is_running(&self) -> Result<bool, ControllerError> {
        let argv = self
            .commands
            .running
            .as_deref()
            .unwrap_or(self.commands.status.as_slice());
        let output = self.run(argv).await?;
        Ok(output.status.success())
    }

    async fn is_playing(&self) -> Result<bool, ControllerError> {
        let output = self.run_checked(&self.commands.status).await?;
        let stdout = String::from_utf8_lossy(&output.stdout);
        let status = stdout.trim();
        if status.is_empty() {
            return Err(ControllerError::UnexpectedOutput {
                command: self.commands.status.join(" "),
                output: String::new(),
            });
        }
        debug!(player = %self.name, status, "Player status");
        Ok(status.eq_ignore_ascii_case(self.commands.playing_output.trim()))
    }

    async fn pause(&self) -> Result<(), ControllerError> {
        self.run_checked(&self.commands.pause).await?;
        Ok(())
    }

    async fn play(&self) -> Result<(), ControllerError> {
        self.run_checked(&self.commands.play).await?;
        Ok(())
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn argv(parts: &[&str]) -> Vec<String> {
        parts.iter().map(|s| s.to_string()).collect()
    }

    fn make_commands(status: &[&str]) -> PlayerCommandsConfig {
        PlayerCommandsConfig {
            status: argv(status),
            pause: argv(&["true"]),
            play: argv(&["false"]),
            running: None,
            playing_output: "Playing".to_string(),
        }
    }

    #[tokio::test]
    async fn test_status_output_is_matched_case_insensitively() {
        let player = CommandPlayer::new("test", make_commands(&["echo", "playing"]));
        assert!(player.is_running().await.unwrap());
        assert!(player.is_playing().await.unwrap());

        let player = CommandPlayer::new("test", make_commands(&["echo", "Paused"]));
        assert!(!player.is_playing().await.unwrap());
    }

    #[tokio::test]
    async fn test_failing_status_means_not_running() {
        let player = CommandPlayer::new("test", make_commands(&["false"]));
        assert!(!player.is_running().await.unwrap());
        assert!(matches!(
            player.is_playing().await,
            Err(ControllerError::CommandFailed { .. })
        ));
    }

    #[tokio::test]
    async fn test_dedicated_running_command() {
        let mut commands = make_commands(&["false"]);
        commands.running = Some(argv(&["true"]));
        let player = CommandPlayer::new("test", commands);
        assert!(player.is_running().await.unwrap());
    }

    #[tokio::test]
    async fn test_action_exit_status() {
        let player = CommandPlayer::new("test", make_commands(&["echo", "Playing"]));
        assert!(player.pause().await.is_ok());
        assert!(matches!(
            player.play().await,
            Err(ControllerError::CommandFailed { .. })
        ));
    }

    #[tokio::test]
    async fn test_blank_status_is_unexpected() {
        let player = CommandPlayer::new("test", make_commands(&["true"]));
        assert!(matches!(
            player.is_playing().await,
            Err(ControllerError::UnexpectedOutput { .. })
        ));
    }

    #[tokio::test]
    async fn test_empty_command_is_rejected() {
        let player = CommandPlayer::new("test", make_commands(&[]));
        assert!(player.is_playing().await.is_err());
    }

    #[tokio::test]
    async fn test_missing_binary_is_io_error() {
        let player = CommandPlayer::new(
            "test",
            make_commands(&["/nonexistent/still-music-test-binary"]),
        );
        assert!(matches!(player.is_running().await, Err(ControllerError::Io(_))));
    }
}
