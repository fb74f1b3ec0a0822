//! Managed player controllers
//!
//! The engine only depends on the four-operation [`PlayerController`]
//! contract. How a controller reaches the player (shell commands, IPC,
//! automation) is its own business.

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

pub mod command;
pub mod console;

pub use command::CommandPlayer;
pub use console::ConsolePlayer;

/// Failure of a controller call
///
/// The engine treats every failure as best-effort: it logs and keeps
/// evaluating.
#[derive(Debug, Error)]
pub enum ControllerError {
    #[error("player '{0}' is not running")]
    NotRunning(String),

    #[error("controller call timed out after {0:?}")]
    Timeout(Duration),

    #[error("command `{command}` failed: {reason}")]
    CommandFailed { command: String, reason: String },

    #[error("unexpected output from `{command}`: {output}")]
    UnexpectedOutput { command: String, output: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Controller for the managed player
///
/// All methods take `&self` so a controller can be shared as
/// `Arc<dyn PlayerController>`; implementations use interior mutability
/// for any state.
#[async_trait]
pub trait PlayerController: Send + Sync {
    /// Display name of the managed player
    fn name(&self) -> &str;

    /// Whether the player process is running
    async fn is_running(&self) -> Result<bool, ControllerError>;

    /// Whether the player is currently playing
    async fn is_playing(&self) -> Result<bool, ControllerError>;

    /// Pause playback
    async fn pause(&self) -> Result<(), ControllerError>;

    /// Start or resume playback
    async fn play(&self) -> Result<(), ControllerError>;
}
