//! Other-audio detectors
//!
//! A detector watches the system for audio produced by applications other
//! than the managed player and pushes [`PlaybackSignal`]s into a sink,
//! normally [`EngineHandle::signal_sink`](crate::engine::EngineHandle::signal_sink).
//! Sinks never block, so detectors may call them from any thread.

use crate::engine::PlaybackSignal;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

pub mod aggregate;
pub mod now_playing;

pub use aggregate::AggregateDetector;
pub use now_playing::NowPlayingDetector;

/// Receiver of detector signals
pub type SignalSink = Arc<dyn Fn(PlaybackSignal) + Send + Sync>;

#[derive(Debug, Error)]
pub enum DetectorError {
    #[error("detector '{0}' is already monitoring")]
    AlreadyRunning(String),

    #[error("detector command is empty")]
    EmptyCommand,

    #[error("command `{command}` failed: {reason}")]
    CommandFailed { command: String, reason: String },

    #[error("command timed out after {0:?}")]
    Timeout(Duration),

    #[error("unparsable detector output: {0}")]
    Parse(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Source of [`PlaybackSignal`]s
pub trait Detector: Send + Sync {
    fn name(&self) -> &str;

    /// Begin delivering signals to `sink`
    ///
    /// Must be called from within a tokio runtime for detectors that poll.
    fn start_monitoring(&self, sink: SignalSink) -> Result<(), DetectorError>;

    /// Stop delivering signals. Idempotent.
    fn stop_monitoring(&self);
}

/// Recognises the managed player among application identifiers
///
/// An identifier matches when it contains any configured pattern,
/// ignoring case (`com.spotify.client` matches `spotify`).
#[derive(Debug, Clone, Default)]
pub struct ManagedIdentity {
    patterns: Vec<String>,
}

impl ManagedIdentity {
    pub fn new<I, S>(patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            patterns: patterns
                .into_iter()
                .map(|p| p.as_ref().trim().to_lowercase())
                .filter(|p| !p.is_empty())
                .collect(),
        }
    }

    pub fn matches(&self, app_id: &str) -> bool {
        let app_id = app_id.to_lowercase();
        self.patterns.iter().any(|p| app_id.contains(p.as_str()))
    }
}
