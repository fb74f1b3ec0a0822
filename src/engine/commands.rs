//! Messages accepted by the engine actor
//!
//! Lifecycle commands carry a oneshot acknowledgement so callers can wait
//! until the actor has applied them. Signals and timer expiries are
//! fire-and-forget.

use super::timer::TimerDirection;
use super::types::{EngineSettings, EngineSnapshot, PlaybackSignal};
use tokio::sync::oneshot;

pub type Ack = oneshot::Sender<()>;

#[derive(Debug)]
pub enum EngineCommand {
    /// Begin evaluating signals and polling the player
    Start { ack: Ack },
    /// Cancel timers and stop acting on signals
    Stop { ack: Ack },
    /// One detector observation
    Signal(PlaybackSignal),
    /// A debounce timer elapsed
    TimerExpired {
        direction: TimerDirection,
        generation: u64,
    },
    /// Operator suspends monitoring without stopping the engine
    PauseMonitoring { ack: Ack },
    /// Operator resumes monitoring
    ResumeMonitoring { ack: Ack },
    /// Replace runtime settings (config reload)
    UpdateSettings {
        settings: EngineSettings,
        ack: Ack,
    },
    /// Query the current snapshot
    GetSnapshot {
        response: oneshot::Sender<EngineSnapshot>,
    },
    /// Terminate the actor task
    Shutdown,
}
