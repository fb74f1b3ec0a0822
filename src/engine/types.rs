//! Core types for the coordination engine
//!
//! Signals coming in from detectors, observations pulled from the managed
//! player, the engine state machine, and the snapshot handed to observers.

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// One observation from a detector
///
/// Simpler detectors only know whether something else is playing and leave
/// `managed_is_now_playing_target` false.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PlaybackSignal {
    /// A non-managed application is producing audible output
    pub other_app_playing: bool,
    /// The OS considers the managed player the "now playing" target
    pub managed_is_now_playing_target: bool,
}

impl PlaybackSignal {
    /// Nothing else is playing and the managed player is not the target
    pub const IDLE: PlaybackSignal = PlaybackSignal {
        other_app_playing: false,
        managed_is_now_playing_target: false,
    };

    /// Signal from a detector that only reports other-app activity
    pub fn other(playing: bool) -> Self {
        Self {
            other_app_playing: playing,
            managed_is_now_playing_target: false,
        }
    }

    /// Whether the engine should treat another application as active
    ///
    /// When the managed player is itself the now-playing target, whatever
    /// the detector heard is attributed to it and no conflict exists.
    pub fn other_active(&self) -> bool {
        self.other_app_playing && !self.managed_is_now_playing_target
    }
}

/// Result of polling the player controller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PlayerObservation {
    pub running: bool,
    pub playing: bool,
}

/// Engine state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineState {
    /// Engine not started (or stopped)
    Stopped,
    /// No other app is active; the managed player is left alone
    Idle,
    /// Another app is active while the managed player plays; pause pending
    Conflict,
    /// The engine paused the managed player and waits for quiet
    Suppressed,
    /// The other app went quiet; resume pending
    Resuming,
    /// Monitoring suspended by the operator
    MonitoringPaused,
}

impl EngineState {
    /// Short human-readable description for status displays
    pub fn label(&self) -> &'static str {
        match self {
            EngineState::Stopped => "stopped",
            EngineState::Idle => "monitoring",
            EngineState::Conflict => "other audio detected",
            EngineState::Suppressed => "player paused",
            EngineState::Resuming => "waiting to resume",
            EngineState::MonitoringPaused => "monitoring paused",
        }
    }

    /// States in which signals and polls drive the transition table
    pub fn is_monitoring(&self) -> bool {
        matches!(
            self,
            EngineState::Idle
                | EngineState::Conflict
                | EngineState::Suppressed
                | EngineState::Resuming
        )
    }

    /// States with a debounce timer armed
    pub fn is_pending(&self) -> bool {
        matches!(self, EngineState::Conflict | EngineState::Resuming)
    }
}

impl fmt::Display for EngineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Six-way view of "who is playing", for status displays
///
/// Derived from the latest signal and the latest player observation. The
/// engine never branches on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlaybackSituation {
    ManagedPlayingAsTarget,
    ManagedPausedAsTarget,
    OtherPlayingManagedPlaying,
    OtherPlayingManagedPaused,
    OtherIdleManagedPlaying,
    OtherIdleManagedPaused,
}

impl PlaybackSituation {
    pub fn classify(signal: &PlaybackSignal, managed_playing: bool) -> Self {
        if signal.managed_is_now_playing_target {
            if managed_playing {
                PlaybackSituation::ManagedPlayingAsTarget
            } else {
                PlaybackSituation::ManagedPausedAsTarget
            }
        } else if signal.other_app_playing {
            if managed_playing {
                PlaybackSituation::OtherPlayingManagedPlaying
            } else {
                PlaybackSituation::OtherPlayingManagedPaused
            }
        } else if managed_playing {
            PlaybackSituation::OtherIdleManagedPlaying
        } else {
            PlaybackSituation::OtherIdleManagedPaused
        }
    }
}

/// A realized transition, published once per state change
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StateChange {
    pub from: EngineState,
    pub to: EngineState,
    pub at: DateTime<Local>,
}

/// Read-only copy of the engine's state for observers
#[derive(Debug, Clone, Serialize)]
pub struct EngineSnapshot {
    pub state: EngineState,
    pub paused_by_engine: bool,
    pub latest_signal: PlaybackSignal,
    pub last_observation: Option<PlayerObservation>,
    pub situation: Option<PlaybackSituation>,
    pub transition_count: u64,
    pub changed_at: DateTime<Local>,
}

impl EngineSnapshot {
    pub(crate) fn initial() -> Self {
        Self {
            state: EngineState::Stopped,
            paused_by_engine: false,
            latest_signal: PlaybackSignal::IDLE,
            last_observation: None,
            situation: None,
            transition_count: 0,
            changed_at: Local::now(),
        }
    }
}

/// How the engine turns a detected change into an action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Strategy {
    /// Wait for the condition to persist for the delay window
    #[default]
    Debounce,
    /// Act on the first evaluation that sees the condition
    Immediate,
}

/// Runtime tuning for the engine
#[derive(Debug, Clone, PartialEq)]
pub struct EngineSettings {
    pub strategy: Strategy,
    /// How long other audio must persist before pausing
    pub pause_delay: Duration,
    /// How long quiet must persist before resuming
    pub resume_delay: Duration,
    /// Cadence of the periodic player poll
    pub poll_interval: Duration,
    /// Upper bound for any single controller call
    pub controller_timeout: Duration,
    /// Grace period after our own pause/play before disagreement counts
    pub settle: Duration,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            strategy: Strategy::Debounce,
            pause_delay: Duration::from_secs(3),
            resume_delay: Duration::from_secs(3),
            poll_interval: Duration::from_secs(1),
            controller_timeout: Duration::from_secs(2),
            settle: Duration::from_secs(1),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_other_active_ignores_managed_target() {
        let signal = PlaybackSignal {
            other_app_playing: true,
            managed_is_now_playing_target: true,
        };
        assert!(!signal.other_active());
        assert!(PlaybackSignal::other(true).other_active());
        assert!(!PlaybackSignal::IDLE.other_active());
    }

    #[test]
    fn test_situation_classification() {
        let target = PlaybackSignal {
            other_app_playing: false,
            managed_is_now_playing_target: true,
        };
        assert_eq!(
            PlaybackSituation::classify(&target, true),
            PlaybackSituation::ManagedPlayingAsTarget
        );
        assert_eq!(
            PlaybackSituation::classify(&target, false),
            PlaybackSituation::ManagedPausedAsTarget
        );

        let other = PlaybackSignal::other(true);
        assert_eq!(
            PlaybackSituation::classify(&other, true),
            PlaybackSituation::OtherPlayingManagedPlaying
        );
        assert_eq!(
            PlaybackSituation::classify(&other, false),
            PlaybackSituation::OtherPlayingManagedPaused
        );
        assert_eq!(
            PlaybackSituation::classify(&PlaybackSignal::IDLE, true),
            PlaybackSituation::OtherIdleManagedPlaying
        );
        assert_eq!(
            PlaybackSituation::classify(&PlaybackSignal::IDLE, false),
            PlaybackSituation::OtherIdleManagedPaused
        );
    }

    #[test]
    fn test_monitoring_states() {
        assert!(EngineState::Idle.is_monitoring());
        assert!(EngineState::Resuming.is_monitoring());
        assert!(!EngineState::Stopped.is_monitoring());
        assert!(!EngineState::MonitoringPaused.is_monitoring());
        assert!(EngineState::Conflict.is_pending());
        assert!(!EngineState::Suppressed.is_pending());
    }

    #[test]
    fn test_default_settings() {
        let settings = EngineSettings::default();
        assert_eq!(settings.pause_delay, Duration::from_secs(3));
        assert_eq!(settings.resume_delay, Duration::from_secs(3));
        assert_eq!(settings.strategy, Strategy::Debounce);
    }
}
