//! Tracking who last changed the managed player's playback
//!
//! The engine must only auto-resume a player it paused itself. This module
//! keeps the PausedByEngine flag together with the last playing-state the
//! engine observed or caused, so that a change between two polls that the
//! engine did not cause is recognised as the user taking manual control.
//!
//! Right after the engine acts, a slow player can still report the old
//! state. Observations that contradict the engine's expected result are
//! ignored until the settle window has passed.

use std::time::Duration;
use tokio::time::Instant;
use tracing::trace;

/// Result of our own last action, used to absorb its echo
#[derive(Debug, Clone, Copy)]
struct ExpectedOutcome {
    playing: bool,
    at: Instant,
}

/// A playing-state change the engine did not cause
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ManualChange {
    pub was_playing: bool,
    pub now_playing: bool,
    /// PausedByEngine was set before this change cleared it
    pub cleared_pause: bool,
}

#[derive(Debug)]
pub struct PlaybackOwnership {
    paused_by_engine: bool,
    last_playing: Option<bool>,
    expected: Option<ExpectedOutcome>,
    settle: Duration,
}

impl PlaybackOwnership {
    pub fn new(settle: Duration) -> Self {
        Self {
            paused_by_engine: false,
            last_playing: None,
            expected: None,
            settle,
        }
    }

    pub fn paused_by_engine(&self) -> bool {
        self.paused_by_engine
    }

    pub fn set_settle(&mut self, settle: Duration) {
        self.settle = settle;
    }

    /// Record that the engine just issued `pause()`
    pub fn record_engine_pause(&mut self) {
        self.paused_by_engine = true;
        self.last_playing = Some(false);
        self.expected = Some(ExpectedOutcome {
            playing: false,
            at: Instant::now(),
        });
    }

    /// Record that the engine just issued `play()`
    pub fn record_engine_play(&mut self) {
        self.paused_by_engine = false;
        self.last_playing = Some(true);
        self.expected = Some(ExpectedOutcome {
            playing: true,
            at: Instant::now(),
        });
    }

    /// Give up on a pending resume without acting
    pub fn clear(&mut self) {
        self.paused_by_engine = false;
    }

    /// Forget everything (engine stop)
    pub fn reset(&mut self) {
        self.paused_by_engine = false;
        self.last_playing = None;
        self.expected = None;
    }

    /// Feed a fresh playing-state read from the controller
    ///
    /// Returns the change when the player moved without the engine causing
    /// it; PausedByEngine is cleared in that case.
    pub fn observe(&mut self, playing: bool) -> Option<ManualChange> {
        if let Some(expected) = self.expected {
            if expected.at.elapsed() < self.settle {
                if playing != expected.playing {
                    trace!(
                        playing,
                        expected = expected.playing,
                        "Player not settled after engine action"
                    );
                    return None;
                }
            } else {
                self.expected = None;
            }
        }

        let previous = self.last_playing.replace(playing);
        match previous {
            Some(was_playing) if was_playing != playing => {
                let cleared_pause = self.paused_by_engine;
                self.paused_by_engine = false;
                self.expected = None;
                Some(ManualChange {
                    was_playing,
                    now_playing: playing,
                    cleared_pause,
                })
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_first_observation_is_baseline() {
        let mut ownership = PlaybackOwnership::new(Duration::from_millis(500));
        assert_eq!(ownership.observe(true), None);
        assert_eq!(ownership.observe(true), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_engine_pause_is_not_a_manual_change() {
        let mut ownership = PlaybackOwnership::new(Duration::from_millis(500));
        ownership.observe(true);
        ownership.record_engine_pause();
        assert!(ownership.paused_by_engine());
        assert_eq!(ownership.observe(false), None);
        assert!(ownership.paused_by_engine());
    }

    #[tokio::test(start_paused = true)]
    async fn test_user_resume_clears_flag() {
        let mut ownership = PlaybackOwnership::new(Duration::from_millis(500));
        ownership.observe(true);
        ownership.record_engine_pause();
        tokio::time::sleep(Duration::from_millis(600)).await;

        let change = ownership.observe(true).unwrap();
        assert!(!change.was_playing);
        assert!(change.now_playing);
        assert!(change.cleared_pause);
        assert!(!ownership.paused_by_engine());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_read_inside_settle_window_is_ignored() {
        let mut ownership = PlaybackOwnership::new(Duration::from_millis(500));
        ownership.observe(true);
        ownership.record_engine_pause();

        // Slow player still reports playing right after the pause
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(ownership.observe(true), None);
        assert!(ownership.paused_by_engine());

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(ownership.observe(false), None);
        assert!(ownership.paused_by_engine());
    }

    #[tokio::test(start_paused = true)]
    async fn test_reset_forgets_baseline() {
        let mut ownership = PlaybackOwnership::new(Duration::from_millis(500));
        ownership.observe(true);
        ownership.record_engine_pause();
        ownership.reset();
        assert!(!ownership.paused_by_engine());
        assert_eq!(ownership.observe(true), None);
    }
}
