//! Console player - simulated managed player that logs every call
//!
//! This is useful for:
//! - Dry runs without touching a real player
//! - Driving the engine in tests
//! - Simulating user actions (`set_playing`) from the interactive console

use crate::player::{ControllerError, PlayerController};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy)]
struct SimulatedState {
    running: bool,
    playing: bool,
}

/// In-memory player that records pause/play calls
pub struct ConsolePlayer {
    name: String,
    state: RwLock<SimulatedState>,
    pause_count: AtomicU64,
    play_count: AtomicU64,
}

impl ConsolePlayer {
    /// New simulated player, running and paused
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            state: RwLock::new(SimulatedState {
                running: true,
                playing: false,
            }),
            pause_count: AtomicU64::new(0),
            play_count: AtomicU64::new(0),
        }
    }

    /// Simulate the user starting or pausing playback directly
    pub fn set_playing(&self, playing: bool) {
        let mut state = self.state.write();
        if state.running {
            state.playing = playing;
        }
        debug!(player = %self.name, playing, "Simulated user playback change");
    }

    /// Simulate the player being launched or quit
    pub fn set_running(&self, running: bool) {
        let mut state = self.state.write();
        state.running = running;
        if !running {
            state.playing = false;
        }
        debug!(player = %self.name, running, "Simulated player process change");
    }

    /// Number of `pause()` calls that reached a running player
    pub fn pause_count(&self) -> u64 {
        self.pause_count.load(Ordering::SeqCst)
    }

    /// Number of `play()` calls that reached a running player
    pub fn play_count(&self) -> u64 {
        self.play_count.load(Ordering::SeqCst)
    }

    pub fn playing(&self) -> bool {
        self.state.read().playing
    }
}

#[async_trait]
impl PlayerController for ConsolePlayer {
    fn name(&self) -> &str {
        &self.name
    }

    async fn is_running(&self) -> Result<bool, ControllerError> {
        Ok(self.state.read().running)
    }

    async fn is_playing(&self) -> Result<bool, ControllerError> {
        let state = *self.state.read();
        Ok(state.running && state.playing)
    }

    async fn pause(&self) -> Result<(), ControllerError> {
        let mut state = self.state.write();
        if !state.running {
            warn!("⚠️  ConsolePlayer '{}' not running, pause ignored", self.name);
            return Err(ControllerError::NotRunning(self.name.clone()));
        }
        state.playing = false;
        drop(state);

        let count = self.pause_count.fetch_add(1, Ordering::SeqCst) + 1;
        info!(
            "⏸  [{}] ConsolePlayer '{}' → pause [call #{}]",
            chrono::Local::now().format("%H:%M:%S%.3f"),
            self.name,
            count
        );
        Ok(())
    }

    async fn play(&self) -> Result<(), ControllerError> {
        let mut state = self.state.write();
        if !state.running {
            warn!("⚠️  ConsolePlayer '{}' not running, play ignored", self.name);
            return Err(ControllerError::NotRunning(self.name.clone()));
        }
        state.playing = true;
        drop(state);

        let count = self.play_count.fetch_add(1, Ordering::SeqCst) + 1;
        info!(
            "▶  [{}] ConsolePlayer '{}' → play [call #{}]",
            chrono::Local::now().format("%H:%M:%S%.3f"),
            self.name,
            count
        );
        Ok(())
    }
}
