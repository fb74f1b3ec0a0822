//! EngineActor - single-owner coordination state machine
//!
//! The actor owns the engine state, the PausedByEngine tracking, the cached
//! latest detector signal and both debounce timers. Everything reaches it
//! as an [`EngineCommand`] on one FIFO channel, so signals, timer expiries
//! and lifecycle requests are applied strictly in arrival order on a single
//! task, without locks.
//!
//! ```text
//! detectors ──on_signal──┐
//! timers ──TimerExpired──┼──► command_rx ──► EngineActor ──► PlayerController
//! handle ──start/stop────┘                       │
//!                                                ├──► watch   (snapshot)
//!                                                └──► broadcast (StateChange)
//! ```
//!
//! Every pause or play is preceded by a fresh controller poll and a check
//! of the cached signal; a decision taken when a timer was armed is never
//! acted on blindly.

use super::commands::{Ack, EngineCommand};
use super::handle::EngineHandle;
use super::ownership::PlaybackOwnership;
use super::timer::{DelayTimer, ExpiryCallback, TimerDirection};
use super::types::{
    EngineSettings, EngineSnapshot, EngineState, PlaybackSignal, PlaybackSituation,
    PlayerObservation, StateChange, Strategy,
};
use crate::player::{ControllerError, PlayerController};
use chrono::{DateTime, Local};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::time::{Interval, MissedTickBehavior};
use tracing::{debug, info, trace, warn};

/// Buffered transitions per observer before it starts lagging
const CHANGE_CHANNEL_CAPACITY: usize = 64;

/// Lower bound for the poll period (tokio intervals reject zero)
const MIN_POLL_INTERVAL: Duration = Duration::from_millis(10);

pub struct EngineActor {
    settings: EngineSettings,
    controller: Arc<dyn PlayerController>,

    state: EngineState,
    ownership: PlaybackOwnership,
    latest_signal: PlaybackSignal,
    last_observation: Option<PlayerObservation>,
    /// Last pause attempt failed; no new pause until the signal or the
    /// player observation changes
    pause_failed: bool,

    pause_timer: DelayTimer,
    resume_timer: DelayTimer,

    command_rx: mpsc::UnboundedReceiver<EngineCommand>,
    snapshot_tx: watch::Sender<EngineSnapshot>,
    change_tx: broadcast::Sender<StateChange>,

    transition_count: u64,
    changed_at: DateTime<Local>,
    /// Poll interval must be rebuilt (start or settings change)
    ticker_dirty: bool,
}

impl EngineActor {
    /// Spawn the actor on the current tokio runtime and return its handle
    ///
    /// The engine starts in [`EngineState::Stopped`]; call
    /// [`EngineHandle::start`] to begin monitoring.
    pub fn spawn(settings: EngineSettings, controller: Arc<dyn PlayerController>) -> EngineHandle {
        let (cmd_tx, command_rx) = mpsc::unbounded_channel();
        let (snapshot_tx, snapshot_rx) = watch::channel(EngineSnapshot::initial());
        let (change_tx, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);

        let pause_timer = DelayTimer::new(
            TimerDirection::Pause,
            settings.pause_delay,
            expiry_callback(&cmd_tx, TimerDirection::Pause),
        );
        let resume_timer = DelayTimer::new(
            TimerDirection::Resume,
            settings.resume_delay,
            expiry_callback(&cmd_tx, TimerDirection::Resume),
        );

        info!(
            player = controller.name(),
            strategy = ?settings.strategy,
            pause_delay_ms = settings.pause_delay.as_millis() as u64,
            resume_delay_ms = settings.resume_delay.as_millis() as u64,
            "Engine actor spawned"
        );

        let actor = EngineActor {
            ownership: PlaybackOwnership::new(settings.settle),
            settings,
            controller,
            state: EngineState::Stopped,
            latest_signal: PlaybackSignal::IDLE,
            last_observation: None,
            pause_failed: false,
            pause_timer,
            resume_timer,
            command_rx,
            snapshot_tx,
            change_tx: change_tx.clone(),
            transition_count: 0,
            changed_at: Local::now(),
            ticker_dirty: false,
        };

        tokio::spawn(actor.run());

        EngineHandle::new(cmd_tx, snapshot_rx, change_tx)
    }

    async fn run(mut self) {
        debug!("Engine run loop started");

        let mut ticker = make_ticker(self.settings.poll_interval);

        loop {
            let polling = self.state.is_monitoring();

            tokio::select! {
                cmd = self.command_rx.recv() => {
                    let Some(cmd) = cmd else {
                        debug!("All engine handles dropped");
                        break;
                    };
                    if !self.handle_command(cmd).await {
                        break;
                    }
                }
                _ = ticker.tick(), if polling => {
                    self.on_poll_tick().await;
                }
            }

            if self.ticker_dirty {
                ticker = make_ticker(self.settings.poll_interval);
                self.ticker_dirty = false;
            }
        }

        self.pause_timer.stop();
        self.resume_timer.stop();

        info!(
            transitions = self.transition_count,
            "Engine run loop terminated"
        );
    }

    /// Apply one command. Returns false when the actor should exit.
    async fn handle_command(&mut self, cmd: EngineCommand) -> bool {
        match cmd {
            EngineCommand::Signal(signal) => self.handle_signal(signal).await,
            EngineCommand::TimerExpired {
                direction,
                generation,
            } => self.handle_timer_expired(direction, generation).await,
            EngineCommand::Start { ack } => {
                self.handle_start().await;
                reply(ack);
            }
            EngineCommand::Stop { ack } => {
                self.handle_stop();
                reply(ack);
            }
            EngineCommand::PauseMonitoring { ack } => {
                self.handle_pause_monitoring();
                reply(ack);
            }
            EngineCommand::ResumeMonitoring { ack } => {
                self.handle_resume_monitoring().await;
                reply(ack);
            }
            EngineCommand::UpdateSettings { settings, ack } => {
                self.handle_update_settings(settings);
                reply(ack);
            }
            EngineCommand::GetSnapshot { response } => {
                let _ = response.send(self.snapshot());
            }
            EngineCommand::Shutdown => {
                info!("Engine received shutdown command");
                return false;
            }
        }
        true
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    async fn handle_start(&mut self) {
        if self.state != EngineState::Stopped {
            debug!(state = %self.state, "Engine already started");
            return;
        }

        info!(player = self.controller.name(), "Starting coordination engine");
        self.ownership.reset();
        self.pause_failed = false;
        self.ticker_dirty = true;
        self.transition_to(EngineState::Idle);
        self.evaluate(None).await;
    }

    fn handle_stop(&mut self) {
        if self.state == EngineState::Stopped {
            debug!("Engine already stopped");
            return;
        }

        info!("Stopping coordination engine");
        debug!(
            pause_pending = self.pause_timer.is_active(),
            resume_pending = self.resume_timer.is_active(),
            "Cancelling timers"
        );
        self.pause_timer.stop();
        self.resume_timer.stop();
        self.ownership.reset();
        self.pause_failed = false;
        self.last_observation = None;
        self.transition_to(EngineState::Stopped);
    }

    fn handle_pause_monitoring(&mut self) {
        match self.state {
            EngineState::Stopped => debug!("Engine stopped, nothing to pause"),
            EngineState::MonitoringPaused => debug!("Monitoring already paused"),
            _ => {
                info!("Monitoring paused by operator");
                self.pause_timer.stop();
                self.resume_timer.stop();
                self.ownership.clear();
                self.pause_failed = false;
                self.transition_to(EngineState::MonitoringPaused);
            }
        }
    }

    async fn handle_resume_monitoring(&mut self) {
        if self.state != EngineState::MonitoringPaused {
            debug!(state = %self.state, "Monitoring not paused, ignoring resume");
            return;
        }

        info!("Monitoring resumed by operator");
        self.transition_to(EngineState::Idle);
        self.evaluate(None).await;
    }

    fn handle_update_settings(&mut self, settings: EngineSettings) {
        if settings == self.settings {
            debug!("Engine settings unchanged");
            return;
        }

        let strategy_changed = settings.strategy != self.settings.strategy;
        if settings.poll_interval != self.settings.poll_interval {
            self.ticker_dirty = true;
        }

        self.pause_timer.set_delay(settings.pause_delay);
        self.resume_timer.set_delay(settings.resume_delay);
        self.ownership.set_settle(settings.settle);
        self.settings = settings;

        if strategy_changed {
            info!(strategy = ?self.settings.strategy, "Engine strategy changed");
            match self.state {
                EngineState::Conflict => {
                    self.pause_timer.stop();
                    self.transition_to(EngineState::Idle);
                }
                EngineState::Resuming => {
                    self.resume_timer.stop();
                    self.transition_to(EngineState::Suppressed);
                }
                _ => {}
            }
        }

        info!(
            pause_delay_ms = self.settings.pause_delay.as_millis() as u64,
            resume_delay_ms = self.settings.resume_delay.as_millis() as u64,
            poll_interval_ms = self.settings.poll_interval.as_millis() as u64,
            "Engine settings updated"
        );
    }

    // =========================================================================
    // Inputs
    // =========================================================================

    async fn handle_signal(&mut self, signal: PlaybackSignal) {
        if !self.state.is_monitoring() {
            // Detectors only emit on change; keep it for the next start/resume
            trace!(?signal, state = %self.state, "Not monitoring, caching signal");
            self.latest_signal = signal;
            self.publish_snapshot();
            return;
        }

        let previous = std::mem::replace(&mut self.latest_signal, signal);
        if previous == signal {
            trace!(?signal, "Signal unchanged");
            return;
        }
        self.pause_failed = false;

        debug!(
            other_app_playing = signal.other_app_playing,
            managed_is_target = signal.managed_is_now_playing_target,
            other_active = signal.other_active(),
            "Signal changed"
        );
        self.publish_snapshot();
        self.evaluate(None).await;
    }

    async fn handle_timer_expired(&mut self, direction: TimerDirection, generation: u64) {
        let timer = match direction {
            TimerDirection::Pause => &mut self.pause_timer,
            TimerDirection::Resume => &mut self.resume_timer,
        };
        if !timer.acknowledge(generation) {
            return;
        }

        info!("⏰ {} timer expired", direction);
        match direction {
            TimerDirection::Pause => self.on_pause_due().await,
            TimerDirection::Resume => self.on_resume_due().await,
        }
    }

    async fn on_poll_tick(&mut self) {
        let Some(observation) = self.observe_player().await else {
            return;
        };
        trace!(?observation, state = %self.state, "Poll tick");
        self.evaluate(Some(observation)).await;
    }

    // =========================================================================
    // Transition function
    // =========================================================================

    /// Apply the transition table to the cached signal
    ///
    /// `fresh` is a player observation taken just now, if any; otherwise the
    /// controller is polled when the decision depends on it.
    async fn evaluate(&mut self, fresh: Option<PlayerObservation>) {
        let other_active = self.latest_signal.other_active();

        match self.state {
            EngineState::Idle if other_active && self.pause_failed => {
                trace!("Previous pause failed, waiting for a change before retrying");
            }
            EngineState::Idle if other_active => {
                let observation = match fresh {
                    Some(observation) => Some(observation),
                    None => self.observe_player().await,
                };
                match observation {
                    Some(observation) if observation.playing => self.begin_conflict().await,
                    Some(_) => debug!("Other audio active, managed player not playing"),
                    None => debug!("Managed player state unknown, not arming pause"),
                }
            }
            EngineState::Conflict if !other_active => {
                info!("Other audio stopped before pause delay, cancelling");
                self.pause_timer.stop();
                self.transition_to(EngineState::Idle);
            }
            EngineState::Suppressed if !other_active => self.begin_resume().await,
            EngineState::Resuming if other_active => {
                info!("Other audio returned, cancelling resume");
                self.resume_timer.stop();
                self.transition_to(EngineState::Suppressed);
            }
            _ => {}
        }
    }

    async fn begin_conflict(&mut self) {
        self.transition_to(EngineState::Conflict);
        match self.settings.strategy {
            Strategy::Debounce => {
                info!(
                    "Other audio detected, pausing {} in {}ms unless it stops",
                    self.controller.name(),
                    self.pause_timer.delay().as_millis()
                );
                self.pause_timer.restart();
            }
            Strategy::Immediate => self.on_pause_due().await,
        }
    }

    async fn begin_resume(&mut self) {
        self.transition_to(EngineState::Resuming);
        match self.settings.strategy {
            Strategy::Debounce => {
                info!(
                    "Other audio stopped, considering resume in {}ms",
                    self.resume_timer.delay().as_millis()
                );
                self.resume_timer.restart();
            }
            Strategy::Immediate => self.on_resume_due().await,
        }
    }

    /// Pause deadline reached: re-validate, then pause
    async fn on_pause_due(&mut self) {
        if self.state != EngineState::Conflict {
            debug!(state = %self.state, "Pause no longer pending");
            return;
        }

        if !self.latest_signal.other_active() {
            info!("Other audio gone at pause deadline");
            self.transition_to(EngineState::Idle);
            return;
        }

        let Some(observation) = self.observe_player().await else {
            warn!(
                "Could not read {} state, skipping pause",
                self.controller.name()
            );
            self.transition_to(EngineState::Idle);
            return;
        };

        if !observation.playing {
            info!("{} not playing, nothing to pause", self.controller.name());
            self.transition_to(EngineState::Idle);
            return;
        }

        info!("Pausing {}", self.controller.name());
        let result = bounded(self.settings.controller_timeout, self.controller.pause()).await;
        match result {
            Ok(()) => {
                self.ownership.record_engine_pause();
                self.transition_to(EngineState::Suppressed);
            }
            Err(e) => {
                warn!(
                    "⚠️  Failed to pause {}: {} (not retrying until playback changes)",
                    self.controller.name(),
                    e
                );
                self.pause_failed = true;
                self.transition_to(EngineState::Idle);
            }
        }
    }

    /// Resume deadline reached: re-validate ownership, then play
    async fn on_resume_due(&mut self) {
        if self.state != EngineState::Resuming {
            debug!(state = %self.state, "Resume no longer pending");
            return;
        }

        if self.latest_signal.other_active() {
            info!("Other audio active at resume deadline");
            self.transition_to(EngineState::Suppressed);
            return;
        }

        // Polling first lets a manual change clear the flag before we decide
        let observation = self.observe_player().await;

        if !self.ownership.paused_by_engine() {
            info!(
                "{} was not paused by us, leaving it alone",
                self.controller.name()
            );
            self.transition_to(EngineState::Idle);
            return;
        }

        if let Some(observation) = observation {
            if !observation.running {
                info!("{} no longer running, not resuming", self.controller.name());
                self.ownership.clear();
                self.transition_to(EngineState::Idle);
                return;
            }
            if observation.playing {
                info!("{} already playing", self.controller.name());
                self.ownership.clear();
                self.transition_to(EngineState::Idle);
                return;
            }
        }

        info!("Resuming {}", self.controller.name());
        let result = bounded(self.settings.controller_timeout, self.controller.play()).await;
        match result {
            Ok(()) => self.ownership.record_engine_play(),
            Err(e) => {
                warn!("⚠️  Failed to resume {}: {}", self.controller.name(), e);
                self.ownership.clear();
            }
        }
        self.transition_to(EngineState::Idle);
    }

    // =========================================================================
    // Player polling
    // =========================================================================

    /// Read the managed player's state; None when the controller failed
    async fn observe_player(&mut self) -> Option<PlayerObservation> {
        let timeout = self.settings.controller_timeout;

        let running = match bounded(timeout, self.controller.is_running()).await {
            Ok(running) => running,
            Err(e) => {
                debug!(error = %e, "Failed to query player process");
                return None;
            }
        };

        let playing = if running {
            match bounded(timeout, self.controller.is_playing()).await {
                Ok(playing) => playing,
                Err(e) => {
                    debug!(error = %e, "Failed to query playback state");
                    return None;
                }
            }
        } else {
            false
        };

        if let Some(change) = self.ownership.observe(playing) {
            info!(
                was_playing = change.was_playing,
                now_playing = change.now_playing,
                "{} changed outside the engine",
                self.controller.name()
            );
            if change.cleared_pause {
                info!("User took manual control, auto-resume cancelled");
            }
        }

        let observation = PlayerObservation { running, playing };
        if self.last_observation != Some(observation) {
            self.pause_failed = false;
            self.last_observation = Some(observation);
            self.publish_snapshot();
        }
        Some(observation)
    }

    // =========================================================================
    // Publication
    // =========================================================================

    fn transition_to(&mut self, next: EngineState) {
        if next == self.state {
            return;
        }

        let from = std::mem::replace(&mut self.state, next);
        self.transition_count += 1;
        self.changed_at = Local::now();

        info!("State: {} → {}", from, next);

        self.publish_snapshot();
        // No subscribers is fine
        let _ = self.change_tx.send(StateChange {
            from,
            to: next,
            at: self.changed_at,
        });
    }

    fn publish_snapshot(&self) {
        self.snapshot_tx.send_replace(self.snapshot());
    }

    fn snapshot(&self) -> EngineSnapshot {
        EngineSnapshot {
            state: self.state,
            paused_by_engine: self.ownership.paused_by_engine(),
            latest_signal: self.latest_signal,
            last_observation: self.last_observation,
            situation: self
                .last_observation
                .map(|o| PlaybackSituation::classify(&self.latest_signal, o.playing)),
            transition_count: self.transition_count,
            changed_at: self.changed_at,
        }
    }
}

/// Timer callback that posts the expiry back onto the engine queue
///
/// Holds only a weak sender so pending timers don't keep the actor alive.
fn expiry_callback(
    cmd_tx: &mpsc::UnboundedSender<EngineCommand>,
    direction: TimerDirection,
) -> ExpiryCallback {
    let weak = cmd_tx.downgrade();
    Arc::new(move |generation| {
        if let Some(tx) = weak.upgrade() {
            let _ = tx.send(EngineCommand::TimerExpired {
                direction,
                generation,
            });
        }
    })
}

/// Run a controller call with an upper time bound
async fn bounded<T>(
    timeout: Duration,
    call: impl Future<Output = Result<T, ControllerError>>,
) -> Result<T, ControllerError> {
    match tokio::time::timeout(timeout, call).await {
        Ok(result) => result,
        Err(_) => Err(ControllerError::Timeout(timeout)),
    }
}

fn make_ticker(period: Duration) -> Interval {
    let mut ticker = tokio::time::interval(period.max(MIN_POLL_INTERVAL));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker
}

fn reply(ack: Ack) {
    // Caller may have stopped waiting
    let _ = ack.send(());
}
