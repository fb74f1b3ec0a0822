//! EngineHandle - cloneable front door to the engine actor
//!
//! Signals are fire-and-forget and safe to send from any thread (a plain
//! unbounded channel send). Lifecycle calls wait until the actor has
//! applied them, so after `stop().await` returns no pause or play can
//! happen anymore. State reads go through a watch channel and never block
//! on the actor.

use super::actor::EngineActor;
use super::commands::{Ack, EngineCommand};
use super::types::{EngineSettings, EngineSnapshot, EngineState, PlaybackSignal, StateChange};
use crate::detector::SignalSink;
use crate::player::PlayerController;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt;
use tracing::{debug, warn};

#[derive(Clone)]
pub struct EngineHandle {
    cmd_tx: mpsc::UnboundedSender<EngineCommand>,
    snapshot_rx: watch::Receiver<EngineSnapshot>,
    change_tx: broadcast::Sender<StateChange>,
}

impl EngineHandle {
    /// Spawn a new engine for `controller`; it starts out stopped
    pub fn spawn(settings: EngineSettings, controller: Arc<dyn PlayerController>) -> Self {
        EngineActor::spawn(settings, controller)
    }

    pub(crate) fn new(
        cmd_tx: mpsc::UnboundedSender<EngineCommand>,
        snapshot_rx: watch::Receiver<EngineSnapshot>,
        change_tx: broadcast::Sender<StateChange>,
    ) -> Self {
        Self {
            cmd_tx,
            snapshot_rx,
            change_tx,
        }
    }

    /// Begin monitoring. Idempotent.
    pub async fn start(&self) {
        self.request(|ack| EngineCommand::Start { ack }).await;
    }

    /// Cancel pending timers; later signals are only cached until the next
    /// `start`. Idempotent.
    pub async fn stop(&self) {
        self.request(|ack| EngineCommand::Stop { ack }).await;
    }

    /// Suspend monitoring without forgetting the latest signal
    pub async fn pause_monitoring(&self) {
        self.request(|ack| EngineCommand::PauseMonitoring { ack }).await;
    }

    pub async fn resume_monitoring(&self) {
        self.request(|ack| EngineCommand::ResumeMonitoring { ack }).await;
    }

    /// Replace runtime settings; new delays apply to the next armed timer
    pub async fn update_settings(&self, settings: EngineSettings) {
        self.request(|ack| EngineCommand::UpdateSettings { settings, ack })
            .await;
    }

    /// Deliver a detector observation
    ///
    /// Never blocks; safe from any thread.
    pub fn on_signal(&self, signal: PlaybackSignal) {
        if self.cmd_tx.send(EngineCommand::Signal(signal)).is_err() {
            debug!("Engine gone, dropping signal");
        }
    }

    /// Sink that forwards detector signals to this engine
    pub fn signal_sink(&self) -> SignalSink {
        let handle = self.clone();
        Arc::new(move |signal| handle.on_signal(signal))
    }

    pub fn current_state(&self) -> EngineState {
        self.snapshot_rx.borrow().state
    }

    /// Latest published snapshot (non-blocking)
    pub fn snapshot(&self) -> EngineSnapshot {
        self.snapshot_rx.borrow().clone()
    }

    /// Snapshot taken after every command queued before this call
    pub async fn query_snapshot(&self) -> Option<EngineSnapshot> {
        let (response, rx) = oneshot::channel();
        self.cmd_tx
            .send(EngineCommand::GetSnapshot { response })
            .ok()?;
        rx.await.ok()
    }

    /// Receive every realized transition from now on
    pub fn subscribe(&self) -> broadcast::Receiver<StateChange> {
        self.change_tx.subscribe()
    }

    /// Invoke `f` for each transition on a background task
    ///
    /// The task ends when the engine terminates; abort the returned handle
    /// to unsubscribe earlier.
    pub fn on_state_changed<F>(&self, f: F) -> JoinHandle<()>
    where
        F: Fn(StateChange) + Send + 'static,
    {
        let mut changes = BroadcastStream::new(self.change_tx.subscribe());
        tokio::spawn(async move {
            while let Some(change) = changes.next().await {
                match change {
                    Ok(change) => f(change),
                    Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                        warn!(skipped, "State observer lagging, transitions skipped");
                    }
                }
            }
        })
    }

    pub fn is_alive(&self) -> bool {
        !self.cmd_tx.is_closed()
    }

    /// Terminate the actor task; pending timers are cancelled
    pub fn shutdown(&self) {
        let _ = self.cmd_tx.send(EngineCommand::Shutdown);
    }

    async fn request(&self, make: impl FnOnce(Ack) -> EngineCommand) {
        let (ack, rx) = oneshot::channel();
        if self.cmd_tx.send(make(ack)).is_err() {
            debug!("Engine gone, request dropped");
            return;
        }
        let _ = rx.await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::player::ConsolePlayer;
    use std::time::Duration;

    fn spawn_engine() -> (EngineHandle, Arc<ConsolePlayer>) {
        let player = Arc::new(ConsolePlayer::new("Music"));
        let engine = EngineHandle::spawn(EngineSettings::default(), player.clone());
        (engine, player)
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_stop_are_idempotent() {
        let (engine, _player) = spawn_engine();
        assert_eq!(engine.current_state(), EngineState::Stopped);

        engine.start().await;
        engine.start().await;
        assert_eq!(engine.current_state(), EngineState::Idle);

        engine.stop().await;
        engine.stop().await;
        assert_eq!(engine.current_state(), EngineState::Stopped);
        assert_eq!(engine.snapshot().transition_count, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_subscribe_receives_transitions() {
        let (engine, _player) = spawn_engine();
        let mut changes = engine.subscribe();

        engine.start().await;
        let change = changes.recv().await.unwrap();
        assert_eq!(change.from, EngineState::Stopped);
        assert_eq!(change.to, EngineState::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_on_state_changed_callback() {
        let (engine, _player) = spawn_engine();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let observer = engine.on_state_changed(move |change| {
            let _ = tx.send(change.to);
        });

        engine.start().await;
        engine.pause_monitoring().await;
        assert_eq!(rx.recv().await, Some(EngineState::Idle));
        assert_eq!(rx.recv().await, Some(EngineState::MonitoringPaused));
        observer.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn test_signal_sink_forwards_to_engine() {
        let (engine, player) = spawn_engine();
        player.set_playing(true);
        engine.start().await;

        let sink = engine.signal_sink();
        sink(PlaybackSignal::other(true));

        let snapshot = engine.query_snapshot().await.unwrap();
        assert_eq!(snapshot.latest_signal, PlaybackSignal::other(true));
        assert_eq!(snapshot.state, EngineState::Conflict);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_ends_actor() {
        let (engine, _player) = spawn_engine();
        assert!(engine.is_alive());
        engine.shutdown();
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(!engine.is_alive());

        // Requests after shutdown return instead of hanging
        engine.start().await;
        assert!(engine.query_snapshot().await.is_none());
    }
}
