//! "Now playing" detector
//!
//! Polls a command that prints the system's now-playing media as JSON
//! (`media-control get` on macOS) and turns it into a full
//! [`PlaybackSignal`]: whether the managed player is the now-playing target
//! and whether some other application is playing.
//!
//! Expected output is either `null` or an object such as
//! `{"bundleIdentifier": "com.apple.Safari", "playing": true, ...}`.

use super::{Detector, DetectorError, ManagedIdentity, SignalSink};
use crate::engine::PlaybackSignal;
use parking_lot::Mutex;
use serde::Deserialize;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

/// Upper bound for one invocation of the now-playing command
const COMMAND_TIMEOUT: Duration = Duration::from_secs(5);

/// One now-playing record as printed by the command
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NowPlayingInfo {
    pub bundle_identifier: Option<String>,
    #[serde(default)]
    pub playing: Option<bool>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub artist: Option<String>,
}

/// Parse the command's stdout; `null` or empty output means nothing is playing
pub fn parse_now_playing(output: &str) -> Result<Option<NowPlayingInfo>, serde_json::Error> {
    let output = output.trim();
    if output.is_empty() {
        return Ok(None);
    }
    serde_json::from_str(output)
}

/// Map a now-playing record onto the engine's signal
pub fn signal_for(info: Option<&NowPlayingInfo>, identity: &ManagedIdentity) -> PlaybackSignal {
    let Some(bundle_id) = info.and_then(|i| i.bundle_identifier.as_deref()) else {
        return PlaybackSignal::IDLE;
    };
    let playing = info.and_then(|i| i.playing).unwrap_or(false);
    let is_target = identity.matches(bundle_id);

    PlaybackSignal {
        other_app_playing: playing && !is_target,
        managed_is_now_playing_target: is_target,
    }
}

pub struct NowPlayingDetector {
    command: Vec<String>,
    interval: Duration,
    identity: ManagedIdentity,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl NowPlayingDetector {
    pub fn new(command: Vec<String>, interval: Duration, identity: ManagedIdentity) -> Self {
        Self {
            command,
            interval,
            identity,
            task: Mutex::new(None),
        }
    }
}

impl Detector for NowPlayingDetector {
    fn name(&self) -> &str {
        "now_playing"
    }

    fn start_monitoring(&self, sink: SignalSink) -> Result<(), DetectorError> {
        if self.command.is_empty() {
            return Err(DetectorError::EmptyCommand);
        }

        let mut task = self.task.lock();
        if task.as_ref().is_some_and(|t| !t.is_finished()) {
            return Err(DetectorError::AlreadyRunning(self.name().to_string()));
        }

        info!(
            command = %self.command.join(" "),
            interval_ms = self.interval.as_millis() as u64,
            "Now-playing detector started"
        );

        *task = Some(tokio::spawn(poll_loop(
            self.command.clone(),
            self.interval,
            self.identity.clone(),
            sink,
        )));
        Ok(())
    }

    fn stop_monitoring(&self) {
        if let Some(task) = self.task.lock().take() {
            task.abort();
            info!("Now-playing detector stopped");
        }
    }
}

impl Drop for NowPlayingDetector {
    fn drop(&mut self) {
        if let Some(task) = self.task.lock().take() {
            task.abort();
        }
    }
}

async fn poll_loop(
    command: Vec<String>,
    interval: Duration,
    identity: ManagedIdentity,
    sink: SignalSink,
) {
    let mut ticker = tokio::time::interval(interval.max(Duration::from_millis(10)));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let mut last: Option<PlaybackSignal> = None;
    let mut failing = false;

    loop {
        ticker.tick().await;

        let info = match query(&command).await {
            Ok(info) => {
                if failing {
                    info!("Now-playing command recovered");
                    failing = false;
                }
                info
            }
            Err(e) => {
                // Only the first failure of a streak is worth a warning
                if !failing {
                    warn!("⚠️  Now-playing query failed: {}", e);
                    failing = true;
                } else {
                    debug!(error = %e, "Now-playing query still failing");
                }
                continue;
            }
        };

        let signal = signal_for(info.as_ref(), &identity);
        if last == Some(signal) {
            continue;
        }
        last = Some(signal);

        if let Some(info) = &info {
            debug!(
                bundle = info.bundle_identifier.as_deref().unwrap_or("-"),
                title = info.title.as_deref().unwrap_or(""),
                artist = info.artist.as_deref().unwrap_or(""),
                playing = info.playing.unwrap_or(false),
                "Now playing changed"
            );
        }
        if signal.other_app_playing {
            info!("🔊 Another app is now playing");
        } else if signal.managed_is_now_playing_target {
            info!("Now playing switched to the managed player");
        } else {
            info!("🔇 Other app stopped playing");
        }

        sink(signal);
    }
}

async fn query(command: &[String]) -> Result<Option<NowPlayingInfo>, DetectorError> {
    let (program, args) = command.split_first().ok_or(DetectorError::EmptyCommand)?;

    let child = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stderr(Stdio::null())
        .kill_on_drop(true)
        .output();

    let output = tokio::time::timeout(COMMAND_TIMEOUT, child)
        .await
        .map_err(|_| DetectorError::Timeout(COMMAND_TIMEOUT))??;

    if !output.status.success() {
        return Err(DetectorError::CommandFailed {
            command: command.join(" "),
            reason: format!("exit status {}", output.status),
        });
    }

    Ok(parse_now_playing(&String::from_utf8_lossy(&output.stdout))?)
}
