//! Per-application activity aggregator
//!
//! Platform glue (audio session callbacks, process monitors, the console)
//! reports each application's activity individually; this detector folds
//! them into the single "another app is playing" bit the engine consumes.
//! Reports for the managed player itself are dropped.

use super::{Detector, DetectorError, ManagedIdentity, SignalSink};
use crate::engine::PlaybackSignal;
use chrono::{DateTime, Local};
use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use tracing::{debug, info, trace};

pub struct AggregateDetector {
    name: String,
    identity: ManagedIdentity,
    /// Currently active applications and when they became active
    active: DashMap<String, DateTime<Local>>,
    sink: RwLock<Option<SignalSink>>,
    /// Last aggregate delivered to the sink (None = nothing yet)
    last_emitted: Mutex<Option<bool>>,
}

impl AggregateDetector {
    pub fn new(name: impl Into<String>, identity: ManagedIdentity) -> Self {
        Self {
            name: name.into(),
            identity,
            active: DashMap::new(),
            sink: RwLock::new(None),
            last_emitted: Mutex::new(None),
        }
    }

    /// Record one application's activity. Safe from any thread.
    pub fn report(&self, app_id: &str, active: bool) {
        let app_id = app_id.trim();
        if app_id.is_empty() {
            return;
        }
        if self.identity.matches(app_id) {
            trace!(app_id, active, "Ignoring report for managed player");
            return;
        }

        if active {
            if self.active.contains_key(app_id) {
                return;
            }
            self.active.insert(app_id.to_string(), Local::now());
            info!("🔊 {} started playing", app_id);
        } else {
            if self.active.remove(app_id).is_none() {
                return;
            }
            info!("🔇 {} stopped playing", app_id);
        }

        self.emit_if_changed();
    }

    /// Forget every active application
    pub fn clear(&self) {
        self.active.clear();
        self.emit_if_changed();
    }

    pub fn is_other_playing(&self) -> bool {
        !self.active.is_empty()
    }

    /// Active applications, sorted by id
    pub fn playing_applications(&self) -> Vec<String> {
        let mut apps: Vec<String> = self.active.iter().map(|e| e.key().clone()).collect();
        apps.sort();
        apps
    }

    pub fn summary(&self) -> String {
        let apps = self.playing_applications();
        match apps.len() {
            0 => "no other audio".to_string(),
            1 => format!("1 app playing: {}", apps[0]),
            n => format!("{} apps playing: {}", n, apps.join(", ")),
        }
    }

    fn emit_if_changed(&self) {
        let Some(sink) = self.sink.read().clone() else {
            return;
        };

        let mut last = self.last_emitted.lock();
        let aggregate = self.is_other_playing();
        if *last == Some(aggregate) {
            return;
        }
        *last = Some(aggregate);

        debug!(
            detector = %self.name,
            other_app_playing = aggregate,
            "Aggregate activity changed"
        );
        sink(PlaybackSignal::other(aggregate));
    }
}

impl Detector for AggregateDetector {
    fn name(&self) -> &str {
        &self.name
    }

    fn start_monitoring(&self, sink: SignalSink) -> Result<(), DetectorError> {
        {
            let mut current = self.sink.write();
            if current.is_some() {
                return Err(DetectorError::AlreadyRunning(self.name.clone()));
            }
            *current = Some(sink);
        }
        *self.last_emitted.lock() = None;

        info!(detector = %self.name, "Detector started");
        self.emit_if_changed();
        Ok(())
    }

    fn stop_monitoring(&self) {
        if self.sink.write().take().is_some() {
            info!(detector = %self.name, "Detector stopped");
        }
        *self.last_emitted.lock() = None;
    }
}
