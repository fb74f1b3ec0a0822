//! Restartable single-shot delay timer
//!
//! Backs the pause and resume debounce windows. Each arm spawns a tokio task
//! that sleeps for the delay and then invokes the expiry callback with the
//! generation it was armed with. The callback normally posts a message back
//! to the engine's queue, so expiry is handled on the engine's own task.
//!
//! The owner confirms an expiry with [`DelayTimer::acknowledge`]. A
//! generation that no longer matches (because the timer was stopped or
//! re-armed in between) is stale and must be discarded.
//!
//! Starting an armed timer is a no-op; use [`DelayTimer::restart`] to
//! re-arm.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, trace};

/// Called from the timer task when the delay elapses
pub type ExpiryCallback = Arc<dyn Fn(u64) + Send + Sync>;

/// Which decision a timer guards
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerDirection {
    Pause,
    Resume,
}

impl fmt::Display for TimerDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimerDirection::Pause => f.write_str("pause"),
            TimerDirection::Resume => f.write_str("resume"),
        }
    }
}

struct ArmedTimer {
    generation: u64,
    task: JoinHandle<()>,
}

pub struct DelayTimer {
    direction: TimerDirection,
    delay: Duration,
    on_expired: ExpiryCallback,
    armed: Option<ArmedTimer>,
    generation: u64,
}

impl DelayTimer {
    pub fn new(direction: TimerDirection, delay: Duration, on_expired: ExpiryCallback) -> Self {
        Self {
            direction,
            delay,
            on_expired,
            armed: None,
            generation: 0,
        }
    }

    /// Arm the timer. Returns false if it was already armed.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(&mut self) -> bool {
        if self.armed.is_some() {
            debug!(
                direction = %self.direction,
                "Timer already running, ignoring start"
            );
            return false;
        }

        self.generation += 1;
        let generation = self.generation;
        let delay = self.delay;
        let direction = self.direction;
        let on_expired = self.on_expired.clone();

        let task = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            trace!(%direction, generation, "Timer expired");
            on_expired(generation);
        });

        debug!(
            direction = %self.direction,
            delay_ms = delay.as_millis() as u64,
            generation,
            "Timer started"
        );

        self.armed = Some(ArmedTimer { generation, task });
        true
    }

    /// Cancel the pending expiry. Returns false if nothing was armed.
    pub fn stop(&mut self) -> bool {
        let Some(armed) = self.armed.take() else {
            return false;
        };
        armed.task.abort();
        debug!(
            direction = %self.direction,
            generation = armed.generation,
            "Timer stopped"
        );
        true
    }

    pub fn restart(&mut self) {
        debug!(direction = %self.direction, "Timer restart");
        self.stop();
        self.start();
    }

    /// Confirm an expiry reported by the timer task
    ///
    /// Returns true only for the generation currently armed; the timer is
    /// then disarmed.
    pub fn acknowledge(&mut self, generation: u64) -> bool {
        match &self.armed {
            Some(armed) if armed.generation == generation => {
                self.armed = None;
                true
            }
            _ => {
                trace!(
                    direction = %self.direction,
                    generation,
                    "Discarding stale timer expiry"
                );
                false
            }
        }
    }

    pub fn is_active(&self) -> bool {
        self.armed.is_some()
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Change the delay used by the next arm. A pending expiry keeps its deadline.
    pub fn set_delay(&mut self, delay: Duration) {
        self.delay = delay;
    }
}

impl Drop for DelayTimer {
    fn drop(&mut self) {
        if let Some(armed) = self.armed.take() {
            armed.task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    fn make_timer(delay_ms: u64) -> (DelayTimer, mpsc::UnboundedReceiver<u64>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let timer = DelayTimer::new(
            TimerDirection::Pause,
            Duration::from_millis(delay_ms),
            Arc::new(move |generation| {
                let _ = tx.send(generation);
            }),
        );
        (timer, rx)
    }

    #[tokio::test(start_paused = true)]
    async fn test_fires_once_after_delay() {
        let (mut timer, mut rx) = make_timer(3000);
        assert!(timer.start());

        tokio::time::sleep(Duration::from_millis(2900)).await;
        assert!(rx.try_recv().is_err());

        tokio::time::sleep(Duration::from_millis(200)).await;
        let generation = rx.try_recv().unwrap();
        assert!(timer.acknowledge(generation));
        assert!(!timer.is_active());
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_double_start_is_noop() {
        let (mut timer, mut rx) = make_timer(1000);
        assert!(timer.start());
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert!(!timer.start());

        // Original deadline still applies
        tokio::time::sleep(Duration::from_millis(600)).await;
        assert!(rx.try_recv().is_ok());
        tokio::time::sleep(Duration::from_millis(1000)).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_cancels_pending_expiry() {
        let (mut timer, mut rx) = make_timer(1000);
        timer.start();
        assert!(timer.stop());
        assert!(!timer.stop());

        tokio::time::sleep(Duration::from_millis(2000)).await;
        assert!(rx.try_recv().is_err());
        assert!(!timer.is_active());
    }

    #[tokio::test(start_paused = true)]
    async fn test_restart_invalidates_previous_generation() {
        let (mut timer, mut rx) = make_timer(1000);
        timer.start();
        tokio::time::sleep(Duration::from_millis(500)).await;
        timer.restart();

        tokio::time::sleep(Duration::from_millis(700)).await;
        assert!(rx.try_recv().is_err());

        tokio::time::sleep(Duration::from_millis(400)).await;
        let generation = rx.try_recv().unwrap();
        assert_eq!(generation, 2);
        assert!(!timer.acknowledge(1));
        assert!(timer.acknowledge(generation));
    }

    #[tokio::test(start_paused = true)]
    async fn test_drop_cancels_timer() {
        let (mut timer, mut rx) = make_timer(1000);
        timer.start();
        drop(timer);

        tokio::time::sleep(Duration::from_millis(2000)).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_set_delay_applies_to_next_start() {
        let (mut timer, mut rx) = make_timer(1000);
        timer.set_delay(Duration::from_millis(200));
        assert_eq!(timer.delay(), Duration::from_millis(200));
        timer.start();

        tokio::time::sleep(Duration::from_millis(300)).await;
        assert!(rx.try_recv().is_ok());
    }
}
