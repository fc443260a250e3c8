// src/clock.rs
// Cancellable one-shot timers and periodic tickers on tokio time

use crate::cancel::CancellationToken;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, Interval, MissedTickBehavior};

/// Source of time for the engines. Backed by `tokio::time`, so a paused test
/// runtime drives every timer and cooldown window deterministically.
#[derive(Debug, Clone, Copy, Default)]
pub struct Clock;

impl Clock {
    pub fn new() -> Self {
        Self
    }

    pub fn now(&self) -> Instant {
        Instant::now()
    }

    /// Runs `callback` once after `delay` unless the returned timer is
    /// cancelled or dropped first. Must be called inside a tokio runtime.
    pub fn after<F>(&self, delay: Duration, callback: F) -> Timer
    where
        F: FnOnce() + Send + 'static,
    {
        let token = CancellationToken::new();
        let guard = token.clone();
        let task = tokio::spawn(async move {
            tokio::select! {
                biased;
                _ = guard.cancelled() => {}
                _ = time::sleep(delay) => {
                    if !guard.is_cancelled() {
                        callback();
                    }
                }
            }
        });

        Timer { token, task }
    }

    /// Periodic ticker whose first tick completes immediately.
    pub fn every(&self, period: Duration) -> Ticker {
        let mut interval = time::interval(period);
        // A slow status check pushes the schedule back instead of bursting.
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        Ticker {
            interval,
            token: CancellationToken::new(),
        }
    }
}

/// Handle to a pending one-shot callback. Dropping it cancels the callback.
pub struct Timer {
    token: CancellationToken,
    task: JoinHandle<()>,
}

impl Timer {
    pub fn cancel(&self) {
        self.token.cancel();
        self.task.abort();
    }

    pub fn is_pending(&self) -> bool {
        !self.token.is_cancelled() && !self.task.is_finished()
    }
}

impl Drop for Timer {
    fn drop(&mut self) {
        self.cancel();
    }
}

pub struct Ticker {
    interval: Interval,
    token: CancellationToken,
}

impl Ticker {
    /// Waits for the next tick. Returns `None` once the ticker is stopped;
    /// a stopped ticker never ticks again.
    pub async fn tick(&mut self) -> Option<Instant> {
        if self.token.is_cancelled() {
            return None;
        }
        tokio::select! {
            biased;
            _ = self.token.cancelled() => None,
            at = self.interval.tick() => Some(at),
        }
    }

    pub fn stop(&self) {
        self.token.cancel();
    }

    pub fn is_stopped(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Token that stops this ticker when cancelled.
    pub fn stop_handle(&self) -> CancellationToken {
        self.token.clone()
    }
}
