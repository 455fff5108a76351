use chrono::{DateTime, Utc};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Leading-edge limiter: the first call in a window runs immediately, later
/// calls inside the same window are dropped rather than queued.
#[derive(Debug)]
pub struct Throttle {
    window: Duration,
    last_accepted: Mutex<Option<Instant>>,
}

impl Throttle {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            last_accepted: Mutex::new(None),
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Claims the current window. Returns false if it was already claimed.
    pub fn try_acquire(&self) -> bool {
        let now = Instant::now();
        let mut last = lock(&self.last_accepted);
        match *last {
            Some(at) if now.duration_since(at) < self.window => {
                debug!("Throttled call dropped");
                false
            }
            _ => {
                *last = Some(now);
                true
            }
        }
    }

    /// Runs `action` if the window is open.
    pub fn attempt<F, R>(&self, action: F) -> Option<R>
    where
        F: FnOnce() -> R,
    {
        if self.try_acquire() {
            Some(action())
        } else {
            None
        }
    }
}

/// Wall-clock spacing between dispatched scan cycles.
///
/// Only cycles that actually reach the classification stage call
/// [`record`](Self::record), so a cycle that bails out early does not push
/// the next one back.
#[derive(Debug)]
pub struct IntervalGuard {
    interval: Duration,
    last_scan: Mutex<Option<DateTime<Utc>>>,
}

impl IntervalGuard {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_scan: Mutex::new(None),
        }
    }

    pub fn is_open(&self, now: DateTime<Utc>) -> bool {
        match *lock(&self.last_scan) {
            Some(last) => {
                let elapsed_ms = (now - last).num_milliseconds();
                elapsed_ms < 0 || elapsed_ms as u128 >= self.interval.as_millis()
            }
            None => true,
        }
    }

    pub fn record(&self, at: DateTime<Utc>) {
        *lock(&self.last_scan) = Some(at);
    }

    pub fn last_scan(&self) -> Option<DateTime<Utc>> {
        *lock(&self.last_scan)
    }
}
