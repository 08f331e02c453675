//! Timestamp sources for store-assigned `updated_at` / `cached_at` values.

use parking_lot::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

/// A source of timestamps, in seconds since the Unix epoch.
pub trait Clock: Send + Sync {
    /// Returns the current time.
    fn now(&self) -> f64;
}

/// Wall-clock time that never goes backwards within one process.
#[derive(Debug, Default)]
pub struct SystemClock {
    last: Mutex<f64>,
}

impl SystemClock {
    /// Creates a system clock.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> f64 {
        let wall = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs_f64();
        let mut last = self.last.lock();
        if wall > *last {
            *last = wall;
        }
        *last
    }
}

/// A clock that only moves when told to. Used by tests and fixtures.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<f64>,
}

impl ManualClock {
    /// Creates a clock frozen at `start`.
    #[must_use]
    pub fn new(start: f64) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    /// Moves the clock to `at`.
    pub fn set(&self, at: f64) {
        *self.now.lock() = at;
    }

    /// Moves the clock forward by `seconds`.
    pub fn advance(&self, seconds: f64) {
        *self.now.lock() += seconds;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> f64 {
        *self.now.lock()
    }
}
