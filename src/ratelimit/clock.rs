//! Wall-clock source for window and cache expiry computations.

use std::sync::Arc;

use chrono::Utc;
use parking_lot::Mutex;

/// A source of the current time in whole seconds since the Unix epoch.
pub trait Clock: Send + Sync {
    /// Current time as epoch seconds.
    fn now_secs(&self) -> u64;
}

/// System clock backed by `chrono::Utc::now()`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl SystemClock {
    /// Create a new system clock.
    pub fn new() -> Self {
        Self
    }
}

impl Clock for SystemClock {
    fn now_secs(&self) -> u64 {
        // Clamp pre-epoch clocks to zero rather than wrapping.
        Utc::now().timestamp().max(0) as u64
    }
}

/// Controllable clock for tests and simulations.
///
/// Clones share the same underlying time, so advancing one clone is visible
/// through every other handle.
#[derive(Debug, Clone)]
pub struct MockClock {
    current: Arc<Mutex<u64>>,
}

impl MockClock {
    /// Create a mock clock starting at `start` epoch seconds.
    pub fn new(start: u64) -> Self {
        Self {
            current: Arc::new(Mutex::new(start)),
        }
    }

    /// Advance the clock by `secs` seconds.
    pub fn advance(&self, secs: u64) {
        *self.current.lock() += secs;
    }

    /// Set the clock to an absolute epoch second.
    pub fn set(&self, secs: u64) {
        *self.current.lock() = secs;
    }
}

impl Clock for MockClock {
    fn now_secs(&self) -> u64 {
        *self.current.lock()
    }
}
