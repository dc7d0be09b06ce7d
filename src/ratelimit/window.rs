//! Fixed-window arithmetic.
//!
//! Time is divided into consecutive, non-overlapping intervals of
//! `length_secs` seconds aligned to the Unix epoch. Each interval is
//! identified by its index, `floor(epoch_secs / length_secs)`.

/// A fixed window of a given length in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FixedWindow {
    length_secs: u64,
}

impl FixedWindow {
    /// Create a window of `length_secs` seconds. A zero length is treated as one second.
    pub fn new(length_secs: u64) -> Self {
        Self {
            length_secs: length_secs.max(1),
        }
    }

    /// Length of the window in seconds.
    pub fn length_secs(&self) -> u64 {
        self.length_secs
    }

    /// Index of the window containing `now_secs`.
    pub fn index(&self, now_secs: u64) -> u64 {
        now_secs / self.length_secs
    }

    /// Epoch second at which window `index` starts.
    pub fn start(&self, index: u64) -> u64 {
        index.saturating_mul(self.length_secs)
    }

    /// Epoch second at which window `index` ends and the next one begins.
    pub fn reset(&self, index: u64) -> u64 {
        index.saturating_add(1).saturating_mul(self.length_secs)
    }
}
