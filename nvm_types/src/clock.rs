//! # Virtual Clock
//!
//! Deterministic millisecond clock for the NvM simulation.
//!
//! The clock never reads wall time. It only advances when a caller tells it
//! to, so every schedule and every recovery run is reproducible.

use serde::{Deserialize, Serialize};

/// Caller-driven virtual time in milliseconds
///
/// # Examples
///
/// ```
/// use nvm_types::VirtualClock;
///
/// let mut clock = VirtualClock::new();
/// assert_eq!(clock.now_ms(), 0);
///
/// clock.advance_ms(50);
/// assert_eq!(clock.now_ms(), 50);
///
/// clock.step();
/// assert_eq!(clock.now_ms(), 51);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VirtualClock {
    now_ms: u64,
}

impl VirtualClock {
    /// Creates a clock at time zero
    pub fn new() -> Self {
        Self { now_ms: 0 }
    }

    /// Creates a clock starting at `now_ms`
    pub fn starting_at(now_ms: u64) -> Self {
        Self { now_ms }
    }

    /// Advances the clock by `delta_ms`, saturating at `u64::MAX`
    pub fn advance_ms(&mut self, delta_ms: u64) {
        self.now_ms = self.now_ms.saturating_add(delta_ms);
    }

    /// Advances by one millisecond and returns the new time
    ///
    /// Event logs use this to give every recorded event a distinct stamp.
    pub fn step(&mut self) -> u64 {
        self.advance_ms(1);
        self.now_ms
    }

    /// Returns the current virtual time
    pub fn now_ms(&self) -> u64 {
        self.now_ms
    }

    /// Milliseconds elapsed since `earlier`, zero if `earlier` is in the future
    pub fn since(&self, earlier: u64) -> u64 {
        self.now_ms.saturating_sub(earlier)
    }
}
