//! # Floor clock: the single time source for deadline arithmetic.
//!
//! Every timeout decision in the runtime compares a deadline against a time
//! obtained from a [`FloorClock`]. Monitors never read the wall clock
//! themselves; the current time is handed to them by whoever drives the
//! check (the sweep driver in production, the test body in tests).
//!
//! ## Implementations
//! - [`SystemClock`]: monotonic milliseconds since clock construction.
//! - [`ManualClock`]: settable clock for deterministic timeout tests.
//!
//! ## Rules
//! - Time is measured in **milliseconds** as a `u64`.
//! - The origin is arbitrary; only differences are meaningful.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// Shared handle to a clock implementation.
pub type ClockRef = Arc<dyn FloorClock>;

/// Source of the current time for deadline checks.
pub trait FloorClock: Send + Sync {
    /// Returns the current time in milliseconds from an arbitrary origin.
    fn now_millis(&self) -> u64;
}

/// Monotonic clock backed by [`Instant`], origin at construction.
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    /// Creates a clock whose origin is "now".
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }

    /// Creates a shared handle.
    pub fn arc() -> ClockRef {
        Arc::new(Self::new())
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl FloorClock for SystemClock {
    fn now_millis(&self) -> u64 {
        self.origin.elapsed().as_millis() as u64
    }
}

/// Settable clock for tests.
///
/// Starts at zero; advance or set explicitly, then drive monitor checks with
/// the value you chose.
pub struct ManualClock {
    now: AtomicU64,
}

impl ManualClock {
    /// Creates a manual clock at time zero.
    pub fn new() -> Self {
        Self {
            now: AtomicU64::new(0),
        }
    }

    /// Creates a shared handle at time zero.
    pub fn arc() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Sets the current time to `millis`.
    pub fn set(&self, millis: u64) {
        self.now.store(millis, Ordering::SeqCst);
    }

    /// Advances the current time by `millis`.
    pub fn advance(&self, millis: u64) {
        self.now.fetch_add(millis, Ordering::SeqCst);
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl FloorClock for ManualClock {
    fn now_millis(&self) -> u64 {
        self.now.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manual_clock_set_and_advance() {
        let clock = ManualClock::new();
        assert_eq!(clock.now_millis(), 0);
        clock.set(100);
        assert_eq!(clock.now_millis(), 100);
        clock.advance(50);
        assert_eq!(clock.now_millis(), 150);
    }

    #[test]
    fn test_system_clock_is_monotonic() {
        let clock = SystemClock::new();
        let a = clock.now_millis();
        let b = clock.now_millis();
        assert!(b >= a);
    }
}
