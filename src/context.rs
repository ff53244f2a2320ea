//! # Shared runtime services.
//!
//! [`FloorServices`] bundles the three handles every runtime component needs:
//! the clock, the monitor registry, and the event bus. It is cloned freely
//! (all members are `Arc`-backed) and passed down at construction time, so no
//! component reaches for global state.

use std::sync::Arc;

use crate::clock::ClockRef;
use crate::events::Bus;
use crate::monitor::MonitorRegistry;

/// Bundle of shared runtime services, cloned into every component.
#[derive(Clone)]
pub struct FloorServices {
    /// Time source for all deadline arithmetic.
    pub clock: ClockRef,
    /// Deadline-indexed registry of pending monitors.
    pub registry: Arc<MonitorRegistry>,
    /// Event bus for observability.
    pub bus: Bus,
}

impl FloorServices {
    /// Creates a service bundle.
    pub fn new(clock: ClockRef, registry: Arc<MonitorRegistry>, bus: Bus) -> Self {
        Self {
            clock,
            registry,
            bus,
        }
    }

    /// Current time in milliseconds, from the bundled clock.
    pub fn now(&self) -> u64 {
        self.clock.now_millis()
    }
}
