//! # Monitor registry and the sweep driver ("office manager").
//!
//! Pending waits are indexed by deadline in a min-heap of weak monitor
//! references. A periodic driver pops due entries and calls
//! [`AssetMonitor::check`]; monitors with remaining deadlined waiters are
//! re-enlisted at their next deadline. Functionally this is the original
//! poll-every-asset loop, made deadline-indexed so a sweep touches only
//! monitors that can actually have expired.
//!
//! ## Architecture
//! ```text
//! wait(deadline) ──► MonitorRegistry.enlist(deadline, monitor)
//!                          │  BinaryHeap<Reverse<(deadline, seq, Weak)>>
//!                          ▼
//! SweepDriver (tokio interval) ──► sweep(now) ──► monitor.check(now, set)
//!                                              └─► re-enlist next_deadline()
//!                                  set.apply()  (after the sweep)
//! ```
//!
//! ## Rules
//! - Entries are lazily validated: a dropped monitor (dead `Weak`) is
//!   discarded on pop, never eagerly removed.
//! - Duplicate enlistments are harmless: `check` is idempotent for waiters
//!   that have not expired.

use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::clock::ClockRef;
use crate::util::lock;

use super::activate::ActivateSet;
use super::asset::AssetMonitor;

/// Tie-break counter so heap ordering is total.
static ENTRY_SEQ: AtomicU64 = AtomicU64::new(0);

struct SweepEntry {
    deadline: u64,
    seq: u64,
    monitor: Weak<AssetMonitor>,
}

impl PartialEq for SweepEntry {
    fn eq(&self, other: &Self) -> bool {
        self.deadline == other.deadline && self.seq == other.seq
    }
}

impl Eq for SweepEntry {}

impl PartialOrd for SweepEntry {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for SweepEntry {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        (self.deadline, self.seq).cmp(&(other.deadline, other.seq))
    }
}

/// Deadline-indexed registry of monitors with pending timed waits.
pub struct MonitorRegistry {
    heap: Mutex<BinaryHeap<Reverse<SweepEntry>>>,
}

impl MonitorRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self {
            heap: Mutex::new(BinaryHeap::new()),
        }
    }

    /// Creates a shared registry.
    pub fn arc() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Enlists `monitor` to be checked at `deadline`.
    pub fn enlist(&self, deadline: u64, monitor: &Arc<AssetMonitor>) {
        lock(&self.heap).push(Reverse(SweepEntry {
            deadline,
            seq: ENTRY_SEQ.fetch_add(1, Ordering::Relaxed),
            monitor: Arc::downgrade(monitor),
        }));
    }

    /// Checks every monitor whose deadline is at or before `now`.
    ///
    /// Returns the number of live monitors checked. Monitors that still hold
    /// deadlined waiters after the check are re-enlisted at their next
    /// deadline.
    pub fn sweep(&self, now: u64, set: &mut ActivateSet) -> usize {
        let mut checked = 0;
        loop {
            let entry = {
                let mut heap = lock(&self.heap);
                match heap.peek() {
                    Some(Reverse(entry)) if entry.deadline <= now => heap.pop(),
                    _ => None,
                }
            };
            let Some(Reverse(entry)) = entry else {
                break;
            };
            let Some(monitor) = entry.monitor.upgrade() else {
                continue;
            };
            monitor.check(now, set);
            checked += 1;
            // check removed everything at or before `now`, so any next
            // deadline is strictly in the future.
            if let Some(next) = monitor.next_deadline() {
                self.enlist(next, &monitor);
            }
        }
        checked
    }

    /// Number of currently enlisted entries (including stale ones).
    pub fn len(&self) -> usize {
        lock(&self.heap).len()
    }

    /// Whether the registry holds no entries.
    pub fn is_empty(&self) -> bool {
        lock(&self.heap).is_empty()
    }
}

impl Default for MonitorRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Periodic driver that advances all pending waits.
///
/// Owns nothing but handles; dropping the returned task handle does not stop
/// the sweep — cancel the token instead.
pub struct SweepDriver {
    registry: Arc<MonitorRegistry>,
    clock: ClockRef,
    interval: Duration,
}

impl SweepDriver {
    /// Creates a driver sweeping `registry` every `interval`.
    pub fn new(registry: Arc<MonitorRegistry>, clock: ClockRef, interval: Duration) -> Self {
        Self {
            registry,
            clock,
            interval,
        }
    }

    /// Runs one sweep at the clock's current time, applying activations.
    ///
    /// Exposed so tests and embedders can drive checks without the periodic
    /// task.
    pub fn sweep_once(&self) -> usize {
        let mut set = ActivateSet::new();
        let checked = self.registry.sweep(self.clock.now_millis(), &mut set);
        set.apply();
        checked
    }

    /// Spawns the periodic sweep task; requires a running tokio runtime.
    pub fn spawn(self, token: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut tick = tokio::time::interval(self.interval);
            tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = tick.tick() => {
                        self.sweep_once();
                    }
                }
            }
        })
    }
}
