//! # Asset monitor: wait/notify-by-polling for any awaitable resource.
//!
//! An asset is anything that can be waited upon with a timeout: a managed
//! object container (sourcing or asynchronous operation) or a thread state
//! (join). A wait is a **registration**, never a blocking call; progress is
//! made only through external checks (the sweep driver) or explicit
//! activation. This is why thousands of idle resources coexist without a
//! native thread per wait.
//!
//! ## Contract
//! ```text
//! wait(job, deadline, token)  → registers interest; false = resolved
//!                               immediately (monitor latched)
//! check(now)                  → waiters past deadline are removed and
//!                               failed exactly once
//! activate_all(permanent)     → removes and wakes all current waiters
//! fail_all(esc, permanent)    → removes and fails all current waiters
//! ```
//!
//! ## Rules
//! - A waiter appears in at most one monitor at a time (job parked flag).
//! - An already-resolved waiter is never re-checked (removal is resolution).
//! - A permanent latch makes every future `wait` resolve immediately, so no
//!   caller can re-enter a dead wait.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::error::Escalation;
use crate::events::{Bus, Event, EventKind};
use crate::exec::Job;
use crate::util::lock;

use super::activate::ActivateSet;
use super::registry::MonitorRegistry;

/// What kind of asset a monitor guards; determines the timeout escalation.
#[derive(Clone)]
pub enum AssetKind {
    /// A managed object being sourced.
    Sourcing {
        /// Bound object name.
        object: String,
        /// Configured sourcing timeout.
        timeout: Duration,
    },
    /// A managed object's in-flight asynchronous operation.
    Operation {
        /// Bound object name.
        object: String,
        /// Configured operation timeout.
        timeout: Duration,
    },
    /// A join on a thread state.
    ThreadJoin {
        /// Target thread id.
        thread: u64,
    },
}

impl AssetKind {
    /// Escalation delivered to a waiter whose deadline expired.
    fn timeout_escalation(&self, token: Option<usize>) -> Escalation {
        match self {
            AssetKind::Sourcing { object, timeout } => Escalation::SourceManagedObjectTimedOut {
                object: object.clone(),
                timeout: *timeout,
            },
            AssetKind::Operation { object, timeout } => {
                Escalation::ManagedObjectOperationTimedOut {
                    object: object.clone(),
                    timeout: *timeout,
                }
            }
            AssetKind::ThreadJoin { .. } => Escalation::FlowJoinTimedOut { token },
        }
    }
}

/// Terminal latch of a monitor.
enum Latch {
    Open,
    Activated,
    Failed(Escalation),
}

struct Waiter {
    job: Job,
    deadline: Option<u64>,
    token: Option<usize>,
}

/// Hook invoked (outside all monitor locks) when waiters expired on a check,
/// letting the owning asset transition its own state. Receives the check time
/// and the activate set of the check.
type ExpiryHook = Box<dyn Fn(u64, &mut ActivateSet) + Send + Sync>;
type SharedExpiryHook = Arc<dyn Fn(u64, &mut ActivateSet) + Send + Sync>;

struct MonitorInner {
    latch: Latch,
    waiters: Vec<Waiter>,
}

/// Wait/notify-by-polling primitive for one asset.
pub struct AssetMonitor {
    kind: AssetKind,
    registry: Arc<MonitorRegistry>,
    bus: Bus,
    inner: Mutex<MonitorInner>,
    expiry_hook: Mutex<Option<SharedExpiryHook>>,
}

impl AssetMonitor {
    /// Creates a monitor for the given asset kind.
    pub fn new(kind: AssetKind, registry: Arc<MonitorRegistry>, bus: Bus) -> Arc<Self> {
        Arc::new(Self {
            kind,
            registry,
            bus,
            inner: Mutex::new(MonitorInner {
                latch: Latch::Open,
                waiters: Vec::new(),
            }),
            expiry_hook: Mutex::new(None),
        })
    }

    /// Installs the owning asset's expiry hook.
    ///
    /// The hook runs after a check removed expired waiters, outside every
    /// monitor lock, so it may re-enter the monitor (e.g. to latch it).
    pub fn set_expiry_hook(&self, hook: ExpiryHook) {
        *lock(&self.expiry_hook) = Some(Arc::from(hook));
    }

    /// Registers `job` as a waiter.
    ///
    /// Returns `true` if the wait was granted (job parked). Returns `false`
    /// when the monitor already resolved: the job is queued on `set` for
    /// immediate activation or failure instead.
    pub fn wait(
        self: &Arc<Self>,
        job: Job,
        deadline: Option<u64>,
        token: Option<usize>,
        set: &mut ActivateSet,
    ) -> bool {
        let enlist = {
            let mut inner = lock(&self.inner);
            match &inner.latch {
                Latch::Activated => {
                    drop(inner);
                    set.wake(job);
                    return false;
                }
                Latch::Failed(escalation) => {
                    let escalation = escalation.clone();
                    drop(inner);
                    set.fail(job, escalation);
                    return false;
                }
                Latch::Open => {
                    job.mark_parked();
                    inner.waiters.push(Waiter {
                        job,
                        deadline,
                        token,
                    });
                    deadline
                }
            }
        };
        if let Some(deadline) = enlist {
            self.registry.enlist(deadline, self);
        }
        true
    }

    /// Fails waiters whose deadline has passed, exactly once each.
    ///
    /// Waiters without a deadline, or with a future deadline, stay
    /// registered. If any waiter expired and an expiry hook is installed, the
    /// hook runs afterwards so the owning asset can transition.
    pub fn check(&self, now: u64, set: &mut ActivateSet) {
        let expired: Vec<Waiter> = {
            let mut inner = lock(&self.inner);
            if !matches!(inner.latch, Latch::Open) {
                return;
            }
            let mut expired = Vec::new();
            let mut index = 0;
            while index < inner.waiters.len() {
                match inner.waiters[index].deadline {
                    Some(deadline) if now >= deadline => {
                        expired.push(inner.waiters.swap_remove(index));
                    }
                    _ => index += 1,
                }
            }
            expired
        };
        if expired.is_empty() {
            return;
        }
        for waiter in expired {
            let escalation = self.kind.timeout_escalation(waiter.token);
            if let AssetKind::ThreadJoin { thread } = &self.kind {
                let mut event = Event::now(EventKind::JoinTimedOut).with_thread(*thread);
                if let Some(token) = waiter.token {
                    event = event.with_token(token);
                }
                self.bus.publish(event);
            }
            set.fail(waiter.job, escalation);
        }
        // Clone out of the slot so the hook runs without the slot locked;
        // the hook may install a replacement (container reset).
        let hook = lock(&self.expiry_hook).clone();
        if let Some(hook) = hook {
            hook(now, set);
        }
    }

    /// Removes and wakes all current waiters.
    ///
    /// With `permanent`, latches the monitor so every future `wait` resolves
    /// immediately. A failed latch is never downgraded.
    pub fn activate_all(&self, set: &mut ActivateSet, permanent: bool) {
        let drained: Vec<Waiter> = {
            let mut inner = lock(&self.inner);
            if permanent && matches!(inner.latch, Latch::Open) {
                inner.latch = Latch::Activated;
            }
            std::mem::take(&mut inner.waiters)
        };
        for waiter in drained {
            set.wake(waiter.job);
        }
    }

    /// Removes and fails all current waiters with `escalation`, exactly once
    /// each.
    ///
    /// With `permanent`, latches the monitor so every future `wait` fails
    /// immediately with the same escalation.
    pub fn fail_all(&self, set: &mut ActivateSet, escalation: Escalation, permanent: bool) {
        let drained: Vec<Waiter> = {
            let mut inner = lock(&self.inner);
            if permanent && matches!(inner.latch, Latch::Open) {
                inner.latch = Latch::Failed(escalation.clone());
            }
            std::mem::take(&mut inner.waiters)
        };
        for waiter in drained {
            set.fail(waiter.job, escalation.clone());
        }
    }

    /// Wakes all waiters without an activate set.
    ///
    /// For completion notifications arriving on arbitrary external threads
    /// (asynchronous operation completion): builds a private batch and
    /// applies it immediately. Team assignment is non-blocking, so this is
    /// safe anywhere.
    pub fn notify_detached(&self) {
        let mut set = ActivateSet::new();
        self.activate_all(&mut set, false);
        set.apply();
    }

    /// Earliest deadline among the remaining waiters, if any.
    ///
    /// Used by the registry to re-enlist the monitor after a check.
    pub fn next_deadline(&self) -> Option<u64> {
        let inner = lock(&self.inner);
        inner.waiters.iter().filter_map(|w| w.deadline).min()
    }

    /// Number of currently registered waiters.
    pub fn waiter_count(&self) -> usize {
        lock(&self.inner).waiters.len()
    }
}
