//! # Process state: the root scope of one invocation.
//!
//! A process owns the cleanup sequence and tracks its thread states **by id
//! only** — threads hold the `Arc` to the process, never the reverse, so the
//! ownership graph stays acyclic and a finished process drops cleanly.
//!
//! ## Completion
//! ```text
//! complete ⇔ every registered thread state completed
//!
//! on completion (exactly once):
//!   1. cleanup sequence runs (recycles, registration order)
//!   2. ProcessComplete published
//!   3. invocation callback fires with the first fatal escalation, if any
//!   4. the completion watch flips (ProcessManager::wait_complete returns)
//! ```

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::watch;

use crate::context::FloorServices;
use crate::error::Escalation;
use crate::events::{Bus, Event, EventKind};
use crate::objects::{ObjectHandle, Recycle};
use crate::util::lock;

static PROCESS_IDS: AtomicU64 = AtomicU64::new(1);
static PROCESSES_ALLOCATED: AtomicU64 = AtomicU64::new(0);

/// Invocation callback, fired once at process completion with the first
/// fatal escalation, if any.
pub type ProcessCallback = Box<dyn FnOnce(Option<Escalation>) + Send>;

struct CleanupEntry {
    object: String,
    recycle: Arc<dyn Recycle>,
    handle: ObjectHandle,
}

/// Ordered teardown steps accumulated as containers unload.
///
/// Runs once, at process completion, in registration order (which is the
/// unload order). A recycle that panics is a fault in the recycle itself and
/// propagates.
pub struct CleanupSequence {
    entries: Mutex<Vec<CleanupEntry>>,
}

impl CleanupSequence {
    /// Creates an empty sequence.
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            entries: Mutex::new(Vec::new()),
        })
    }

    /// Appends a teardown step for `object`.
    pub fn register(&self, object: &str, recycle: Arc<dyn Recycle>, handle: ObjectHandle) {
        lock(&self.entries).push(CleanupEntry {
            object: object.to_string(),
            recycle,
            handle,
        });
    }

    /// Number of registered steps not yet run.
    pub fn len(&self) -> usize {
        lock(&self.entries).len()
    }

    /// Whether no steps are registered.
    pub fn is_empty(&self) -> bool {
        lock(&self.entries).is_empty()
    }

    /// Runs and drains every registered step, publishing one event each.
    pub(crate) fn run(&self, bus: &Bus) {
        let entries: Vec<CleanupEntry> = lock(&self.entries).drain(..).collect();
        for entry in entries {
            entry.recycle.recycle(entry.handle);
            bus.publish(Event::now(EventKind::CleanupActionRun).with_object(&entry.object));
        }
    }
}

struct ProcessInner {
    threads: Vec<u64>,
    failure: Option<Escalation>,
    complete: bool,
}

/// Root scope of one invocation.
pub struct ProcessState {
    id: u64,
    services: FloorServices,
    cleanup: Arc<CleanupSequence>,
    callback: Mutex<Option<ProcessCallback>>,
    completion: Option<watch::Sender<bool>>,
    inner: Mutex<ProcessInner>,
}

impl ProcessState {
    /// Creates a process state.
    ///
    /// With `managed`, a completion watch is kept and [`ProcessState::manager`]
    /// hands out [`ProcessManager`] handles; without it, the process is
    /// fire-and-forget and `manager` panics.
    pub fn new(
        services: FloorServices,
        managed: bool,
        callback: Option<ProcessCallback>,
    ) -> Arc<Self> {
        PROCESSES_ALLOCATED.fetch_add(1, Ordering::Relaxed);
        let completion = managed.then(|| watch::channel(false).0);
        Arc::new(Self {
            id: PROCESS_IDS.fetch_add(1, Ordering::Relaxed),
            services,
            cleanup: CleanupSequence::new(),
            callback: Mutex::new(callback),
            completion,
            inner: Mutex::new(ProcessInner {
                threads: Vec::new(),
                failure: None,
                complete: false,
            }),
        })
    }

    /// Process-global id.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Shared runtime services.
    pub fn services(&self) -> &FloorServices {
        &self.services
    }

    /// The process cleanup sequence.
    pub fn cleanup(&self) -> &Arc<CleanupSequence> {
        &self.cleanup
    }

    /// Records a fatal escalation. The first failure wins.
    pub(crate) fn record_failure(&self, escalation: Escalation) {
        lock(&self.inner).failure.get_or_insert(escalation);
    }

    /// The first fatal escalation, if any.
    pub fn failure(&self) -> Option<Escalation> {
        lock(&self.inner).failure.clone()
    }

    /// Whether every registered thread completed.
    pub fn is_complete(&self) -> bool {
        lock(&self.inner).complete
    }

    /// A completion handle for this process.
    ///
    /// # Panics
    /// Panics when the process was created unmanaged: there is no completion
    /// watch to hand out, and silently returning a handle that never resolves
    /// would hide the wiring mistake.
    pub fn manager(self: &Arc<Self>) -> ProcessManager {
        let completion = self
            .completion
            .as_ref()
            .unwrap_or_else(|| panic!("process {} is not managed", self.id));
        ProcessManager {
            receiver: completion.subscribe(),
            process: Arc::clone(self),
        }
    }

    /// Registers a thread state. Called from thread construction, before the
    /// thread can possibly complete.
    pub(crate) fn register_thread(&self, thread: u64) {
        lock(&self.inner).threads.push(thread);
    }

    /// Marks `thread` complete; runs the process completion sequence once the
    /// last thread is gone.
    pub(crate) fn thread_complete(&self, thread: u64) {
        let failure = {
            let mut inner = lock(&self.inner);
            inner.threads.retain(|t| *t != thread);
            if inner.complete || !inner.threads.is_empty() {
                return;
            }
            inner.complete = true;
            inner.failure.clone()
        };

        self.cleanup.run(&self.services.bus);
        self.services.bus.publish(
            Event::now(EventKind::ProcessComplete)
                .with_process(self.id)
                .with_reason(
                    failure
                        .as_ref()
                        .map(|f| f.as_message())
                        .unwrap_or_else(|| "ok".to_string()),
                ),
        );
        if let Some(callback) = lock(&self.callback).take() {
            callback(failure);
        }
        if let Some(completion) = &self.completion {
            let _ = completion.send(true);
        }
    }

    /// Number of process states allocated so far, for boundary tests.
    #[cfg(test)]
    pub(crate) fn total_allocated() -> u64 {
        PROCESSES_ALLOCATED.load(Ordering::Relaxed)
    }
}

/// Completion handle for a managed process.
pub struct ProcessManager {
    receiver: watch::Receiver<bool>,
    process: Arc<ProcessState>,
}

impl ProcessManager {
    /// The managed process.
    pub fn process(&self) -> &Arc<ProcessState> {
        &self.process
    }

    /// Whether the process completed.
    pub fn is_complete(&self) -> bool {
        *self.receiver.borrow()
    }

    /// Waits until the process completes, returning its fatal escalation, if
    /// any.
    pub async fn wait_complete(&mut self) -> Option<Escalation> {
        while !*self.receiver.borrow_and_update() {
            if self.receiver.changed().await.is_err() {
                break;
            }
        }
        self.process.failure()
    }
}

#[cfg(test)]
mod tests {
    use crate::exec::test_support::{harness, manual_services};
    use crate::monitor::ActivateSet;
    use crate::states::{OfficeMeta, ThreadState};

    use super::*;

    #[test]
    fn test_process_waits_for_every_thread() {
        let (services, _clock) = manual_services();
        let (process, first) = harness(&services, OfficeMeta::empty());
        let second = ThreadState::new(Arc::clone(&process), OfficeMeta::empty(), None);
        first.flow_open();
        second.flow_open();

        let mut set = ActivateSet::new();
        first.flow_complete(&mut set);
        assert!(!process.is_complete());
        second.flow_complete(&mut set);
        set.apply();
        assert!(process.is_complete());
    }

    #[test]
    fn test_callback_receives_first_failure() {
        let (services, _clock) = manual_services();
        let seen: Arc<Mutex<Option<Option<Escalation>>>> = Arc::new(Mutex::new(None));
        let seen_in = Arc::clone(&seen);
        let process = ProcessState::new(
            services.clone(),
            true,
            Some(Box::new(move |failure| {
                *lock(&seen_in) = Some(failure);
            })),
        );
        let thread = ThreadState::new(Arc::clone(&process), OfficeMeta::empty(), None);
        thread.flow_open();

        let first = Escalation::FunctionFailure {
            function: "f".into(),
            cause: "boom".into(),
        };
        process.record_failure(first.clone());
        process.record_failure(Escalation::FlowJoinTimedOut { token: None });

        let mut set = ActivateSet::new();
        thread.flow_complete(&mut set);
        set.apply();
        assert_eq!(*lock(&seen), Some(Some(first)));
    }

    #[test]
    #[should_panic(expected = "is not managed")]
    fn test_manager_on_unmanaged_process_panics() {
        let (services, _clock) = manual_services();
        let process = ProcessState::new(services, false, None);
        let _ = process.manager();
    }

    #[tokio::test]
    async fn test_wait_complete_resolves_after_last_thread() {
        let (services, _clock) = manual_services();
        let (process, thread) = harness(&services, OfficeMeta::empty());
        let mut manager = process.manager();
        assert!(!manager.is_complete());

        thread.flow_open();
        let mut set = ActivateSet::new();
        thread.flow_complete(&mut set);
        set.apply();

        assert_eq!(manager.wait_complete().await, None);
        assert!(manager.is_complete());
    }

    #[test]
    fn test_cleanup_runs_in_registration_order() {
        struct OrderedRecycle {
            tag: &'static str,
            order: Arc<Mutex<Vec<&'static str>>>,
        }
        impl Recycle for OrderedRecycle {
            fn recycle(&self, _handle: ObjectHandle) {
                lock(&self.order).push(self.tag);
            }
        }

        let (services, _clock) = manual_services();
        let order: Arc<Mutex<Vec<&'static str>>> = Arc::new(Mutex::new(Vec::new()));
        let cleanup = CleanupSequence::new();
        cleanup.register(
            "db",
            Arc::new(OrderedRecycle {
                tag: "db",
                order: Arc::clone(&order),
            }),
            Arc::new(()),
        );
        cleanup.register(
            "conn",
            Arc::new(OrderedRecycle {
                tag: "conn",
                order: Arc::clone(&order),
            }),
            Arc::new(()),
        );
        assert_eq!(cleanup.len(), 2);

        cleanup.run(&services.bus);
        assert_eq!(*lock(&order), vec!["db", "conn"]);
        assert!(cleanup.is_empty());
    }

    #[test]
    fn test_allocation_counter_increments() {
        let (services, _clock) = manual_services();
        let before = ProcessState::total_allocated();
        let _process = ProcessState::new(services, false, None);
        assert!(ProcessState::total_allocated() > before);
    }
}
