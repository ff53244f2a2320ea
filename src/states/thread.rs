//! # Thread state: one logical strand of execution within a process.
//!
//! A thread state is **not** an OS thread. It is the bookkeeping for a group
//! of flows: open-flow and escalation counters, the per-thread managed object
//! containers and governance slots, and the join monitor other flows wait on.
//!
//! ## Completion
//! ```text
//! complete ⇔ open_flows == 0 ∧ escalations_in_flight == 0
//!
//! on completion (exactly once):
//!   1. still-active governance settled (strategy; disregard on failure)
//!   2. containers unloaded (recycle → cleanup, pooled → give_back)
//!   3. join monitor permanently activated (late joins never park)
//!   4. process notified
//! ```
//!
//! ## Rules
//! - An in-flight escalation suppresses the completion check even at zero
//!   open flows; the check re-runs when the escalation window closes.
//! - Joining a complete thread, or the flow's own thread, schedules the
//!   continuation immediately instead of parking.
//! - Thread ids are process-global and never reused.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use crate::clock::ClockRef;
use crate::error::Escalation;
use crate::events::{Bus, Event, EventKind};
use crate::exec::Job;
use crate::governance::{GovernanceContainer, GovernanceStrategy};
use crate::monitor::{ActivateSet, AssetKind, AssetMonitor};
use crate::objects::ManagedObjectContainer;
use crate::util::lock;

use super::meta::{OfficeMeta, Profiler};
use super::process::ProcessState;

static THREAD_IDS: AtomicU64 = AtomicU64::new(1);

/// Where an escalation was ultimately handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum EscalationLevel {
    /// Taken by the invoking flow's callback.
    Flow,
    /// Taken by the office escalation procedure.
    Office,
    /// Unhandled; fatal to the owning process.
    Process,
}

impl EscalationLevel {
    /// Short stable label for logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            EscalationLevel::Flow => "flow",
            EscalationLevel::Office => "office",
            EscalationLevel::Process => "process",
        }
    }
}

struct ThreadInner {
    open_flows: usize,
    escalations: usize,
    complete: bool,
    failure: Option<Escalation>,
}

/// Bookkeeping for one logical strand of execution.
pub struct ThreadState {
    id: u64,
    process: Arc<ProcessState>,
    office: Arc<OfficeMeta>,
    containers: Vec<Arc<ManagedObjectContainer>>,
    governance: Vec<Arc<GovernanceContainer>>,
    governance_active: Vec<AtomicBool>,
    join_monitor: Arc<AssetMonitor>,
    profiler: Option<Arc<dyn Profiler>>,
    inner: Mutex<ThreadInner>,
}

impl ThreadState {
    /// Creates a thread state on `process`, wired per `office`.
    ///
    /// The thread registers itself with the process; the process completes
    /// only once every registered thread has completed.
    pub fn new(
        process: Arc<ProcessState>,
        office: Arc<OfficeMeta>,
        profiler: Option<Arc<dyn Profiler>>,
    ) -> Arc<Self> {
        let id = THREAD_IDS.fetch_add(1, Ordering::Relaxed);
        let services = process.services().clone();

        let containers = office
            .objects()
            .iter()
            .map(|meta| {
                ManagedObjectContainer::new(
                    Arc::clone(meta),
                    services.clone(),
                    Arc::clone(process.cleanup()),
                )
            })
            .collect();
        let governance = office
            .governance()
            .iter()
            .enumerate()
            .map(|(slot, g)| GovernanceContainer::new(Arc::clone(g), slot, services.bus.clone()))
            .collect::<Vec<_>>();
        let governance_active = governance.iter().map(|_| AtomicBool::new(false)).collect();

        let join_monitor = AssetMonitor::new(
            AssetKind::ThreadJoin { thread: id },
            Arc::clone(&services.registry),
            services.bus.clone(),
        );
        let profiler = profiler.or_else(|| office.profiler().cloned());

        process.register_thread(id);
        Arc::new(Self {
            id,
            process,
            office,
            containers,
            governance,
            governance_active,
            join_monitor,
            profiler,
            inner: Mutex::new(ThreadInner {
                open_flows: 0,
                escalations: 0,
                complete: false,
                failure: None,
            }),
        })
    }

    /// Process-global thread id.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// The owning process.
    pub fn process(&self) -> &Arc<ProcessState> {
        &self.process
    }

    /// The office wiring this thread executes against.
    pub fn office(&self) -> &Arc<OfficeMeta> {
        &self.office
    }

    /// The floor clock.
    pub fn clock(&self) -> &ClockRef {
        &self.process.services().clock
    }

    /// The event bus.
    pub fn bus(&self) -> &Bus {
        &self.process.services().bus
    }

    /// The managed object container bound at `index`.
    pub fn container(&self, index: usize) -> Arc<ManagedObjectContainer> {
        Arc::clone(&self.containers[index])
    }

    /// The governance container bound at `slot`.
    pub fn governance_container(&self, slot: usize) -> Arc<GovernanceContainer> {
        Arc::clone(&self.governance[slot])
    }

    /// Whether governance `slot` is active on this thread.
    pub fn governance_active(&self, slot: usize) -> bool {
        self.governance_active[slot].load(Ordering::SeqCst)
    }

    /// Activates or deactivates governance `slot` without settling it.
    pub fn set_governance_active(&self, slot: usize, active: bool) {
        self.governance_active[slot].store(active, Ordering::SeqCst);
    }

    /// Settles governance `slot` with `strategy` and deactivates it.
    pub fn deactivate_governance(&self, slot: usize, strategy: GovernanceStrategy) {
        if self.governance_active[slot].swap(false, Ordering::SeqCst) {
            self.governance[slot].deactivate(strategy);
        }
    }

    /// Records a fatal failure on this thread. The first failure wins.
    pub(crate) fn set_failure(&self, escalation: Escalation) {
        lock(&self.inner).failure.get_or_insert(escalation);
    }

    /// The fatal failure, if one was recorded.
    pub fn failure(&self) -> Option<Escalation> {
        lock(&self.inner).failure.clone()
    }

    /// Whether this thread has completed.
    pub fn is_complete(&self) -> bool {
        lock(&self.inner).complete
    }

    /// Opens one flow. Every open must be balanced by one
    /// [`ThreadState::flow_complete`].
    pub fn flow_open(&self) {
        lock(&self.inner).open_flows += 1;
    }

    /// Closes one flow and re-checks completion.
    pub fn flow_complete(&self, set: &mut ActivateSet) {
        {
            let mut inner = lock(&self.inner);
            inner.open_flows = inner.open_flows.saturating_sub(1);
        }
        self.try_complete(set);
    }

    /// Opens an escalation window, suppressing the completion check.
    pub(crate) fn escalation_start(&self) {
        lock(&self.inner).escalations += 1;
    }

    /// Closes an escalation window and re-checks completion.
    pub(crate) fn escalation_complete(&self, set: &mut ActivateSet) {
        {
            let mut inner = lock(&self.inner);
            inner.escalations = inner.escalations.saturating_sub(1);
        }
        self.try_complete(set);
    }

    /// Registers `job` to continue when this thread completes.
    ///
    /// Joining the job's own thread, or a thread that already completed,
    /// schedules the continuation immediately. A passed `deadline` bounds the
    /// wait; expiry fails the job with a join-timeout escalation carrying
    /// `token`.
    pub fn join(
        self: &Arc<Self>,
        job: Job,
        deadline: Option<u64>,
        token: Option<usize>,
        set: &mut ActivateSet,
    ) {
        if Arc::ptr_eq(self, job.thread()) {
            set.wake(job);
            return;
        }
        // A completed thread latched its monitor: wait resolves immediately.
        self.join_monitor.wait(job, deadline, token, set);
    }

    /// Reports a function execution to the profiler, if one is installed.
    pub(crate) fn profile(&self, function: &str) {
        if let Some(profiler) = &self.profiler {
            profiler.function_executed(function, self.clock().now_millis());
        }
    }

    /// Spawns a sibling thread state on the same process and office wiring.
    pub fn spawn_sibling(self: &Arc<Self>) -> Arc<ThreadState> {
        ThreadState::new(
            Arc::clone(&self.process),
            Arc::clone(&self.office),
            self.profiler.clone(),
        )
    }

    /// Runs the completion sequence if the thread just became complete.
    fn try_complete(&self, set: &mut ActivateSet) {
        let failure = {
            let mut inner = lock(&self.inner);
            if inner.complete || inner.open_flows > 0 || inner.escalations > 0 {
                return;
            }
            inner.complete = true;
            inner.failure.clone()
        };

        // Governance first: settlement may still touch the objects.
        let strategy = if failure.is_some() {
            GovernanceStrategy::Disregard
        } else {
            self.office.strategy()
        };
        for slot in 0..self.governance.len() {
            self.deactivate_governance(slot, strategy);
        }

        for container in &self.containers {
            container.unload(set);
        }

        self.join_monitor.activate_all(set, true);
        self.process.services().bus.publish(
            Event::now(EventKind::ThreadComplete)
                .with_thread(self.id)
                .with_process(self.process.id()),
        );
        self.process.thread_complete(self.id);
    }
}
