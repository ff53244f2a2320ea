//! # Job: one scheduled activation of a managed function.
//!
//! A job binds a function, its metadata, a parameter, and the owning thread
//! state. Workers call [`Job::execute`], which drives the readiness pipeline
//! over the function's required objects, runs the body once, and settles the
//! flow.
//!
//! ## Execution pipeline
//! ```text
//! execute()
//!   ├─► pending failure?       → escalation path (flow → thread → office)
//!   ├─► body already done?     → flow_complete (woken from a join)
//!   ├─► for each required object:
//!   │      load → govern → coordinate → is_ready
//!   │      any "not ready" → job parked on a monitor, worker released
//!   ├─► run body (FunctionContext)
//!   │      Ok + join pending   → completion deferred until wake
//!   │      Ok                  → flow_complete
//!   │      Err(escalation)     → escalation path
//!   └─► apply activate set (after all locks released)
//! ```
//!
//! ## Rules
//! - Successor dispatch goes through team queues, never recursive calls, so
//!   call-stack depth stays bounded regardless of chain length.
//! - The body runs at most once per flow; re-activations after a join take
//!   the completion path.
//! - A parked job holds no worker thread.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use crate::error::Escalation;
use crate::events::{Event, EventKind};
use crate::monitor::ActivateSet;
use crate::objects::ObjectHandle;
use crate::states::{EscalationLevel, ThreadState};
use crate::util::lock;

use super::function::{FunctionContext, FunctionMeta, ManagedFunction};
use super::team::TeamRef;

/// Failure sink for boundary wrappers (e.g. the state manager's blocking
/// loader), invoked once if the job escalates.
pub(crate) type FailureSink = Box<dyn FnOnce(Escalation) + Send>;

struct JobCore {
    function: Arc<dyn ManagedFunction>,
    meta: Arc<FunctionMeta>,
    thread: Arc<ThreadState>,
    parameter: ObjectHandle,
    team: TeamRef,
    pending_failure: Mutex<Option<Escalation>>,
    failure_sink: Mutex<Option<FailureSink>>,
    parked: AtomicBool,
    body_done: AtomicBool,
}

/// Cloneable handle to one scheduled function activation.
#[derive(Clone)]
pub struct Job {
    core: Arc<JobCore>,
}

impl Job {
    /// Creates a job for `function` on `thread`.
    ///
    /// The caller is responsible for having opened the flow
    /// ([`ThreadState::flow_open`]) and for scheduling the job on a team.
    pub fn new(
        function: Arc<dyn ManagedFunction>,
        meta: Arc<FunctionMeta>,
        thread: Arc<ThreadState>,
        parameter: ObjectHandle,
    ) -> Self {
        let team = Arc::clone(meta.team());
        Self {
            core: Arc::new(JobCore {
                function,
                meta,
                thread,
                parameter,
                team,
                pending_failure: Mutex::new(None),
                failure_sink: Mutex::new(None),
                parked: AtomicBool::new(false),
                body_done: AtomicBool::new(false),
            }),
        }
    }

    /// The owning thread state.
    pub fn thread(&self) -> &Arc<ThreadState> {
        &self.core.thread
    }

    /// The invocation parameter.
    pub fn parameter(&self) -> &ObjectHandle {
        &self.core.parameter
    }

    /// The team this job executes on.
    pub fn team(&self) -> &TeamRef {
        &self.core.team
    }

    /// Records a failure to be taken on the next execution.
    pub(crate) fn record_failure(&self, escalation: Escalation) {
        lock(&self.core.pending_failure).get_or_insert(escalation);
    }

    /// Takes a recorded failure, if any.
    pub(crate) fn take_failure(&self) -> Option<Escalation> {
        lock(&self.core.pending_failure).take()
    }

    /// Installs a boundary failure sink (invoked once on escalation).
    pub(crate) fn set_failure_sink(&self, sink: FailureSink) {
        *lock(&self.core.failure_sink) = Some(sink);
    }

    /// Marks the job as parked in a monitor.
    ///
    /// A waiter appears in at most one monitor at a time.
    pub(crate) fn mark_parked(&self) {
        let was = self.core.parked.swap(true, Ordering::SeqCst);
        debug_assert!(!was, "job parked in a second monitor");
    }

    /// Clears the parked flag and re-assigns the job to its team.
    pub(crate) fn activate(&self) {
        self.core.parked.store(false, Ordering::SeqCst);
        self.core.team.assign(self.clone());
    }

    /// Executes one activation: pipeline, body, settlement.
    pub fn execute(&self) {
        let mut set = ActivateSet::new();

        if let Some(escalation) = self.take_failure() {
            self.escalate(escalation, &mut set);
            set.apply();
            return;
        }

        if self.core.body_done.load(Ordering::SeqCst) {
            // Woken from a join: the body already ran.
            self.core.thread.flow_complete(&mut set);
            set.apply();
            return;
        }

        let now = self.core.thread.clock().now_millis();

        for &index in self.core.meta.required_objects() {
            let container = self.core.thread.container(index);
            if !container.load(self, now, &mut set)
                || !container.govern(&self.core.thread, self, now, &mut set)
                || !container.coordinate(&self.core.thread, self, now, &mut set)
                || !container.is_ready(self, now, &mut set)
            {
                set.apply();
                return;
            }
        }

        self.core.thread.profile(self.core.meta.name());

        let body = {
            let mut ctx = FunctionContext::new(self, &mut set, now);
            self.core
                .function
                .run(&mut ctx)
                .map(|()| ctx.take_join())
        };

        match body {
            Ok(Some(join)) => {
                // Completion deferred until the join resolves. The body is
                // settled before the registration so a prompt wake cannot
                // re-run it.
                self.core.body_done.store(true, Ordering::SeqCst);
                join.target
                    .join(self.clone(), join.deadline, join.token, &mut set);
            }
            Ok(None) => {
                self.core.thread.flow_complete(&mut set);
            }
            Err(escalation) => {
                self.escalate(escalation, &mut set);
            }
        }
        set.apply();
    }

    /// Escalation path: flow → office procedure → (fatal) process.
    fn escalate(&self, escalation: Escalation, set: &mut ActivateSet) {
        let thread = &self.core.thread;
        thread.bus().publish(
            Event::now(EventKind::EscalationRaised)
                .with_function(self.core.meta.name())
                .with_thread(thread.id())
                .with_reason(escalation.as_message()),
        );

        thread.escalation_start();

        // An installed boundary sink is the invoking flow's callback: it
        // takes the failure and the escalation stops there.
        let level = if let Some(sink) = lock(&self.core.failure_sink).take() {
            sink(escalation.clone());
            Some(EscalationLevel::Flow)
        } else if thread
            .office()
            .escalation_procedure()
            .map(|procedure| procedure.handle(&escalation))
            .unwrap_or(false)
        {
            Some(EscalationLevel::Office)
        } else {
            None
        };

        match level {
            Some(level) => {
                thread.bus().publish(
                    Event::now(EventKind::EscalationHandled)
                        .with_thread(thread.id())
                        .with_reason(format!("{}: {}", level.as_str(), escalation.as_label())),
                );
            }
            None => {
                // Unhandled at every level: fatal for this process only.
                thread.set_failure(escalation.clone());
                thread.process().record_failure(escalation);
            }
        }

        // The failing flow is finished either way; completion checks stay
        // suppressed until the escalation window closes.
        thread.flow_complete(set);
        thread.escalation_complete(set);
    }
}
