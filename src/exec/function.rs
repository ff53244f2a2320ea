//! # Managed functions: the unit of work the floor executes.
//!
//! A [`ManagedFunction`] is a synchronous body invoked by a worker once every
//! managed object it requires is ready. The body receives a
//! [`FunctionContext`] through which it reads its parameter and objects,
//! spawns flows or sibling threads, and joins other thread states.
//!
//! ## Cooperative contract
//! The body runs **at most once** per flow. A join does not block: it
//! registers the job on the target thread's monitor and the body simply
//! returns; flow completion is deferred until the join resolves. Failure is
//! reported by returning an [`Escalation`], which propagates
//! flow → thread → office.

use std::any::{Any, TypeId};
use std::sync::Arc;
use std::time::Duration;

use crate::error::Escalation;
use crate::monitor::ActivateSet;
use crate::objects::ObjectHandle;
use crate::states::ThreadState;

use super::job::Job;
use super::team::TeamRef;

/// A unit of work executed by a team worker.
pub trait ManagedFunction: Send + Sync + 'static {
    /// Stable function name for diagnostics and profiling.
    fn name(&self) -> &str;

    /// Executes the function body.
    ///
    /// Called only after every required object is ready. Returning `Err`
    /// raises an escalation on the owning flow.
    fn run(&self, ctx: &mut FunctionContext<'_>) -> Result<(), Escalation>;
}

/// Static metadata for one managed function.
///
/// The parameter type is captured at construction; `invoke_process` validates
/// the supplied parameter against it before any state is allocated.
pub struct FunctionMeta {
    name: String,
    parameter_type: TypeId,
    parameter_type_name: &'static str,
    required_objects: Vec<usize>,
    team: TeamRef,
}

impl FunctionMeta {
    /// Creates metadata for a function taking a parameter of type `P`,
    /// executed by `team`.
    pub fn new<P: Any>(name: impl Into<String>, team: TeamRef) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            parameter_type: TypeId::of::<P>(),
            parameter_type_name: std::any::type_name::<P>(),
            required_objects: Vec::new(),
            team,
        })
    }

    /// As [`FunctionMeta::new`], with required managed object indices.
    pub fn with_objects<P: Any>(
        name: impl Into<String>,
        team: TeamRef,
        required_objects: Vec<usize>,
    ) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            parameter_type: TypeId::of::<P>(),
            parameter_type_name: std::any::type_name::<P>(),
            required_objects,
            team,
        })
    }

    /// Function name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declared parameter type.
    pub fn parameter_type(&self) -> TypeId {
        self.parameter_type
    }

    /// Declared parameter type name, for diagnostics.
    pub fn parameter_type_name(&self) -> &'static str {
        self.parameter_type_name
    }

    /// Indices of the managed objects this function requires.
    pub fn required_objects(&self) -> &[usize] {
        &self.required_objects
    }

    /// Team executing this function.
    pub fn team(&self) -> &TeamRef {
        &self.team
    }
}

/// Office-level escalation handler with first refusal on unhandled failures.
pub trait EscalationProcedure: Send + Sync {
    /// Attempts to handle `escalation`. Returning `false` leaves it
    /// unhandled, which is fatal to the owning process.
    fn handle(&self, escalation: &Escalation) -> bool;
}

/// A join recorded during a body run, performed after the body returns.
///
/// Registering mid-body would let a prompt completion re-activate the job
/// while the body is still on a worker; deferring the registration until the
/// body is settled closes that window.
pub(crate) struct JoinRequest {
    pub(crate) target: Arc<ThreadState>,
    pub(crate) deadline: Option<u64>,
    pub(crate) token: Option<usize>,
}

/// Execution context handed to a function body.
pub struct FunctionContext<'a> {
    job: &'a Job,
    set: &'a mut ActivateSet,
    now: u64,
    join_request: Option<JoinRequest>,
}

impl<'a> FunctionContext<'a> {
    pub(crate) fn new(job: &'a Job, set: &'a mut ActivateSet, now: u64) -> Self {
        Self {
            job,
            set,
            now,
            join_request: None,
        }
    }

    /// Current time in milliseconds (floor clock).
    pub fn now(&self) -> u64 {
        self.now
    }

    /// The invocation parameter, downcast to its concrete type.
    pub fn parameter<P: Any + Send + Sync>(&self) -> Option<Arc<P>> {
        self.job.parameter().clone().downcast::<P>().ok()
    }

    /// The sourced object bound at `index`, if ready.
    ///
    /// For indices listed in the function's required objects this always
    /// returns `Some` — the job pipeline guarantees readiness before the body
    /// runs.
    pub fn object(&self, index: usize) -> Option<ObjectHandle> {
        self.job.thread().container(index).object_handle()
    }

    /// The owning thread state.
    pub fn thread(&self) -> &Arc<ThreadState> {
        self.job.thread()
    }

    /// Opens a new flow on this thread and schedules `function` on its team.
    pub fn spawn_flow(
        &mut self,
        function: Arc<dyn ManagedFunction>,
        meta: Arc<FunctionMeta>,
        parameter: ObjectHandle,
    ) {
        let thread = Arc::clone(self.job.thread());
        thread.flow_open();
        let job = Job::new(function, meta, thread, parameter);
        self.set.wake(job);
    }

    /// Spawns a new thread state on the owning process with an initial flow.
    pub fn spawn_thread(
        &mut self,
        function: Arc<dyn ManagedFunction>,
        meta: Arc<FunctionMeta>,
        parameter: ObjectHandle,
    ) -> Arc<ThreadState> {
        let sibling = self.job.thread().spawn_sibling();
        sibling.flow_open();
        let job = Job::new(function, meta, Arc::clone(&sibling), parameter);
        self.set.wake(job);
        sibling
    }

    /// Joins `target`: flow completion is deferred until the target thread
    /// completes or the join times out.
    ///
    /// At most one join per activation; a second call replaces the first.
    /// Joining the body's own thread, or an already-complete thread, never
    /// deadlocks: the continuation is scheduled immediately.
    pub fn join(
        &mut self,
        target: &Arc<ThreadState>,
        timeout: Option<Duration>,
        token: Option<usize>,
    ) {
        let deadline = timeout.map(|t| self.now + t.as_millis() as u64);
        self.join_request = Some(JoinRequest {
            target: Arc::clone(target),
            deadline,
            token,
        });
    }

    /// Marks governance slot `index` active for this thread.
    pub fn activate_governance(&self, index: usize) {
        self.job.thread().set_governance_active(index, true);
    }

    /// Settles governance slot `index` now, applying it over the registered
    /// objects (commit).
    pub fn enforce_governance(&self, index: usize) {
        self.job
            .thread()
            .deactivate_governance(index, crate::governance::GovernanceStrategy::Enforce);
    }

    /// Settles governance slot `index` now, dropping it without applying
    /// (rollback).
    pub fn disregard_governance(&self, index: usize) {
        self.job
            .thread()
            .deactivate_governance(index, crate::governance::GovernanceStrategy::Disregard);
    }

    pub(crate) fn take_join(&mut self) -> Option<JoinRequest> {
        self.join_request.take()
    }
}
