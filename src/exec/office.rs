//! # Office: the open runtime and its invocation boundary.
//!
//! Opening an office materializes the shared services (clock, monitor
//! registry, event bus), the breakout worker team, and — when a tokio
//! runtime is present — the periodic sweep driver. Work enters through two
//! boundary surfaces:
//!
//! - [`FunctionManager`]: invokes a managed function as a fresh process,
//!   immediately or after a delay.
//! - [`StateManager`]: supplier-style external access to managed objects,
//!   blocking the caller until the object is ready or failed.
//!
//! ```text
//! Office::open(config, meta)
//!   ├─► FunctionManager::invoke_process ──► ProcessState ► ThreadState ► Job
//!   └─► StateManager::get_object ─────────► keeper thread ► breakout team
//! ```
//!
//! ## Rules
//! - Parameter types are validated before any process state is allocated; a
//!   mismatch is an [`InvokeError`], never an escalation.
//! - A delayed invocation holds no worker during the delay.
//! - Closing the office cancels the sweeper and joins the breakout workers.

use std::sync::mpsc;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::clock::SystemClock;
use crate::config::FloorConfig;
use crate::context::FloorServices;
use crate::error::{Escalation, InvokeError};
use crate::events::Bus;
use crate::monitor::{ActivateSet, MonitorRegistry, SweepDriver};
use crate::objects::ObjectHandle;
use crate::states::{OfficeMeta, ProcessCallback, ProcessManager, ProcessState, ThreadState};
use crate::subscribers::{Subscribe, SubscriberSet};

use super::function::{FunctionContext, FunctionMeta, ManagedFunction};
use super::job::Job;
use super::team::{TeamRef, WorkerTeam};

/// An open office: shared services plus the boundary surfaces.
pub struct Office {
    meta: Arc<OfficeMeta>,
    config: FloorConfig,
    services: FloorServices,
    breakout: Arc<WorkerTeam>,
    cancel: CancellationToken,
}

impl Office {
    /// Opens an office with freshly built services.
    ///
    /// When called inside a tokio runtime, the periodic sweep driver is
    /// spawned; outside one, deadline checks must be driven explicitly
    /// through [`SweepDriver::sweep_once`].
    pub fn open(config: FloorConfig, meta: Arc<OfficeMeta>) -> Arc<Self> {
        let services = FloorServices::new(
            SystemClock::arc(),
            MonitorRegistry::arc(),
            Bus::new(config.bus_capacity),
        );
        Self::open_with(config, meta, services)
    }

    /// Opens an office over existing services (tests use a manual clock).
    pub fn open_with(
        config: FloorConfig,
        meta: Arc<OfficeMeta>,
        services: FloorServices,
    ) -> Arc<Self> {
        let breakout = WorkerTeam::new(format!("{}-breakout", meta.name()), config.breakout_workers);
        let cancel = CancellationToken::new();
        if tokio::runtime::Handle::try_current().is_ok() {
            let driver = SweepDriver::new(
                Arc::clone(&services.registry),
                Arc::clone(&services.clock),
                config.sweep_interval,
            );
            driver.spawn(cancel.clone());
        }
        Arc::new(Self {
            meta,
            config,
            services,
            breakout,
            cancel,
        })
    }

    /// Office wiring.
    pub fn meta(&self) -> &Arc<OfficeMeta> {
        &self.meta
    }

    /// Shared runtime services.
    pub fn services(&self) -> &FloorServices {
        &self.services
    }

    /// The breakout team (delayed invocations, external object access).
    pub fn breakout(&self) -> TeamRef {
        let team: Arc<WorkerTeam> = Arc::clone(&self.breakout);
        team
    }

    /// An invocation handle for `function`.
    pub fn function_manager(
        self: &Arc<Self>,
        function: Arc<dyn ManagedFunction>,
        meta: Arc<FunctionMeta>,
    ) -> FunctionManager {
        FunctionManager {
            office: Arc::clone(self),
            function,
            meta,
        }
    }

    /// A supplier-style handle for external access to managed objects.
    ///
    /// The handle keeps one flow open on a private thread state until
    /// [`StateManager::close`], so loaded objects stay sourced across
    /// accesses.
    pub fn state_manager(self: &Arc<Self>) -> StateManager {
        let process = ProcessState::new(self.services.clone(), false, None);
        let thread = ThreadState::new(process, Arc::clone(&self.meta), None);
        thread.flow_open();
        StateManager {
            office: Arc::clone(self),
            thread,
        }
    }

    /// Attaches event subscribers, spawning the bus listener that fans
    /// events out to them. Requires a running tokio runtime.
    ///
    /// The listener stops when the office closes; a lagged listener skips
    /// the overwritten events and carries on.
    pub fn attach_subscribers(&self, subscribers: Vec<Arc<dyn Subscribe>>) {
        if subscribers.is_empty() {
            return;
        }
        let mut set = SubscriberSet::new(subscribers);
        let mut receiver = self.services.bus.subscribe();
        let cancel = self.cancel.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    received = receiver.recv() => match received {
                        Ok(event) => set.emit(&event),
                        Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
                        Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                    },
                }
            }
            set.shutdown();
        });
    }

    /// Stops the sweeper and joins the breakout workers.
    ///
    /// Jobs assigned to the breakout team afterwards are dropped.
    pub fn close(&self) {
        self.cancel.cancel();
        self.breakout.shutdown();
    }
}

impl Drop for Office {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Invocation handle binding one managed function to an open office.
pub struct FunctionManager {
    office: Arc<Office>,
    function: Arc<dyn ManagedFunction>,
    meta: Arc<FunctionMeta>,
}

impl FunctionManager {
    /// Invokes the function as a fresh process after `delay`.
    ///
    /// The parameter's runtime type must be the function's declared parameter
    /// type; a mismatch is rejected before any process or thread state is
    /// allocated. With a zero delay the initial job goes straight to the
    /// function's own team; otherwise it is scheduled onto the breakout team
    /// when the delay elapses, without holding any worker in between.
    pub fn invoke_process(
        &self,
        parameter: ObjectHandle,
        delay: Duration,
        callback: Option<ProcessCallback>,
    ) -> Result<ProcessManager, InvokeError> {
        if (*parameter).type_id() != self.meta.parameter_type() {
            return Err(InvokeError::InvalidParameterType {
                function: self.meta.name().to_string(),
                expected: self.meta.parameter_type_name(),
            });
        }

        let process = ProcessState::new(self.office.services.clone(), true, callback);
        let manager = process.manager();
        let thread = ThreadState::new(process, Arc::clone(&self.office.meta), None);
        thread.flow_open();
        let job = Job::new(
            Arc::clone(&self.function),
            Arc::clone(&self.meta),
            thread,
            parameter,
        );

        if delay.is_zero() {
            Arc::clone(job.team()).assign(job);
        } else {
            let breakout = self.office.breakout();
            match tokio::runtime::Handle::try_current() {
                Ok(handle) => {
                    handle.spawn(async move {
                        tokio::time::sleep(delay).await;
                        breakout.assign(job);
                    });
                }
                Err(_) => {
                    std::thread::spawn(move || {
                        std::thread::sleep(delay);
                        breakout.assign(job);
                    });
                }
            }
        }
        Ok(manager)
    }
}

/// Internal function that hands a ready object to a blocked external caller.
struct ObjectAccess {
    index: usize,
    sender: mpsc::Sender<Result<ObjectHandle, Escalation>>,
}

impl ManagedFunction for ObjectAccess {
    fn name(&self) -> &str {
        "object-access"
    }

    fn run(&self, ctx: &mut FunctionContext<'_>) -> Result<(), Escalation> {
        if let Some(handle) = ctx.object(self.index) {
            let _ = self.sender.send(Ok(handle));
        }
        Ok(())
    }
}

/// Supplier-style external access to an office's managed objects.
///
/// Each access runs the full readiness pipeline (load, governance,
/// coordination, readiness) on the breakout team while the caller blocks on
/// a channel. Failures surface as the container's escalation; an unresolved
/// wait surfaces as a sourcing timeout.
pub struct StateManager {
    office: Arc<Office>,
    thread: Arc<ThreadState>,
}

impl StateManager {
    /// Starts sourcing the object at `index` without blocking.
    pub fn load(&self, index: usize) {
        let team = self.office.breakout();
        let meta = FunctionMeta::with_objects::<()>("object-load", Arc::clone(&team), vec![index]);
        self.thread.flow_open();
        let job = Job::new(
            Arc::new(ObjectLoad),
            meta,
            Arc::clone(&self.thread),
            Arc::new(()),
        );
        team.assign(job);
    }

    /// Blocks until the object at `index` is ready, failed, or `timeout`
    /// (default: the floor's configured object access timeout) elapses.
    pub fn get_object(
        &self,
        index: usize,
        timeout: Option<Duration>,
    ) -> Result<ObjectHandle, Escalation> {
        let timeout = timeout.unwrap_or(self.office.config.default_object_timeout);
        let (sender, receiver) = mpsc::channel();

        let team = self.office.breakout();
        let meta = FunctionMeta::with_objects::<()>("object-access", Arc::clone(&team), vec![index]);
        self.thread.flow_open();
        let job = Job::new(
            Arc::new(ObjectAccess {
                index,
                sender: sender.clone(),
            }),
            meta,
            Arc::clone(&self.thread),
            Arc::new(()),
        );
        job.set_failure_sink(Box::new(move |escalation| {
            let _ = sender.send(Err(escalation));
        }));
        team.assign(job);

        match receiver.recv_timeout(timeout) {
            Ok(result) => result,
            Err(_) => Err(Escalation::SourceManagedObjectTimedOut {
                object: self.thread.container(index).name().to_string(),
                timeout,
            }),
        }
    }

    /// Closes the keeper flow: still-loaded objects are unloaded and their
    /// recycles run through the owning process's cleanup sequence.
    pub fn close(self) {
        let mut set = ActivateSet::new();
        self.thread.flow_complete(&mut set);
        set.apply();
    }
}

struct ObjectLoad;

impl ManagedFunction for ObjectLoad {
    fn name(&self) -> &str {
        "object-load"
    }

    fn run(&self, _ctx: &mut FunctionContext<'_>) -> Result<(), Escalation> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::thread::ThreadId;

    use crate::error::SourceFailure;
    use crate::objects::{ManagedObjectMeta, ManagedObjectSource, Recycle, SourcingUser};
    use crate::util::lock;

    use super::super::team::DirectTeam;
    use super::*;

    struct UnitSource;

    impl ManagedObjectSource for UnitSource {
        fn source(&self, user: SourcingUser) -> Result<(), SourceFailure> {
            user.set_object(Arc::new(42u32));
            Ok(())
        }
    }

    struct FailingSource;

    impl ManagedObjectSource for FailingSource {
        fn source(&self, _user: SourcingUser) -> Result<(), SourceFailure> {
            Err(SourceFailure::new("connection refused"))
        }
    }

    struct Recorder {
        runs: AtomicUsize,
        thread: Mutex<Option<ThreadId>>,
    }

    impl Recorder {
        fn arc() -> Arc<Self> {
            Arc::new(Self {
                runs: AtomicUsize::new(0),
                thread: Mutex::new(None),
            })
        }
    }

    struct RecordingFunction {
        recorder: Arc<Recorder>,
    }

    impl ManagedFunction for RecordingFunction {
        fn name(&self) -> &str {
            "recording"
        }
        fn run(&self, _ctx: &mut FunctionContext<'_>) -> Result<(), Escalation> {
            self.recorder.runs.fetch_add(1, Ordering::SeqCst);
            *lock(&self.recorder.thread) = Some(std::thread::current().id());
            Ok(())
        }
    }

    #[test]
    fn test_invalid_parameter_rejected_before_allocation() {
        let office = Office::open(FloorConfig::default(), OfficeMeta::empty());
        let team: TeamRef = DirectTeam::new("inline");
        let manager = office.function_manager(
            Arc::new(RecordingFunction {
                recorder: Recorder::arc(),
            }),
            FunctionMeta::new::<String>("recording", team),
        );

        // A zero-delay invoke on an inline team completes synchronously, so a
        // process that was allocated would have fired the callback by now.
        let fired = Arc::new(AtomicUsize::new(0));
        let fired_in = Arc::clone(&fired);
        let result = manager.invoke_process(
            Arc::new(42u32),
            Duration::ZERO,
            Some(Box::new(move |_| {
                fired_in.fetch_add(1, Ordering::SeqCst);
            })),
        );
        assert!(matches!(
            result,
            Err(InvokeError::InvalidParameterType { .. })
        ));
        assert_eq!(fired.load(Ordering::SeqCst), 0);
        office.close();
    }

    #[test]
    fn test_invoke_runs_function_and_completes_process() {
        let office = Office::open(FloorConfig::default(), OfficeMeta::empty());
        let recorder = Recorder::arc();
        let team: TeamRef = DirectTeam::new("inline");
        let manager = office.function_manager(
            Arc::new(RecordingFunction {
                recorder: recorder.clone(),
            }),
            FunctionMeta::new::<String>("recording", team),
        );

        let process = manager
            .invoke_process(Arc::new(String::from("go")), Duration::ZERO, None)
            .unwrap();
        assert_eq!(recorder.runs.load(Ordering::SeqCst), 1);
        assert!(process.is_complete());
        office.close();
    }

    struct FailingFunction;

    impl ManagedFunction for FailingFunction {
        fn name(&self) -> &str {
            "failing"
        }
        fn run(&self, _ctx: &mut FunctionContext<'_>) -> Result<(), Escalation> {
            Err(Escalation::FunctionFailure {
                function: "failing".into(),
                cause: "boom".into(),
            })
        }
    }

    #[test]
    fn test_unhandled_escalation_is_fatal_to_process() {
        let office = Office::open(FloorConfig::default(), OfficeMeta::empty());
        let team: TeamRef = DirectTeam::new("inline");
        let manager = office.function_manager(
            Arc::new(FailingFunction),
            FunctionMeta::new::<()>("failing", team),
        );

        let process = manager
            .invoke_process(Arc::new(()), Duration::ZERO, None)
            .unwrap();
        assert!(process.is_complete());
        assert!(matches!(
            process.process().failure(),
            Some(Escalation::FunctionFailure { .. })
        ));
        office.close();
    }

    #[test]
    fn test_office_procedure_gets_first_refusal() {
        use super::super::function::EscalationProcedure;

        struct Swallow(Arc<AtomicUsize>);
        impl EscalationProcedure for Swallow {
            fn handle(&self, _escalation: &Escalation) -> bool {
                self.0.fetch_add(1, Ordering::SeqCst);
                true
            }
        }

        let handled = Arc::new(AtomicUsize::new(0));
        let meta = OfficeMeta::new("office")
            .with_escalation_procedure(Arc::new(Swallow(handled.clone())))
            .build();
        let office = Office::open(FloorConfig::default(), meta);
        let team: TeamRef = DirectTeam::new("inline");
        let manager = office.function_manager(
            Arc::new(FailingFunction),
            FunctionMeta::new::<()>("failing", team),
        );

        let process = manager
            .invoke_process(Arc::new(()), Duration::ZERO, None)
            .unwrap();
        assert_eq!(handled.load(Ordering::SeqCst), 1);
        assert!(process.is_complete());
        assert!(process.process().failure().is_none());
        office.close();
    }

    #[tokio::test]
    async fn test_delayed_invoke_runs_off_the_runtime_thread() {
        let office = Office::open(FloorConfig::default(), OfficeMeta::empty());
        let recorder = Recorder::arc();
        let team = office.breakout();
        let manager = office.function_manager(
            Arc::new(RecordingFunction {
                recorder: recorder.clone(),
            }),
            FunctionMeta::new::<String>("recording", team),
        );

        let mut process = manager
            .invoke_process(
                Arc::new(String::from("later")),
                Duration::from_millis(10),
                None,
            )
            .unwrap();
        assert_eq!(recorder.runs.load(Ordering::SeqCst), 0);
        assert_eq!(process.wait_complete().await, None);
        assert_eq!(recorder.runs.load(Ordering::SeqCst), 1);
        assert_ne!(*lock(&recorder.thread), Some(std::thread::current().id()));
        office.close();
    }

    #[tokio::test]
    async fn test_attached_subscriber_observes_completion() {
        use crate::events::{Event, EventKind};
        use async_trait::async_trait;

        struct Counting {
            seen: Arc<AtomicUsize>,
        }

        #[async_trait]
        impl Subscribe for Counting {
            async fn on_event(&self, ev: &Event) {
                if ev.kind == EventKind::ProcessComplete {
                    self.seen.fetch_add(1, Ordering::SeqCst);
                }
            }
            fn name(&self) -> &'static str {
                "counting"
            }
        }

        let office = Office::open(FloorConfig::default(), OfficeMeta::empty());
        let seen = Arc::new(AtomicUsize::new(0));
        let subscriber: Arc<dyn Subscribe> = Arc::new(Counting { seen: seen.clone() });
        office.attach_subscribers(vec![subscriber]);
        // Let the listener subscribe before any event is published.
        tokio::task::yield_now().await;

        let team = office.breakout();
        let manager = office.function_manager(
            Arc::new(RecordingFunction {
                recorder: Recorder::arc(),
            }),
            FunctionMeta::new::<String>("recording", team),
        );
        let mut process = manager
            .invoke_process(Arc::new(String::from("go")), Duration::ZERO, None)
            .unwrap();
        process.wait_complete().await;

        for _ in 0..50 {
            if seen.load(Ordering::SeqCst) == 1 {
                office.close();
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("subscriber never saw process completion");
    }

    fn office_with_object(source: Arc<dyn ManagedObjectSource>) -> Arc<Office> {
        let meta = OfficeMeta::new("office")
            .with_objects(vec![Arc::new(ManagedObjectMeta::new(
                "db",
                source,
                Duration::from_secs(5),
            ))])
            .build();
        Office::open(FloorConfig::default(), meta)
    }

    #[test]
    fn test_state_manager_returns_ready_object() {
        let office = office_with_object(Arc::new(UnitSource));
        let manager = office.state_manager();
        let handle = manager.get_object(0, None).unwrap();
        assert_eq!(*handle.downcast::<u32>().unwrap(), 42);
        manager.close();
        office.close();
    }

    #[test]
    fn test_state_manager_surfaces_source_failure() {
        let office = office_with_object(Arc::new(FailingSource));
        let manager = office.state_manager();
        let result = manager.get_object(0, Some(Duration::from_secs(1)));
        assert!(matches!(
            result,
            Err(Escalation::FailedToSourceManagedObject { .. })
        ));
        manager.close();
        office.close();
    }

    #[test]
    fn test_state_manager_close_runs_recycles() {
        struct CountingRecycle(Arc<AtomicUsize>);
        impl Recycle for CountingRecycle {
            fn recycle(&self, _handle: ObjectHandle) {
                self.0.fetch_add(1, Ordering::SeqCst);
            }
        }

        let recycled = Arc::new(AtomicUsize::new(0));
        let meta = OfficeMeta::new("office")
            .with_objects(vec![Arc::new(
                ManagedObjectMeta::new("db", Arc::new(UnitSource), Duration::from_secs(5))
                    .with_recycle(Arc::new(CountingRecycle(recycled.clone()))),
            )])
            .build();
        let office = Office::open(FloorConfig::default(), meta);

        let manager = office.state_manager();
        manager.get_object(0, None).unwrap();
        assert_eq!(recycled.load(Ordering::SeqCst), 0);
        manager.close();
        assert_eq!(recycled.load(Ordering::SeqCst), 1);
        office.close();
    }
}
