//! # Managed object container: the per-resource lifecycle state machine.
//!
//! Each container wraps exactly one externally supplied resource instance
//! and serializes every transition under its own lock.
//!
//! ## States
//! ```text
//! Unsourced ──► Sourcing ──► Ready ──► InOperation ──► Ready
//!                  │           │            │
//!                  │           │            └─► OperationTimedOut
//!                  ├─► SourcingTimedOut
//!                  └─► Failed
//! any non-terminal ──► Unloaded ──(fresh load)──► Unsourced
//! ```
//!
//! ## Rules
//! - At most one in-flight sourcing attempt; pooled and direct sourcing are
//!   mutually exclusive (encoded in [`Sourcing`]).
//! - Once failed or timed out, the container stays failed until explicitly
//!   unloaded: every further entry point reports the latched failure without
//!   re-attempting sourcing.
//! - A failure explicitly *reported* by the source escalates; a source panic
//!   is a runtime fault and propagates.
//! - Governance checks run before coordination; coordination is skipped
//!   entirely for non-coordinating resources.
//! - Unload permanently activates both monitors so no residual waiter blocks
//!   forever; a fresh load after unload starts a brand-new lifecycle with
//!   fresh monitors.

use std::sync::{Arc, Mutex, Weak};

use crate::context::FloorServices;
use crate::error::{Escalation, SourceFailure};
use crate::events::{Event, EventKind};
use crate::exec::Job;
use crate::monitor::{ActivateSet, AssetKind, AssetMonitor};
use crate::states::{CleanupSequence, ThreadState};
use crate::util::lock;

use super::meta::{DependencyRegistry, ManagedObjectMeta, ObjectHandle, Sourcing};

/// Lifecycle state of a managed object container.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerState {
    /// No sourcing attempt has been made.
    Unsourced,
    /// Sourcing is in flight.
    Sourcing,
    /// The object is sourced and usable.
    Ready,
    /// Sourcing exceeded the configured timeout (permanent).
    SourcingTimedOut,
    /// Sourcing reported failure (permanent).
    Failed,
    /// An asynchronous operation is in flight.
    InOperation,
    /// An asynchronous operation exceeded the timeout (permanent).
    OperationTimedOut,
    /// The object was unloaded.
    Unloaded,
}

struct ContainerInner {
    state: ContainerState,
    object: Option<ObjectHandle>,
    sourcing_monitor: Arc<AssetMonitor>,
    operations_monitor: Arc<AssetMonitor>,
    source_started: u64,
    operation_started: u64,
    coordinated: bool,
    failure: Option<Escalation>,
    governance_registered: Vec<usize>,
}

/// Per-resource lifecycle state machine wrapping one resource instance.
pub struct ManagedObjectContainer {
    meta: Arc<ManagedObjectMeta>,
    services: FloorServices,
    cleanup: Arc<CleanupSequence>,
    inner: Mutex<ContainerInner>,
}

/// Handle given to a source (or pool) for completing a sourcing attempt and
/// for asynchronous operation notifications.
///
/// Cloneable; safe to retain and invoke from any thread. Late calls after
/// unload or failure are discarded (a late pooled instance is returned to
/// its pool).
#[derive(Clone)]
pub struct SourcingUser {
    container: Weak<ManagedObjectContainer>,
}

impl SourcingUser {
    /// Completes sourcing with the produced instance.
    pub fn set_object(&self, handle: ObjectHandle) {
        if let Some(container) = self.container.upgrade() {
            container.sourced_object(handle);
        }
    }

    /// Reports sourcing failure.
    pub fn set_failure(&self, failure: SourceFailure) {
        if let Some(container) = self.container.upgrade() {
            container.sourcing_failed(failure);
        }
    }

    /// Flags the start of an asynchronous operation.
    pub fn notify_started(&self) {
        if let Some(container) = self.container.upgrade() {
            container.operation_started();
        }
    }

    /// Flags the completion of an asynchronous operation.
    ///
    /// May arrive on an arbitrary external thread; wakes the operations
    /// monitor without an activation set.
    pub fn notify_complete(&self) {
        if let Some(container) = self.container.upgrade() {
            container.operation_complete();
        }
    }
}

impl ManagedObjectContainer {
    /// Creates a container for `meta`, recording teardown into `cleanup`.
    pub fn new(
        meta: Arc<ManagedObjectMeta>,
        services: FloorServices,
        cleanup: Arc<CleanupSequence>,
    ) -> Arc<Self> {
        let sourcing_monitor = Self::sourcing_monitor(&meta, &services);
        let operations_monitor = Self::operations_monitor(&meta, &services);
        let container = Arc::new(Self {
            meta,
            services,
            cleanup,
            inner: Mutex::new(ContainerInner {
                state: ContainerState::Unsourced,
                object: None,
                sourcing_monitor,
                operations_monitor,
                source_started: 0,
                operation_started: 0,
                coordinated: false,
                failure: None,
                governance_registered: Vec::new(),
            }),
        });
        container.install_hooks();
        container
    }

    /// Resource name.
    pub fn name(&self) -> &str {
        self.meta.name()
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ContainerState {
        lock(&self.inner).state
    }

    /// The sourced instance, when ready or in operation.
    pub fn object_handle(&self) -> Option<ObjectHandle> {
        lock(&self.inner).object.clone()
    }

    fn sourcing_monitor(meta: &Arc<ManagedObjectMeta>, services: &FloorServices) -> Arc<AssetMonitor> {
        AssetMonitor::new(
            AssetKind::Sourcing {
                object: meta.name().to_string(),
                timeout: meta.timeout(),
            },
            Arc::clone(&services.registry),
            services.bus.clone(),
        )
    }

    fn operations_monitor(
        meta: &Arc<ManagedObjectMeta>,
        services: &FloorServices,
    ) -> Arc<AssetMonitor> {
        AssetMonitor::new(
            AssetKind::Operation {
                object: meta.name().to_string(),
                timeout: meta.timeout(),
            },
            Arc::clone(&services.registry),
            services.bus.clone(),
        )
    }

    /// Wires the monitors' expiry hooks back to this container so a sweep
    /// that expires waiters also transitions the container state.
    fn install_hooks(self: &Arc<Self>) {
        let inner = lock(&self.inner);
        self.hook_monitors(&inner);
    }

    // === Load ===

    /// Attempts to make the object available, sourcing it if necessary.
    ///
    /// Returns `true` when the object is ready. Returns `false` when the job
    /// must wait (registered on the sourcing monitor) or the container is
    /// failed (failure delivered through `set`).
    pub fn load(self: &Arc<Self>, requester: &Job, now: u64, set: &mut ActivateSet) -> bool {
        let monitor = {
            let mut inner = lock(&self.inner);
            match inner.state {
                ContainerState::Ready | ContainerState::InOperation => return true,
                ContainerState::Failed
                | ContainerState::SourcingTimedOut
                | ContainerState::OperationTimedOut => {
                    let failure = self.latched_failure(&inner);
                    drop(inner);
                    set.fail(requester.clone(), failure);
                    return false;
                }
                ContainerState::Sourcing => {
                    let monitor = Arc::clone(&inner.sourcing_monitor);
                    let deadline = inner.source_started + self.meta.timeout_millis();
                    drop(inner);
                    monitor.wait(requester.clone(), Some(deadline), None, set);
                    return false;
                }
                ContainerState::Unloaded => {
                    // Fresh lifecycle: new monitors, no leaked waiters.
                    self.reset(&mut inner);
                    inner.state = ContainerState::Sourcing;
                    inner.source_started = now;
                    Arc::clone(&inner.sourcing_monitor)
                }
                ContainerState::Unsourced => {
                    inner.state = ContainerState::Sourcing;
                    inner.source_started = now;
                    Arc::clone(&inner.sourcing_monitor)
                }
            }
        };

        // Source outside the container lock: a synchronous source completes
        // through the user handle, which re-enters this container.
        let user = SourcingUser {
            container: Arc::downgrade(self),
        };
        let attempt = match self.meta.sourcing() {
            Sourcing::Direct(source) => source.source(user),
            Sourcing::Pooled(pool) => pool.source(user),
        };
        if let Err(failure) = attempt {
            self.sourcing_failed(failure);
        }

        let inner = lock(&self.inner);
        match inner.state {
            ContainerState::Ready => true,
            ContainerState::Sourcing => {
                // Deferred sourcing: park the requester until resolution.
                let deadline = inner.source_started + self.meta.timeout_millis();
                drop(inner);
                monitor.wait(requester.clone(), Some(deadline), None, set);
                false
            }
            _ => {
                let failure = self.latched_failure(&inner);
                drop(inner);
                set.fail(requester.clone(), failure);
                false
            }
        }
    }

    fn reset(self: &Arc<Self>, inner: &mut ContainerInner) {
        inner.sourcing_monitor = Self::sourcing_monitor(&self.meta, &self.services);
        inner.operations_monitor = Self::operations_monitor(&self.meta, &self.services);
        inner.object = None;
        inner.coordinated = false;
        inner.failure = None;
        inner.governance_registered.clear();
        self.hook_monitors(inner);
    }

    fn hook_monitors(self: &Arc<Self>, inner: &ContainerInner) {
        let weak = Arc::downgrade(self);
        inner.sourcing_monitor.set_expiry_hook(Box::new(move |now, set| {
            if let Some(container) = weak.upgrade() {
                container.sourcing_expired(now, set);
            }
        }));
        let weak = Arc::downgrade(self);
        inner
            .operations_monitor
            .set_expiry_hook(Box::new(move |now, set| {
                if let Some(container) = weak.upgrade() {
                    container.operation_expired(now, set);
                }
            }));
    }

    fn latched_failure(&self, inner: &ContainerInner) -> Escalation {
        inner
            .failure
            .clone()
            .unwrap_or_else(|| Escalation::FailedToSourceManagedObject {
                object: self.meta.name().to_string(),
                cause: "managed object unavailable".to_string(),
            })
    }

    // === Sourcing callbacks ===

    /// Completes sourcing with `handle`; wakes sourcing waiters.
    fn sourced_object(&self, handle: ObjectHandle) {
        let monitor = {
            let mut inner = lock(&self.inner);
            match inner.state {
                ContainerState::Sourcing => {
                    inner.object = Some(handle.clone());
                    inner.state = ContainerState::Ready;
                    Arc::clone(&inner.sourcing_monitor)
                }
                _ => {
                    // Late arrival after failure/unload: discard, returning a
                    // pooled instance to its pool.
                    if let Sourcing::Pooled(pool) = self.meta.sourcing() {
                        pool.give_back(handle);
                    }
                    return;
                }
            }
        };

        if let Some(bound) = self.meta.bound_name() {
            match self.meta.sourcing() {
                Sourcing::Direct(source) => source.object_bound(&handle, bound),
                Sourcing::Pooled(pool) => pool.object_bound(&handle, bound),
            }
        }

        self.services
            .bus
            .publish(Event::now(EventKind::ObjectReady).with_object(self.meta.name()));

        let mut set = ActivateSet::new();
        monitor.activate_all(&mut set, false);
        set.apply();
    }

    /// Fails the container permanently with a reported sourcing failure.
    fn sourcing_failed(&self, failure: SourceFailure) {
        let escalation = Escalation::FailedToSourceManagedObject {
            object: self.meta.name().to_string(),
            cause: failure.cause,
        };
        let (sourcing, operations) = {
            let mut inner = lock(&self.inner);
            inner.state = ContainerState::Failed;
            inner.failure = Some(escalation.clone());
            (
                Arc::clone(&inner.sourcing_monitor),
                Arc::clone(&inner.operations_monitor),
            )
        };
        self.services.bus.publish(
            Event::now(EventKind::SourcingFailed)
                .with_object(self.meta.name())
                .with_reason(escalation.as_message()),
        );
        let mut set = ActivateSet::new();
        sourcing.fail_all(&mut set, escalation.clone(), true);
        operations.fail_all(&mut set, escalation, true);
        set.apply();
    }

    // === Timeout transitions ===

    fn sourcing_expired(&self, _now: u64, set: &mut ActivateSet) {
        let escalation = Escalation::SourceManagedObjectTimedOut {
            object: self.meta.name().to_string(),
            timeout: self.meta.timeout(),
        };
        let monitor = {
            let mut inner = lock(&self.inner);
            if inner.state != ContainerState::Sourcing {
                return;
            }
            inner.state = ContainerState::SourcingTimedOut;
            inner.failure = Some(escalation.clone());
            Arc::clone(&inner.sourcing_monitor)
        };
        self.services.bus.publish(
            Event::now(EventKind::SourcingTimedOut)
                .with_object(self.meta.name())
                .with_timeout(self.meta.timeout()),
        );
        monitor.fail_all(set, escalation, true);
    }

    fn operation_expired(&self, _now: u64, set: &mut ActivateSet) {
        let escalation = Escalation::ManagedObjectOperationTimedOut {
            object: self.meta.name().to_string(),
            timeout: self.meta.timeout(),
        };
        let monitor = {
            let mut inner = lock(&self.inner);
            if inner.state != ContainerState::InOperation {
                return;
            }
            inner.state = ContainerState::OperationTimedOut;
            inner.failure = Some(escalation.clone());
            Arc::clone(&inner.operations_monitor)
        };
        self.services.bus.publish(
            Event::now(EventKind::OperationTimedOut)
                .with_object(self.meta.name())
                .with_timeout(self.meta.timeout()),
        );
        monitor.fail_all(set, escalation, true);
    }

    // === Governance ===

    /// Registers this object with every governance slot active on
    /// `thread`.
    ///
    /// Returns `false` when the job must wait (object still sourcing) or the
    /// container is failed.
    pub fn govern(
        self: &Arc<Self>,
        thread: &Arc<ThreadState>,
        requester: &Job,
        _now: u64,
        set: &mut ActivateSet,
    ) -> bool {
        let (handle, pending) = {
            let inner = lock(&self.inner);
            match inner.state {
                ContainerState::Ready | ContainerState::InOperation => {}
                ContainerState::Sourcing => {
                    let monitor = Arc::clone(&inner.sourcing_monitor);
                    let deadline = inner.source_started + self.meta.timeout_millis();
                    drop(inner);
                    monitor.wait(requester.clone(), Some(deadline), None, set);
                    return false;
                }
                _ => {
                    let failure = self.latched_failure(&inner);
                    drop(inner);
                    set.fail(requester.clone(), failure);
                    return false;
                }
            }
            let handle = match inner.object.clone() {
                Some(handle) => handle,
                None => return true,
            };
            let pending: Vec<usize> = self
                .meta
                .governance()
                .iter()
                .copied()
                .filter(|slot| {
                    thread.governance_active(*slot) && !inner.governance_registered.contains(slot)
                })
                .collect();
            (handle, pending)
        };

        for slot in pending {
            let governance = thread.governance_container(slot);
            governance.register(Arc::clone(self), handle.clone());
            lock(&self.inner).governance_registered.push(slot);
        }
        true
    }

    /// Removes this container's registration for governance slot `slot`.
    ///
    /// Called by the governance container during deactivation so the
    /// unregistration bookkeeping stays consistent.
    pub fn unregister_governance(&self, slot: usize) {
        lock(&self.inner).governance_registered.retain(|s| *s != slot);
    }

    // === Coordination ===

    /// Binds the object's dependency registry once every dependency is
    /// ready.
    ///
    /// Skipped entirely for non-coordinating resources. Each dependency is
    /// loaded (sourced if this is its first use) and readiness-checked first;
    /// any not-ready dependency parks the requester on that dependency's
    /// monitor without binding anything.
    pub fn coordinate(
        self: &Arc<Self>,
        thread: &Arc<ThreadState>,
        requester: &Job,
        now: u64,
        set: &mut ActivateSet,
    ) -> bool {
        let Some(coordinator) = self.meta.coordinator() else {
            return true;
        };
        {
            let inner = lock(&self.inner);
            if inner.coordinated {
                return true;
            }
        }

        let mut handles = Vec::with_capacity(self.meta.dependencies().len());
        for &dependency in self.meta.dependencies() {
            let container = thread.container(dependency);
            if !container.load(requester, now, set)
                || !container.is_ready(requester, now, set)
            {
                return false;
            }
            match container.object_handle() {
                Some(handle) => handles.push(handle),
                None => return false,
            }
        }

        let handle = match self.object_handle() {
            Some(handle) => handle,
            None => return false,
        };
        let registry = DependencyRegistry::new(handles);
        if let Err(failure) = coordinator.coordinate(&handle, &registry) {
            self.sourcing_failed(failure);
            let escalation = self.latched_failure(&lock(&self.inner));
            set.fail(requester.clone(), escalation);
            return false;
        }

        lock(&self.inner).coordinated = true;
        true
    }

    // === Readiness ===

    /// Checks whether the object is ready, applying timeouts.
    ///
    /// For `Sourcing`/`InOperation`, compares `now` against the deadline:
    /// exceeding it fails the container permanently and reports not-ready;
    /// otherwise the requester is registered on the appropriate monitor.
    pub fn is_ready(self: &Arc<Self>, requester: &Job, now: u64, set: &mut ActivateSet) -> bool {
        enum Pending {
            Wait(Arc<AssetMonitor>, u64),
            SourcingExpired,
            OperationExpired,
            Failed(Escalation),
        }

        let pending = {
            let inner = lock(&self.inner);
            match inner.state {
                ContainerState::Ready => return true,
                ContainerState::Sourcing => {
                    let deadline = inner.source_started + self.meta.timeout_millis();
                    if now >= deadline {
                        Pending::SourcingExpired
                    } else {
                        Pending::Wait(Arc::clone(&inner.sourcing_monitor), deadline)
                    }
                }
                ContainerState::InOperation => {
                    let deadline = inner.operation_started + self.meta.timeout_millis();
                    if now >= deadline {
                        Pending::OperationExpired
                    } else {
                        Pending::Wait(Arc::clone(&inner.operations_monitor), deadline)
                    }
                }
                ContainerState::Failed
                | ContainerState::SourcingTimedOut
                | ContainerState::OperationTimedOut => Pending::Failed(self.latched_failure(&inner)),
                ContainerState::Unsourced | ContainerState::Unloaded => return false,
            }
        };

        match pending {
            Pending::Wait(monitor, deadline) => {
                monitor.wait(requester.clone(), Some(deadline), None, set);
                false
            }
            Pending::SourcingExpired => {
                self.sourcing_expired(now, set);
                set.fail(requester.clone(), self.latched_failure(&lock(&self.inner)));
                false
            }
            Pending::OperationExpired => {
                self.operation_expired(now, set);
                set.fail(requester.clone(), self.latched_failure(&lock(&self.inner)));
                false
            }
            Pending::Failed(escalation) => {
                set.fail(requester.clone(), escalation);
                false
            }
        }
    }

    // === Asynchronous operation ===

    /// An asynchronous operation started; the container leaves `Ready`.
    fn operation_started(&self) {
        let enlist = {
            let mut inner = lock(&self.inner);
            if inner.state != ContainerState::Ready || !self.meta.is_asynchronous() {
                return;
            }
            inner.state = ContainerState::InOperation;
            inner.operation_started = self.services.now();
            (
                Arc::clone(&inner.operations_monitor),
                inner.operation_started + self.meta.timeout_millis(),
            )
        };
        self.services.registry.enlist(enlist.1, &enlist.0);
    }

    /// An asynchronous operation completed; wakes the operations monitor.
    ///
    /// No activation set: this may run on an arbitrary external thread.
    fn operation_complete(&self) {
        let monitor = {
            let mut inner = lock(&self.inner);
            if inner.state != ContainerState::InOperation {
                return;
            }
            inner.state = ContainerState::Ready;
            Arc::clone(&inner.operations_monitor)
        };
        monitor.notify_detached();
    }

    // === Unload ===

    /// Unloads the object: recycle is handed to the cleanup sequence, or a
    /// pooled instance is returned to its pool. Both monitors are then
    /// permanently activated so no residual waiter blocks forever.
    pub fn unload(&self, set: &mut ActivateSet) {
        let (handle, sourcing, operations) = {
            let mut inner = lock(&self.inner);
            if inner.state == ContainerState::Unloaded {
                return;
            }
            inner.state = ContainerState::Unloaded;
            inner.coordinated = false;
            inner.governance_registered.clear();
            (
                inner.object.take(),
                Arc::clone(&inner.sourcing_monitor),
                Arc::clone(&inner.operations_monitor),
            )
        };

        if let Some(handle) = handle {
            if let Some(recycle) = self.meta.recycle() {
                self.cleanup
                    .register(self.meta.name(), Arc::clone(recycle), handle);
            } else if let Sourcing::Pooled(pool) = self.meta.sourcing() {
                pool.give_back(handle);
            }
        }

        self.services
            .bus
            .publish(Event::now(EventKind::ObjectUnloaded).with_object(self.meta.name()));

        sourcing.activate_all(set, true);
        operations.activate_all(set, true);
    }
}
