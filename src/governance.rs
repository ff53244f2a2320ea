//! # Governance: cross-cutting control over groups of managed objects.
//!
//! A governance (e.g. a transaction) collects the managed objects registered
//! under it while active on a thread, then settles them all at once when the
//! thread completes or the governance is explicitly deactivated.
//!
//! ```text
//! activate ──► register(object)* ──► enforce | disregard ──► unregister*
//! ```
//!
//! ## Rules
//! - Registration is per thread and per slot; an object registers at most
//!   once per active governance.
//! - Deactivation settles every registered object in one call, then
//!   unregisters them so a later activation starts empty.
//! - The thread's completion strategy decides between enforce (commit) and
//!   disregard (rollback) for governance still active at completion.

use std::sync::{Arc, Mutex};

use crate::events::{Bus, Event, EventKind};
use crate::objects::{ManagedObjectContainer, ObjectHandle};
use crate::util::lock;

/// How still-active governance is settled at thread completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GovernanceStrategy {
    /// Apply the governance over the registered objects (commit).
    Enforce,
    /// Drop the governance without applying it (rollback).
    Disregard,
}

/// Application-supplied governance over registered objects.
pub trait Governance: Send + Sync {
    /// Stable governance name for diagnostics.
    fn name(&self) -> &str;

    /// Called as each object registers under the active governance.
    fn govern(&self, _object: &ObjectHandle) {}

    /// Applies the governance over all registered objects.
    fn enforce(&self, objects: &[ObjectHandle]);

    /// Drops the governance over all registered objects without applying it.
    fn disregard(&self, objects: &[ObjectHandle]);
}

struct Registered {
    container: Arc<ManagedObjectContainer>,
    handle: ObjectHandle,
}

/// Per-thread container tracking the objects registered under one governance
/// slot.
pub struct GovernanceContainer {
    governance: Arc<dyn Governance>,
    slot: usize,
    bus: Bus,
    registered: Mutex<Vec<Registered>>,
}

impl GovernanceContainer {
    pub(crate) fn new(governance: Arc<dyn Governance>, slot: usize, bus: Bus) -> Arc<Self> {
        Arc::new(Self {
            governance,
            slot,
            bus,
            registered: Mutex::new(Vec::new()),
        })
    }

    /// Registers an object under the active governance.
    pub(crate) fn register(&self, container: Arc<ManagedObjectContainer>, handle: ObjectHandle) {
        self.governance.govern(&handle);
        lock(&self.registered).push(Registered { container, handle });
    }

    /// Number of currently registered objects.
    pub fn registered_count(&self) -> usize {
        lock(&self.registered).len()
    }

    /// Settles all registered objects according to `strategy`, then
    /// unregisters them.
    pub(crate) fn deactivate(&self, strategy: GovernanceStrategy) {
        let registered: Vec<Registered> = lock(&self.registered).drain(..).collect();
        let handles: Vec<ObjectHandle> = registered.iter().map(|r| r.handle.clone()).collect();

        let kind = match strategy {
            GovernanceStrategy::Enforce => {
                self.governance.enforce(&handles);
                EventKind::GovernanceEnforced
            }
            GovernanceStrategy::Disregard => {
                self.governance.disregard(&handles);
                EventKind::GovernanceDisregarded
            }
        };
        self.bus
            .publish(Event::now(kind).with_object(self.governance.name()));

        for entry in registered {
            entry.container.unregister_governance(self.slot);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use crate::error::SourceFailure;
    use crate::exec::test_support::{collector_job, manual_services, CollectingTeam};
    use crate::monitor::ActivateSet;
    use crate::objects::{ManagedObjectMeta, ManagedObjectSource, SourcingUser};
    use crate::states::CleanupSequence;

    use super::*;

    struct UnitSource;

    impl ManagedObjectSource for UnitSource {
        fn source(&self, user: SourcingUser) -> Result<(), SourceFailure> {
            user.set_object(Arc::new(()));
            Ok(())
        }
    }

    struct RecordingGovernance {
        enforced: AtomicUsize,
        disregarded: AtomicUsize,
    }

    impl RecordingGovernance {
        fn arc() -> Arc<Self> {
            Arc::new(Self {
                enforced: AtomicUsize::new(0),
                disregarded: AtomicUsize::new(0),
            })
        }
    }

    impl Governance for RecordingGovernance {
        fn name(&self) -> &str {
            "txn"
        }
        fn enforce(&self, objects: &[ObjectHandle]) {
            self.enforced.fetch_add(objects.len(), Ordering::SeqCst);
        }
        fn disregard(&self, objects: &[ObjectHandle]) {
            self.disregarded.fetch_add(objects.len(), Ordering::SeqCst);
        }
    }

    fn ready_container() -> Arc<ManagedObjectContainer> {
        let (services, _clock) = manual_services();
        let container = ManagedObjectContainer::new(
            Arc::new(ManagedObjectMeta::new(
                "db",
                Arc::new(UnitSource),
                Duration::from_secs(5),
            )),
            services,
            CleanupSequence::new(),
        );
        let team = CollectingTeam::arc();
        let job = collector_job(&team);
        let mut set = ActivateSet::new();
        assert!(container.load(&job, 0, &mut set));
        container
    }

    #[test]
    fn test_enforce_settles_and_unregisters() {
        let governance = RecordingGovernance::arc();
        let (services, _clock) = manual_services();
        let slot = GovernanceContainer::new(governance.clone(), 0, services.bus.clone());

        let container = ready_container();
        let handle = container.object_handle().unwrap();
        slot.register(container, handle);
        assert_eq!(slot.registered_count(), 1);

        slot.deactivate(GovernanceStrategy::Enforce);
        assert_eq!(governance.enforced.load(Ordering::SeqCst), 1);
        assert_eq!(governance.disregarded.load(Ordering::SeqCst), 0);
        assert_eq!(slot.registered_count(), 0);
    }

    #[test]
    fn test_disregard_never_enforces() {
        let governance = RecordingGovernance::arc();
        let (services, _clock) = manual_services();
        let slot = GovernanceContainer::new(governance.clone(), 0, services.bus.clone());

        let container = ready_container();
        let handle = container.object_handle().unwrap();
        slot.register(container, handle);

        slot.deactivate(GovernanceStrategy::Disregard);
        assert_eq!(governance.enforced.load(Ordering::SeqCst), 0);
        assert_eq!(governance.disregarded.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_deactivation_with_nothing_registered_is_harmless() {
        let governance = RecordingGovernance::arc();
        let (services, _clock) = manual_services();
        let slot = GovernanceContainer::new(governance.clone(), 0, services.bus.clone());

        slot.deactivate(GovernanceStrategy::Enforce);
        assert_eq!(governance.enforced.load(Ordering::SeqCst), 0);
    }
}
