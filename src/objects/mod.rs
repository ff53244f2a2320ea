//! # Managed objects: sourcing, readiness, and lifecycle containment.
//!
//! ```text
//! ManagedObjectMeta ──► ManagedObjectContainer ──► ObjectHandle
//!        (static)            (per process/thread)     (type-erased)
//! ```
//!
//! Metadata is produced once by the wiring compiler; containers are
//! instantiated per process (or per thread for thread-scoped resources) and
//! own the full lifecycle of one resource instance.

mod container;
mod meta;

pub use container::{ContainerState, ManagedObjectContainer, SourcingUser};
pub use meta::{
    Coordinator, DependencyRegistry, ManagedObjectMeta, ManagedObjectSource, ObjectHandle,
    ObjectPool, Recycle, Sourcing,
};

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use crate::error::{Escalation, SourceFailure};
    use crate::exec::test_support::{
        collector_job, collector_job_on, harness, manual_services, CollectingTeam,
    };
    use crate::monitor::ActivateSet;
    use crate::states::{CleanupSequence, OfficeMeta};
    use crate::util::lock;

    use super::*;

    /// Sources a fresh `u32` synchronously, counting attempts.
    struct CountingSource {
        attempts: AtomicUsize,
    }

    impl CountingSource {
        fn arc() -> Arc<Self> {
            Arc::new(Self {
                attempts: AtomicUsize::new(0),
            })
        }
    }

    impl ManagedObjectSource for CountingSource {
        fn source(&self, user: SourcingUser) -> Result<(), SourceFailure> {
            let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) as u32;
            user.set_object(Arc::new(attempt));
            Ok(())
        }
    }

    /// Always reports failure, counting attempts.
    struct FailingSource {
        attempts: AtomicUsize,
    }

    impl ManagedObjectSource for FailingSource {
        fn source(&self, _user: SourcingUser) -> Result<(), SourceFailure> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            Err(SourceFailure::new("connection refused"))
        }
    }

    /// Never completes; retains the user handle for the test to drive.
    struct DeferredSource {
        user: Mutex<Option<SourcingUser>>,
    }

    impl DeferredSource {
        fn arc() -> Arc<Self> {
            Arc::new(Self {
                user: Mutex::new(None),
            })
        }

        fn user(&self) -> SourcingUser {
            lock(&self.user).clone().unwrap()
        }
    }

    impl ManagedObjectSource for DeferredSource {
        fn source(&self, user: SourcingUser) -> Result<(), SourceFailure> {
            *lock(&self.user) = Some(user);
            Ok(())
        }
    }

    /// Pool that defers sourcing and records returned instances.
    struct DeferredPool {
        user: Mutex<Option<SourcingUser>>,
        returned: AtomicUsize,
    }

    impl DeferredPool {
        fn arc() -> Arc<Self> {
            Arc::new(Self {
                user: Mutex::new(None),
                returned: AtomicUsize::new(0),
            })
        }
    }

    impl ObjectPool for DeferredPool {
        fn source(&self, user: SourcingUser) -> Result<(), SourceFailure> {
            *lock(&self.user) = Some(user);
            Ok(())
        }

        fn give_back(&self, _handle: ObjectHandle) {
            self.returned.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn container_for(meta: ManagedObjectMeta) -> Arc<ManagedObjectContainer> {
        let (services, _clock) = manual_services();
        ManagedObjectContainer::new(Arc::new(meta), services, CleanupSequence::new())
    }

    #[test]
    fn test_synchronous_source_makes_object_ready() {
        let source = CountingSource::arc();
        let container = container_for(ManagedObjectMeta::new(
            "db",
            source.clone(),
            Duration::from_secs(5),
        ));
        let team = CollectingTeam::arc();
        let job = collector_job(&team);
        let mut set = ActivateSet::new();

        assert!(container.load(&job, 0, &mut set));
        assert_eq!(container.state(), ContainerState::Ready);
        assert_eq!(source.attempts.load(Ordering::SeqCst), 1);
        assert!(container.object_handle().is_some());
    }

    #[test]
    fn test_source_failure_is_latched_without_retry() {
        let source = Arc::new(FailingSource {
            attempts: AtomicUsize::new(0),
        });
        let container = container_for(ManagedObjectMeta::new(
            "db",
            source.clone(),
            Duration::from_secs(5),
        ));
        let team = CollectingTeam::arc();
        let job = collector_job(&team);

        let mut set = ActivateSet::new();
        assert!(!container.load(&job, 0, &mut set));
        set.apply();
        assert_eq!(container.state(), ContainerState::Failed);

        // Second attempt reports the same failure without re-sourcing.
        let mut set = ActivateSet::new();
        assert!(!container.load(&job, 10, &mut set));
        set.apply();
        assert_eq!(source.attempts.load(Ordering::SeqCst), 1);

        let failures = team.failures();
        assert_eq!(failures.len(), 2);
        for failure in failures {
            match failure {
                Escalation::FailedToSourceManagedObject { object, cause } => {
                    assert_eq!(object, "db");
                    assert_eq!(cause, "connection refused");
                }
                other => panic!("unexpected escalation: {other:?}"),
            }
        }
    }

    #[test]
    fn test_zero_timeout_expires_exactly_at_deadline() {
        let source = DeferredSource::arc();
        let container = container_for(ManagedObjectMeta::new(
            "slow",
            source.clone(),
            Duration::from_millis(0),
        ));
        let team = CollectingTeam::arc();
        let waiter = collector_job(&team);
        let prober = collector_job(&team);

        let mut set = ActivateSet::new();
        assert!(!container.load(&waiter, 0, &mut set));
        set.apply();
        assert_eq!(container.state(), ContainerState::Sourcing);

        // Deadline is start + 0: already due at the same instant.
        let mut set = ActivateSet::new();
        assert!(!container.is_ready(&prober, 0, &mut set));
        set.apply();
        assert_eq!(container.state(), ContainerState::SourcingTimedOut);

        let failures = team.failures();
        assert_eq!(failures.len(), 2);
        assert!(failures.iter().all(|f| matches!(
            f,
            Escalation::SourceManagedObjectTimedOut { object, .. } if object == "slow"
        )));
    }

    #[test]
    fn test_unload_and_reload_starts_fresh_lifecycle() {
        let source = CountingSource::arc();
        let container = container_for(ManagedObjectMeta::new(
            "db",
            source.clone(),
            Duration::from_secs(5),
        ));
        let team = CollectingTeam::arc();
        let job = collector_job(&team);

        let mut set = ActivateSet::new();
        assert!(container.load(&job, 0, &mut set));
        let first = container.object_handle().unwrap();
        assert_eq!(*first.downcast::<u32>().unwrap(), 0);

        let mut set = ActivateSet::new();
        container.unload(&mut set);
        set.apply();
        assert_eq!(container.state(), ContainerState::Unloaded);
        assert!(container.object_handle().is_none());

        let mut set = ActivateSet::new();
        assert!(container.load(&job, 100, &mut set));
        let second = container.object_handle().unwrap();
        assert_eq!(*second.downcast::<u32>().unwrap(), 1);
        assert_eq!(source.attempts.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_async_operation_parks_then_completion_wakes() {
        let source = DeferredSource::arc();
        let container = container_for(
            ManagedObjectMeta::new("store", source.clone(), Duration::from_secs(5)).asynchronous(),
        );
        let team = CollectingTeam::arc();
        let job = collector_job(&team);

        let mut set = ActivateSet::new();
        assert!(!container.load(&job, 0, &mut set));
        set.apply();
        source.user().set_object(Arc::new(7u32));
        assert_eq!(container.state(), ContainerState::Ready);
        assert_eq!(team.woken(), 1);

        source.user().notify_started();
        assert_eq!(container.state(), ContainerState::InOperation);

        let mut set = ActivateSet::new();
        assert!(!container.is_ready(&job, 1, &mut set));
        set.apply();

        source.user().notify_complete();
        assert_eq!(container.state(), ContainerState::Ready);
        assert_eq!(team.woken(), 2);
    }

    /// Records coordination calls and the handles bound at each slot.
    struct RecordingCoordinator {
        calls: AtomicUsize,
        bound: Mutex<Vec<ObjectHandle>>,
    }

    impl RecordingCoordinator {
        fn arc() -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                bound: Mutex::new(Vec::new()),
            })
        }
    }

    impl Coordinator for RecordingCoordinator {
        fn coordinate(
            &self,
            _object: &ObjectHandle,
            dependencies: &DependencyRegistry,
        ) -> Result<(), SourceFailure> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let mut bound = lock(&self.bound);
            for slot in 0..dependencies.len() {
                if let Some(handle) = dependencies.dependency(slot) {
                    bound.push(handle.clone());
                }
            }
            Ok(())
        }
    }

    /// Slot 0 is the dependency, slot 1 the coordinating object.
    fn coordination_office(
        dep_source: Arc<dyn ManagedObjectSource>,
        coordinator: Arc<dyn Coordinator>,
    ) -> Arc<OfficeMeta> {
        OfficeMeta::new("office")
            .with_objects(vec![
                Arc::new(ManagedObjectMeta::new(
                    "dep",
                    dep_source,
                    Duration::from_secs(5),
                )),
                Arc::new(
                    ManagedObjectMeta::new("coord", CountingSource::arc(), Duration::from_secs(5))
                        .with_coordinator(coordinator, vec![0]),
                ),
            ])
            .build()
    }

    #[test]
    fn test_coordinate_sources_dependency_and_binds_registry() {
        let coordinator = RecordingCoordinator::arc();
        let office = coordination_office(CountingSource::arc(), coordinator.clone());
        let (services, _clock) = manual_services();
        let (_process, thread) = harness(&services, office);
        let team = CollectingTeam::arc();
        let job = collector_job_on(&team, Arc::clone(&thread));

        let coordinating = thread.container(1);
        let mut set = ActivateSet::new();
        assert!(coordinating.load(&job, 0, &mut set));
        // The dependency was never loaded explicitly; coordination sources it.
        assert!(coordinating.coordinate(&thread, &job, 0, &mut set));
        set.apply();

        assert_eq!(thread.container(0).state(), ContainerState::Ready);
        assert_eq!(coordinator.calls.load(Ordering::SeqCst), 1);
        let bound = lock(&coordinator.bound);
        assert_eq!(bound.len(), 1);

        // Already coordinated: a repeat is a no-op.
        drop(bound);
        let mut set = ActivateSet::new();
        assert!(coordinating.coordinate(&thread, &job, 0, &mut set));
        assert_eq!(coordinator.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_coordinate_parks_on_deferred_dependency_then_resumes() {
        let dep = DeferredSource::arc();
        let coordinator = RecordingCoordinator::arc();
        let office = coordination_office(dep.clone(), coordinator.clone());
        let (services, _clock) = manual_services();
        let (_process, thread) = harness(&services, office);
        let team = CollectingTeam::arc();
        let job = collector_job_on(&team, Arc::clone(&thread));

        let coordinating = thread.container(1);
        let mut set = ActivateSet::new();
        assert!(coordinating.load(&job, 0, &mut set));
        assert!(!coordinating.coordinate(&thread, &job, 0, &mut set));
        set.apply();

        // The requester is parked on the dependency's sourcing monitor, not
        // dropped: completing the dependency re-activates it.
        assert_eq!(thread.container(0).state(), ContainerState::Sourcing);
        assert_eq!(team.woken(), 0);
        assert!(team.failures().is_empty());

        dep.user().set_object(Arc::new(1u32));
        assert_eq!(team.woken(), 1);

        let mut set = ActivateSet::new();
        assert!(coordinating.coordinate(&thread, &job, 0, &mut set));
        assert_eq!(coordinator.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_operation_timeout_latches_container() {
        let source = DeferredSource::arc();
        let container = container_for(
            ManagedObjectMeta::new("store", source.clone(), Duration::from_millis(100))
                .asynchronous(),
        );
        let team = CollectingTeam::arc();
        let job = collector_job(&team);

        let mut set = ActivateSet::new();
        assert!(!container.load(&job, 0, &mut set));
        set.apply();
        source.user().set_object(Arc::new(7u32));
        assert_eq!(team.woken(), 1);

        source.user().notify_started();
        assert_eq!(container.state(), ContainerState::InOperation);

        // At the operation deadline: permanent failure, not a wait.
        let mut set = ActivateSet::new();
        assert!(!container.is_ready(&job, 100, &mut set));
        set.apply();
        assert_eq!(container.state(), ContainerState::OperationTimedOut);
        let failures = team.failures();
        assert_eq!(failures.len(), 1);
        assert!(matches!(
            &failures[0],
            Escalation::ManagedObjectOperationTimedOut { object, .. } if object == "store"
        ));

        // Latched: a later load reports the same failure without re-sourcing.
        let mut set = ActivateSet::new();
        assert!(!container.load(&job, 200, &mut set));
        set.apply();
        assert_eq!(team.failures().len(), 2);
    }

    #[test]
    fn test_pooled_bound_name_informs_pool() {
        struct BoundPool {
            user: Mutex<Option<SourcingUser>>,
            bound: Mutex<Option<String>>,
        }

        impl ObjectPool for BoundPool {
            fn source(&self, user: SourcingUser) -> Result<(), SourceFailure> {
                *lock(&self.user) = Some(user);
                Ok(())
            }
            fn give_back(&self, _handle: ObjectHandle) {}
            fn object_bound(&self, _handle: &ObjectHandle, name: &str) {
                *lock(&self.bound) = Some(name.to_string());
            }
        }

        let pool = Arc::new(BoundPool {
            user: Mutex::new(None),
            bound: Mutex::new(None),
        });
        let container = container_for(
            ManagedObjectMeta::pooled("conn", pool.clone(), Duration::from_secs(5))
                .bound_as("primary"),
        );
        let team = CollectingTeam::arc();
        let job = collector_job(&team);

        let mut set = ActivateSet::new();
        assert!(!container.load(&job, 0, &mut set));
        set.apply();
        lock(&pool.user).clone().unwrap().set_object(Arc::new(1u32));
        assert_eq!(lock(&pool.bound).as_deref(), Some("primary"));
    }

    #[test]
    fn test_late_pooled_instance_returns_to_pool() {
        let pool = DeferredPool::arc();
        let container = container_for(ManagedObjectMeta::pooled(
            "conn",
            pool.clone(),
            Duration::from_secs(5),
        ));
        let team = CollectingTeam::arc();
        let job = collector_job(&team);

        let mut set = ActivateSet::new();
        assert!(!container.load(&job, 0, &mut set));
        set.apply();

        let mut set = ActivateSet::new();
        container.unload(&mut set);
        set.apply();

        // Arrives after unload: discarded back into the pool.
        lock(&pool.user).clone().unwrap().set_object(Arc::new(1u32));
        assert_eq!(pool.returned.load(Ordering::SeqCst), 1);
        assert!(container.object_handle().is_none());
    }

    #[test]
    fn test_recycle_registers_into_cleanup_sequence() {
        struct CountingRecycle(AtomicUsize);
        impl Recycle for CountingRecycle {
            fn recycle(&self, _handle: ObjectHandle) {
                self.0.fetch_add(1, Ordering::SeqCst);
            }
        }

        let recycle = Arc::new(CountingRecycle(AtomicUsize::new(0)));
        let (services, _clock) = manual_services();
        let cleanup = CleanupSequence::new();
        let container = ManagedObjectContainer::new(
            Arc::new(
                ManagedObjectMeta::new("db", CountingSource::arc(), Duration::from_secs(5))
                    .with_recycle(recycle.clone()),
            ),
            services.clone(),
            cleanup.clone(),
        );
        let team = CollectingTeam::arc();
        let job = collector_job(&team);

        let mut set = ActivateSet::new();
        assert!(container.load(&job, 0, &mut set));
        container.unload(&mut set);
        set.apply();

        // Deferred until the cleanup sequence runs.
        assert_eq!(recycle.0.load(Ordering::SeqCst), 0);
        cleanup.run(&services.bus);
        assert_eq!(recycle.0.load(Ordering::SeqCst), 1);
    }
}
