//! # Managed object metadata and the trait seams to the compiler/DI layer.
//!
//! The wiring compiler is an external collaborator: it hands the runtime
//! static per-resource metadata ([`ManagedObjectMeta`]) plus factories
//! implementing the seams in this module. Dependencies and governance are
//! resolved to **fixed slot indices ahead of time** — the runtime performs no
//! type inspection to match them.

use std::any::Any;
use std::sync::Arc;
use std::time::Duration;

use crate::error::SourceFailure;

use super::container::SourcingUser;

/// A sourced resource instance, type-erased.
///
/// The container exclusively owns the handle until unloaded or returned to a
/// pool; dependency coordination hands clones of the handle to dependents.
pub type ObjectHandle = Arc<dyn Any + Send + Sync>;

/// Factory producing a managed object, callback-style.
///
/// `source` may complete synchronously (calling
/// [`SourcingUser::set_object`] before returning) or later from any thread
/// through the retained user handle. Reporting failure goes through the
/// return value or [`SourcingUser::set_failure`]; a panic is a runtime fault
/// and propagates.
pub trait ManagedObjectSource: Send + Sync {
    /// Starts sourcing one object instance.
    fn source(&self, user: SourcingUser) -> Result<(), SourceFailure>;

    /// Informs the source that its object was bound under `name`.
    ///
    /// Called once after successful sourcing, only when the metadata declares
    /// a bound name.
    fn object_bound(&self, _handle: &ObjectHandle, _name: &str) {}
}

/// Pool of reusable object instances.
///
/// Pooled and direct sourcing are mutually exclusive per container; the
/// [`Sourcing`] enum encodes that in the type.
pub trait ObjectPool: Send + Sync {
    /// Sources an instance from the pool (callback-style, like a source).
    fn source(&self, user: SourcingUser) -> Result<(), SourceFailure>;

    /// Returns an instance to the pool after unload.
    fn give_back(&self, handle: ObjectHandle);

    /// Informs the pool that its instance was bound under `name`.
    ///
    /// Called once after successful sourcing, only when the metadata declares
    /// a bound name.
    fn object_bound(&self, _handle: &ObjectHandle, _name: &str) {}
}

/// Deferred teardown step for a sourced object.
pub trait Recycle: Send + Sync {
    /// Recycles the handle; runs in the process's cleanup sequence.
    fn recycle(&self, handle: ObjectHandle);
}

/// Binds a coordinating object's dependencies once they are all ready.
pub trait Coordinator: Send + Sync {
    /// Binds `dependencies` (slot-ordered) into `object`.
    fn coordinate(
        &self,
        object: &ObjectHandle,
        dependencies: &DependencyRegistry,
    ) -> Result<(), SourceFailure>;
}

/// Slot-ordered dependency handles presented at coordination time.
pub struct DependencyRegistry {
    handles: Vec<ObjectHandle>,
}

impl DependencyRegistry {
    pub(crate) fn new(handles: Vec<ObjectHandle>) -> Self {
        Self { handles }
    }

    /// The dependency bound at `slot`, in declaration order.
    pub fn dependency(&self, slot: usize) -> Option<&ObjectHandle> {
        self.handles.get(slot)
    }

    /// Number of bound dependencies.
    pub fn len(&self) -> usize {
        self.handles.len()
    }

    /// Whether there are no dependencies.
    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }
}

/// How a container obtains its instance.
#[derive(Clone)]
pub enum Sourcing {
    /// Directly from the resource's own source.
    Direct(Arc<dyn ManagedObjectSource>),
    /// From a pool.
    Pooled(Arc<dyn ObjectPool>),
}

/// Static per-resource metadata, produced by the wiring compiler.
#[derive(Clone)]
pub struct ManagedObjectMeta {
    name: String,
    timeout: Duration,
    sourcing: Sourcing,
    recycle: Option<Arc<dyn Recycle>>,
    coordinator: Option<Arc<dyn Coordinator>>,
    dependencies: Vec<usize>,
    governance: Vec<usize>,
    asynchronous: bool,
    bound_name: Option<String>,
}

impl ManagedObjectMeta {
    /// Metadata for a directly sourced object.
    pub fn new(
        name: impl Into<String>,
        source: Arc<dyn ManagedObjectSource>,
        timeout: Duration,
    ) -> Self {
        Self {
            name: name.into(),
            timeout,
            sourcing: Sourcing::Direct(source),
            recycle: None,
            coordinator: None,
            dependencies: Vec::new(),
            governance: Vec::new(),
            asynchronous: false,
            bound_name: None,
        }
    }

    /// Metadata for a pooled object.
    pub fn pooled(name: impl Into<String>, pool: Arc<dyn ObjectPool>, timeout: Duration) -> Self {
        Self {
            name: name.into(),
            timeout,
            sourcing: Sourcing::Pooled(pool),
            recycle: None,
            coordinator: None,
            dependencies: Vec::new(),
            governance: Vec::new(),
            asynchronous: false,
            bound_name: None,
        }
    }

    /// Declares a recycle step, recorded into the cleanup sequence at unload.
    pub fn with_recycle(mut self, recycle: Arc<dyn Recycle>) -> Self {
        self.recycle = Some(recycle);
        self
    }

    /// Declares dependency coordination over the given container indices.
    pub fn with_coordinator(
        mut self,
        coordinator: Arc<dyn Coordinator>,
        dependencies: Vec<usize>,
    ) -> Self {
        self.coordinator = Some(coordinator);
        self.dependencies = dependencies;
        self
    }

    /// Declares the governance slots this object participates in.
    pub fn with_governance(mut self, slots: Vec<usize>) -> Self {
        self.governance = slots;
        self
    }

    /// Marks the object as asynchronous (may enter in-operation state).
    pub fn asynchronous(mut self) -> Self {
        self.asynchronous = true;
        self
    }

    /// Declares the bound name the source is informed of after sourcing.
    pub fn bound_as(mut self, name: impl Into<String>) -> Self {
        self.bound_name = Some(name.into());
        self
    }

    /// Resource name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Sourcing/operation timeout.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub(crate) fn timeout_millis(&self) -> u64 {
        self.timeout.as_millis() as u64
    }

    /// How the object is sourced.
    pub fn sourcing(&self) -> &Sourcing {
        &self.sourcing
    }

    pub(crate) fn recycle(&self) -> Option<&Arc<dyn Recycle>> {
        self.recycle.as_ref()
    }

    pub(crate) fn coordinator(&self) -> Option<&Arc<dyn Coordinator>> {
        self.coordinator.as_ref()
    }

    /// Dependency container indices, slot-ordered.
    pub fn dependencies(&self) -> &[usize] {
        &self.dependencies
    }

    /// Governance slot indices.
    pub fn governance(&self) -> &[usize] {
        &self.governance
    }

    /// Whether the object is asynchronous.
    pub fn is_asynchronous(&self) -> bool {
        self.asynchronous
    }

    pub(crate) fn bound_name(&self) -> Option<&str> {
        self.bound_name.as_deref()
    }
}
