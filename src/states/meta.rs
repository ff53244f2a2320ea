//! # Office metadata: the static wiring a process executes against.
//!
//! Produced once by the wiring compiler and shared by every process and
//! thread state. Managed objects and governance are addressed by **slot
//! index** everywhere at runtime; names exist only for diagnostics.

use std::sync::Arc;

use crate::exec::EscalationProcedure;
use crate::governance::{Governance, GovernanceStrategy};
use crate::objects::ManagedObjectMeta;

/// Observer of function executions, for profiling thread activity.
pub trait Profiler: Send + Sync {
    /// Called as each function body is about to run on a thread.
    fn function_executed(&self, function: &str, at_millis: u64);
}

/// Static office wiring: objects, governance, and office-level policy.
pub struct OfficeMeta {
    name: String,
    objects: Vec<Arc<ManagedObjectMeta>>,
    governance: Vec<Arc<dyn Governance>>,
    strategy: GovernanceStrategy,
    escalation_procedure: Option<Arc<dyn EscalationProcedure>>,
    profiler: Option<Arc<dyn Profiler>>,
}

impl OfficeMeta {
    /// Starts office wiring under `name`.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            objects: Vec::new(),
            governance: Vec::new(),
            strategy: GovernanceStrategy::Enforce,
            escalation_procedure: None,
            profiler: None,
        }
    }

    /// An office with no wiring at all.
    pub fn empty() -> Arc<Self> {
        Arc::new(Self::new("office"))
    }

    /// Declares the managed objects, slot-ordered.
    pub fn with_objects(mut self, objects: Vec<Arc<ManagedObjectMeta>>) -> Self {
        self.objects = objects;
        self
    }

    /// Declares the governance, slot-ordered.
    pub fn with_governance(mut self, governance: Vec<Arc<dyn Governance>>) -> Self {
        self.governance = governance;
        self
    }

    /// Sets the strategy applied to governance still active at thread
    /// completion. Defaults to enforce; a failed thread always disregards.
    pub fn with_strategy(mut self, strategy: GovernanceStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// Installs the office escalation procedure (first refusal on unhandled
    /// escalations).
    pub fn with_escalation_procedure(mut self, procedure: Arc<dyn EscalationProcedure>) -> Self {
        self.escalation_procedure = Some(procedure);
        self
    }

    /// Installs a profiler observing every function execution.
    pub fn with_profiler(mut self, profiler: Arc<dyn Profiler>) -> Self {
        self.profiler = Some(profiler);
        self
    }

    /// Finishes wiring.
    pub fn build(self) -> Arc<Self> {
        Arc::new(self)
    }

    /// Office name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Managed object metadata, slot-ordered.
    pub fn objects(&self) -> &[Arc<ManagedObjectMeta>] {
        &self.objects
    }

    /// Governance, slot-ordered.
    pub fn governance(&self) -> &[Arc<dyn Governance>] {
        &self.governance
    }

    /// Completion strategy for still-active governance.
    pub fn strategy(&self) -> GovernanceStrategy {
        self.strategy
    }

    /// Office escalation procedure, if installed.
    pub fn escalation_procedure(&self) -> Option<&Arc<dyn EscalationProcedure>> {
        self.escalation_procedure.as_ref()
    }

    /// Profiler, if installed.
    pub fn profiler(&self) -> Option<&Arc<dyn Profiler>> {
        self.profiler.as_ref()
    }
}
