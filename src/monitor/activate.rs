//! # Activation set: the batched wake-list.
//!
//! Operations that resolve waits (monitor checks, activations, failures)
//! never wake jobs in place — waking re-enters team queues and may run user
//! code, which must not happen under a container or thread lock. Instead the
//! triggering operation accumulates wake-ups in an [`ActivateSet`] passed
//! `&mut` through the call graph, and the outermost caller applies the batch
//! once, after every lock has been released.
//!
//! ## Rules
//! - Waiters never observe a container mid-transition: application happens
//!   strictly after the triggering operation finished.
//! - Applying consumes the set; each entry re-enters its job's own team.
//! - A failure entry records the escalation on the job before re-assigning
//!   it, so the job's next execution takes the escalation path.

use crate::error::Escalation;
use crate::exec::Job;

enum Activation {
    Wake(Job),
    Fail(Job, Escalation),
}

/// Batched, deferred wake-list applied after a triggering operation.
#[derive(Default)]
pub struct ActivateSet {
    activations: Vec<Activation>,
}

impl ActivateSet {
    /// Creates an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a job to be re-assigned to its team.
    pub fn wake(&mut self, job: Job) {
        self.activations.push(Activation::Wake(job));
    }

    /// Queues a job to be failed with `escalation`, then re-assigned so it
    /// takes the escalation path.
    pub fn fail(&mut self, job: Job, escalation: Escalation) {
        self.activations.push(Activation::Fail(job, escalation));
    }

    /// Number of queued activations.
    pub fn len(&self) -> usize {
        self.activations.len()
    }

    /// Whether the set is empty.
    pub fn is_empty(&self) -> bool {
        self.activations.is_empty()
    }

    /// Applies the batch: every queued job re-enters its own team's queue.
    ///
    /// Call only after all locks of the triggering operation are released.
    pub fn apply(self) {
        for activation in self.activations {
            match activation {
                Activation::Wake(job) => job.activate(),
                Activation::Fail(job, escalation) => {
                    job.record_failure(escalation);
                    job.activate();
                }
            }
        }
    }
}
