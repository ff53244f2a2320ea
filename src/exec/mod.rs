//! # Execution: functions, jobs, teams, and the office boundary.
//!
//! ```text
//! Office ─► FunctionManager ─► Job ─► Team worker ─► ManagedFunction body
//!    │                          ▲
//!    └─► StateManager           └── re-activation (monitor wake)
//! ```

mod function;
mod job;
mod office;
mod team;

pub use function::{EscalationProcedure, FunctionContext, FunctionMeta, ManagedFunction};
pub use job::Job;
pub use office::{FunctionManager, Office, StateManager};
pub use team::{DirectTeam, Team, TeamRef, WorkerTeam};

#[cfg(test)]
pub(crate) use job::test_support;
