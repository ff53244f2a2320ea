//! # Runtime state scopes: process ⊃ thread ⊃ flow.
//!
//! ```text
//! ProcessState ──┬── ThreadState ──┬── flow (counter)
//!                │                 ├── containers (per slot)
//!                │                 ├── governance (per slot)
//!                │                 └── join monitor
//!                └── CleanupSequence
//! ```
//!
//! Threads hold the process `Arc`; the process tracks thread **ids** only.
//! Flows are counters on their thread, not objects.

mod meta;
mod process;
mod thread;

pub use meta::{OfficeMeta, Profiler};
pub use process::{CleanupSequence, ProcessCallback, ProcessManager, ProcessState};
pub use thread::{EscalationLevel, ThreadState};
