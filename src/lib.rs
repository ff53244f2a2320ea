//! # workfloor
//!
//! **Workfloor** is a cooperative execution runtime for Rust.
//!
//! Functions run on pooled worker teams once the managed objects they need
//! are ready; everything that must be waited upon (sourcing, asynchronous
//! operations, thread joins) is a *registration* in a monitor, never a
//! blocked worker. The crate is designed as the execution core beneath a
//! wiring/DI compiler.
//!
//! ## Architecture
//! ### Overview
//! ```text
//!     ┌──────────────┐   ┌──────────────┐   ┌──────────────┐
//!     │ FunctionMeta │   │ObjectMeta [0]│   │ Governance[0]│
//!     │ (+ function) │   │ObjectMeta [1]│   │ Governance[1]│
//!     └──────┬───────┘   └──────┬───────┘   └──────┬───────┘
//!            ▼                  ▼                  ▼
//! ┌───────────────────────────────────────────────────────────────────┐
//! │  Office (open runtime)                                            │
//! │  - FloorServices (clock + monitor registry + event bus)           │
//! │  - breakout WorkerTeam (delayed invokes, external object access)  │
//! │  - SweepDriver (periodic deadline checks, tokio)                  │
//! └──────┬───────────────────────────┬────────────────────────────────┘
//!        ▼                           ▼
//!   FunctionManager             StateManager
//!   invoke_process()            get_object() / load()
//!        │                           │
//!        ▼                           ▼
//! ┌───────────────────────────────────────────────────────────────────┐
//! │  ProcessState ─► ThreadState ─► Job ─► Team worker ─► body        │
//! │       │               │          │                                │
//! │       │               │          └─ not ready? park in a monitor  │
//! │       │               ├─ ManagedObjectContainer (per slot)        │
//! │       │               ├─ GovernanceContainer (per slot)           │
//! │       │               └─ join AssetMonitor                        │
//! │       └─ CleanupSequence (recycles, runs at completion)           │
//! └───────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ### Job pipeline
//! ```text
//! Job::execute()
//!   ├─► pending failure?  → escalate: flow → office procedure → process
//!   ├─► body already ran? → flow_complete (woken from a join)
//!   ├─► per required object: load → govern → coordinate → is_ready
//!   │        any "not ready" parks the job; the worker is released
//!   ├─► run body (spawn flows/threads, join, settle governance)
//!   └─► apply activations (batched, after all locks are released)
//! ```
//!
//! ## Features
//! | Area            | Description                                             | Key types / traits                           |
//! |-----------------|---------------------------------------------------------|----------------------------------------------|
//! | **Objects**     | Source, pool, coordinate, and time-bound resources.     | [`ManagedObjectSource`], [`ObjectPool`]      |
//! | **Functions**   | Define work bodies and their object requirements.       | [`ManagedFunction`], [`FunctionMeta`]        |
//! | **Teams**       | Pooled or inline executors for scheduled jobs.          | [`Team`], [`WorkerTeam`], [`DirectTeam`]     |
//! | **Governance**  | Transaction-style control over object groups.           | [`Governance`], [`GovernanceStrategy`]       |
//! | **States**      | Process ⊃ thread ⊃ flow scoping and completion.         | [`ProcessState`], [`ThreadState`]            |
//! | **Monitors**    | Deadline-indexed wait/notify for any asset.             | [`AssetMonitor`], [`MonitorRegistry`]        |
//! | **Errors**      | Permanent escalations and boundary rejections.          | [`Escalation`], [`InvokeError`]              |
//! | **Events**      | Broadcast lifecycle events with subscriber fan-out.     | [`Event`], [`Subscribe`]                     |
//! | **Configuration**| Centralize floor-wide settings.                        | [`FloorConfig`]                              |
//!
//! ## Optional features
//! - `logging`: exports a simple built-in [`LogWriter`] _(demo/reference only)_.
//!
//! ## Example
//! ```rust
//! use std::sync::Arc;
//! use std::time::Duration;
//! use workfloor::{
//!     Escalation, FloorConfig, FunctionContext, FunctionMeta, ManagedFunction, Office,
//!     OfficeMeta, TeamRef, WorkerTeam,
//! };
//!
//! struct Hello;
//!
//! impl ManagedFunction for Hello {
//!     fn name(&self) -> &str {
//!         "hello"
//!     }
//!     fn run(&self, ctx: &mut FunctionContext<'_>) -> Result<(), Escalation> {
//!         if let Some(who) = ctx.parameter::<String>() {
//!             println!("hello, {who}");
//!         }
//!         Ok(())
//!     }
//! }
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let office = Office::open(FloorConfig::default(), OfficeMeta::empty());
//!     let team: TeamRef = WorkerTeam::new("main", 1);
//!
//!     let manager =
//!         office.function_manager(Arc::new(Hello), FunctionMeta::new::<String>("hello", team));
//!     let mut process =
//!         manager.invoke_process(Arc::new(String::from("floor")), Duration::ZERO, None)?;
//!
//!     assert_eq!(process.wait_complete().await, None);
//!     office.close();
//!     Ok(())
//! }
//! ```

mod clock;
mod config;
mod context;
mod error;
mod events;
mod exec;
mod governance;
mod monitor;
mod objects;
mod states;
mod subscribers;
mod util;

// ---- Public re-exports ----

pub use clock::{ClockRef, FloorClock, ManualClock, SystemClock};
pub use config::FloorConfig;
pub use context::FloorServices;
pub use error::{Escalation, InvokeError, SourceFailure};
pub use events::{Bus, Event, EventKind};
pub use exec::{
    DirectTeam, EscalationProcedure, FunctionContext, FunctionManager, FunctionMeta, Job,
    ManagedFunction, Office, StateManager, Team, TeamRef, WorkerTeam,
};
pub use governance::{Governance, GovernanceContainer, GovernanceStrategy};
pub use monitor::{ActivateSet, AssetKind, AssetMonitor, MonitorRegistry, SweepDriver};
pub use objects::{
    ContainerState, Coordinator, DependencyRegistry, ManagedObjectContainer, ManagedObjectMeta,
    ManagedObjectSource, ObjectHandle, ObjectPool, Recycle, Sourcing, SourcingUser,
};
pub use states::{
    CleanupSequence, EscalationLevel, OfficeMeta, ProcessCallback, ProcessManager, ProcessState,
    Profiler, ThreadState,
};
pub use subscribers::{Subscribe, SubscriberSet};

// Optional: expose a simple built-in logger subscriber (demo/reference).
// Enable with: `--features logging`
#[cfg(feature = "logging")]
pub use subscribers::LogWriter;
