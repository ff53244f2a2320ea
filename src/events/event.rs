//! # Runtime events emitted by containers, thread states, and the executor.
//!
//! The [`EventKind`] enum classifies event types across four categories:
//! - **Object lifecycle**: sourcing/operation transitions of managed objects
//! - **Governance**: enforce/disregard deactivations
//! - **Completion**: thread and process completion, cleanup actions
//! - **Escalation**: structured failures raised and handled
//!
//! The [`Event`] struct carries additional metadata such as timestamps,
//! object/function names, thread/process ids, reasons, and timeouts.
//!
//! ## Ordering guarantees
//! Each event has a globally unique sequence number (`seq`) that increases
//! monotonically. Use `seq` to restore the exact order when events are
//! delivered out of order.
//!
//! ## Example
//! ```rust
//! use std::time::Duration;
//! use workfloor::{Event, EventKind};
//!
//! let ev = Event::now(EventKind::SourcingTimedOut)
//!     .with_object("db-connection")
//!     .with_timeout(Duration::from_secs(5));
//!
//! assert_eq!(ev.kind, EventKind::SourcingTimedOut);
//! assert_eq!(ev.object.as_deref(), Some("db-connection"));
//! ```

use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::time::{Duration, SystemTime};

/// Global sequence counter for event ordering.
static EVENT_SEQ: AtomicU64 = AtomicU64::new(0);

/// Classification of runtime events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    // === Managed object lifecycle ===
    /// A managed object was sourced and is ready.
    ///
    /// Sets: `object`, `at`, `seq`.
    ObjectReady,

    /// Sourcing reported failure; the container is permanently failed.
    ///
    /// Sets: `object`, `reason`, `at`, `seq`.
    SourcingFailed,

    /// Sourcing exceeded the object's timeout.
    ///
    /// Sets: `object`, `timeout`, `at`, `seq`.
    SourcingTimedOut,

    /// An in-flight asynchronous operation exceeded the object's timeout.
    ///
    /// Sets: `object`, `timeout`, `at`, `seq`.
    OperationTimedOut,

    /// A managed object was unloaded (recycled or returned to pool).
    ///
    /// Sets: `object`, `at`, `seq`.
    ObjectUnloaded,

    // === Governance ===
    /// Governance was enforced (pending effects applied) over its registered
    /// objects.
    ///
    /// Sets: `object` (governance name), `at`, `seq`.
    GovernanceEnforced,

    /// Governance was disregarded (pending effects discarded) over its
    /// registered objects.
    ///
    /// Sets: `object` (governance name), `at`, `seq`.
    GovernanceDisregarded,

    // === Completion ===
    /// A join on a thread state exceeded its wait timeout.
    ///
    /// Sets: `thread`, `token`, `at`, `seq`.
    JoinTimedOut,

    /// A thread state completed (no open flows, no active governance, not
    /// escalating).
    ///
    /// Sets: `thread`, `process`, `at`, `seq`.
    ThreadComplete,

    /// A process state completed; its cleanup sequence has run.
    ///
    /// Sets: `process`, `reason` ("ok" or the fatal escalation), `at`, `seq`.
    ProcessComplete,

    /// One cleanup action (recycle) was executed.
    ///
    /// Sets: `object`, `at`, `seq`.
    CleanupActionRun,

    // === Escalation ===
    /// An escalation was raised by a flow.
    ///
    /// Sets: `function` (when known), `reason`, `thread`, `at`, `seq`.
    EscalationRaised,

    /// A registered escalation procedure handled the escalation.
    ///
    /// Sets: `reason`, `thread`, `at`, `seq`.
    EscalationHandled,
}

/// A single runtime event with metadata.
///
/// Construct with [`Event::now`] and attach metadata with the `with_*`
/// builders. Cloning is cheap relative to event volume (strings only).
#[derive(Debug, Clone)]
pub struct Event {
    /// Event classification.
    pub kind: EventKind,
    /// Wall-clock timestamp at construction.
    pub at: SystemTime,
    /// Globally unique, monotonically increasing sequence number.
    pub seq: u64,
    /// Managed object name, when relevant.
    pub object: Option<String>,
    /// Function name, when relevant.
    pub function: Option<String>,
    /// Thread state id, when relevant.
    pub thread: Option<u64>,
    /// Process state id, when relevant.
    pub process: Option<u64>,
    /// Failure or diagnostic message, when relevant.
    pub reason: Option<String>,
    /// Timeout that was exceeded, when relevant.
    pub timeout: Option<Duration>,
    /// Join token, when relevant.
    pub token: Option<usize>,
}

impl Event {
    /// Creates an event stamped with the current wall-clock time and the next
    /// global sequence number.
    pub fn now(kind: EventKind) -> Self {
        Self {
            kind,
            at: SystemTime::now(),
            seq: EVENT_SEQ.fetch_add(1, AtomicOrdering::Relaxed) + 1,
            object: None,
            function: None,
            thread: None,
            process: None,
            reason: None,
            timeout: None,
            token: None,
        }
    }

    /// Attaches a managed object name.
    pub fn with_object(mut self, object: impl Into<String>) -> Self {
        self.object = Some(object.into());
        self
    }

    /// Attaches a function name.
    pub fn with_function(mut self, function: impl Into<String>) -> Self {
        self.function = Some(function.into());
        self
    }

    /// Attaches a thread state id.
    pub fn with_thread(mut self, thread: u64) -> Self {
        self.thread = Some(thread);
        self
    }

    /// Attaches a process state id.
    pub fn with_process(mut self, process: u64) -> Self {
        self.process = Some(process);
        self
    }

    /// Attaches a failure or diagnostic message.
    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Attaches the exceeded timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Attaches a join token.
    pub fn with_token(mut self, token: usize) -> Self {
        self.token = Some(token);
        self
    }
}
