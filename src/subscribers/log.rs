//! # Built-in log subscriber (demo/reference only).
//!
//! [`LogWriter`] prints each event as one line to stderr. It exists so that
//! small setups and examples have something to plug in; production systems
//! should implement their own [`Subscribe`] against their logging stack.

use async_trait::async_trait;

use crate::events::{Event, EventKind};

use super::Subscribe;

/// One-line-per-event stderr logger.
#[derive(Default)]
pub struct LogWriter;

impl LogWriter {
    /// Creates a new log writer.
    pub fn new() -> Self {
        Self
    }

    fn label(kind: EventKind) -> &'static str {
        match kind {
            EventKind::ObjectReady => "object_ready",
            EventKind::SourcingFailed => "sourcing_failed",
            EventKind::SourcingTimedOut => "sourcing_timed_out",
            EventKind::OperationTimedOut => "operation_timed_out",
            EventKind::ObjectUnloaded => "object_unloaded",
            EventKind::GovernanceEnforced => "governance_enforced",
            EventKind::GovernanceDisregarded => "governance_disregarded",
            EventKind::JoinTimedOut => "join_timed_out",
            EventKind::ThreadComplete => "thread_complete",
            EventKind::ProcessComplete => "process_complete",
            EventKind::CleanupActionRun => "cleanup_action_run",
            EventKind::EscalationRaised => "escalation_raised",
            EventKind::EscalationHandled => "escalation_handled",
        }
    }
}

#[async_trait]
impl Subscribe for LogWriter {
    async fn on_event(&self, ev: &Event) {
        let mut line = format!("[workfloor] seq={} {}", ev.seq, Self::label(ev.kind));
        if let Some(object) = &ev.object {
            line.push_str(&format!(" object={object}"));
        }
        if let Some(function) = &ev.function {
            line.push_str(&format!(" function={function}"));
        }
        if let Some(thread) = ev.thread {
            line.push_str(&format!(" thread={thread}"));
        }
        if let Some(process) = ev.process {
            line.push_str(&format!(" process={process}"));
        }
        if let Some(timeout) = ev.timeout {
            line.push_str(&format!(" timeout={timeout:?}"));
        }
        if let Some(token) = ev.token {
            line.push_str(&format!(" token={token}"));
        }
        if let Some(reason) = &ev.reason {
            line.push_str(&format!(" reason={reason:?}"));
        }
        eprintln!("{line}");
    }

    fn name(&self) -> &'static str {
        "log_writer"
    }
}
