//! Error types used by the workfloor runtime.
//!
//! This module defines three error families:
//!
//! - [`Escalation`] — structured, **permanent** failures propagated up through
//!   flow → thread → process boundaries.
//! - [`InvokeError`] — caller mistakes rejected at the invocation boundary,
//!   before any runtime state is allocated. Never an escalation.
//! - [`SourceFailure`] — a failure explicitly reported by a managed object
//!   source; converted to an [`Escalation`] by the owning container.
//!
//! All types provide `as_label` / `as_message` helpers for logs/metrics.
//!
//! ## Rules
//! - Escalations are permanent: no retry is attempted internally once raised.
//! - A monitor that failed its waiters keeps failing future immediate checks,
//!   so nothing re-enters a dead wait.

use std::time::Duration;
use thiserror::Error;

/// # Structured, permanent failure raised by the runtime.
///
/// An escalation is tagged with the resource (or join token) that produced it.
/// Once raised it never turns back into a success: the owning container or
/// monitor fails every current waiter exactly once and latches.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Escalation {
    /// Sourcing threw or reported failure.
    #[error("failed to source managed object '{object}': {cause}")]
    FailedToSourceManagedObject {
        /// Bound name of the managed object.
        object: String,
        /// Cause reported by the source.
        cause: String,
    },

    /// Sourcing exceeded the object's configured timeout.
    #[error("sourcing managed object '{object}' timed out after {timeout:?}")]
    SourceManagedObjectTimedOut {
        /// Bound name of the managed object.
        object: String,
        /// The timeout that was exceeded.
        timeout: Duration,
    },

    /// An in-flight asynchronous operation exceeded the object's timeout.
    #[error("asynchronous operation on managed object '{object}' timed out after {timeout:?}")]
    ManagedObjectOperationTimedOut {
        /// Bound name of the managed object.
        object: String,
        /// The timeout that was exceeded.
        timeout: Duration,
    },

    /// A join on another thread state exceeded its wait timeout.
    ///
    /// Carries the join token supplied at [`ThreadState::join`] for
    /// diagnostics.
    ///
    /// [`ThreadState::join`]: crate::states::ThreadState::join
    #[error("flow join timed out (token {token:?})")]
    FlowJoinTimedOut {
        /// Token supplied when the join was registered.
        token: Option<usize>,
    },

    /// A function body reported failure.
    #[error("function '{function}' failed: {cause}")]
    FunctionFailure {
        /// Name of the failing function.
        function: String,
        /// Failure message.
        cause: String,
    },
}

impl Escalation {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            Escalation::FailedToSourceManagedObject { .. } => "failed_to_source",
            Escalation::SourceManagedObjectTimedOut { .. } => "sourcing_timed_out",
            Escalation::ManagedObjectOperationTimedOut { .. } => "operation_timed_out",
            Escalation::FlowJoinTimedOut { .. } => "flow_join_timed_out",
            Escalation::FunctionFailure { .. } => "function_failure",
        }
    }

    /// Returns a human-readable message with details about the escalation.
    pub fn as_message(&self) -> String {
        self.to_string()
    }

    /// Whether the escalation is permanent.
    ///
    /// Always `true`: timeouts are modeled permanent, there is no
    /// retry-by-extension in this runtime.
    pub fn is_permanent(&self) -> bool {
        true
    }
}

/// # Errors rejected at the process-invocation boundary.
///
/// These are caller mistakes, detected before any process or thread state is
/// allocated. They never enter the escalation path.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum InvokeError {
    /// The supplied parameter's runtime type is not the function's declared
    /// parameter type.
    #[error("invalid parameter type for function '{function}': expected {expected}")]
    InvalidParameterType {
        /// Name of the target function.
        function: String,
        /// Declared parameter type name.
        expected: &'static str,
    },
}

impl InvokeError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            InvokeError::InvalidParameterType { .. } => "invalid_parameter_type",
        }
    }
}

/// # Failure explicitly reported by a managed object source.
///
/// A source that cannot produce its object reports this through the
/// [`SourcingUser`](crate::objects::SourcingUser) handle or as the return of
/// `source`. The container converts it to
/// [`Escalation::FailedToSourceManagedObject`]. A source that *panics*
/// instead is treated as a runtime fault and the panic propagates.
#[derive(Error, Debug, Clone)]
#[error("{cause}")]
pub struct SourceFailure {
    /// Cause reported by the source.
    pub cause: String,
}

impl SourceFailure {
    /// Creates a failure with the given cause.
    pub fn new(cause: impl Into<String>) -> Self {
        Self {
            cause: cause.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escalation_labels_are_stable() {
        let esc = Escalation::SourceManagedObjectTimedOut {
            object: "db".into(),
            timeout: Duration::from_millis(5),
        };
        assert_eq!(esc.as_label(), "sourcing_timed_out");
        assert!(esc.is_permanent());
    }

    #[test]
    fn test_join_timeout_carries_token() {
        let esc = Escalation::FlowJoinTimedOut { token: Some(42) };
        assert!(esc.as_message().contains("42"));
    }

    #[test]
    fn test_invoke_error_label() {
        let err = InvokeError::InvalidParameterType {
            function: "main".into(),
            expected: "alloc::string::String",
        };
        assert_eq!(err.as_label(), "invalid_parameter_type");
    }
}
