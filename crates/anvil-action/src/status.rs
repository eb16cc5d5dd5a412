//! Action lifecycle state machine
//!
//! Every status change goes through [`validate_transition`]; an illegal
//! transition is rejected and leaves the stored status untouched. No state is
//! permanently terminal: `Complete`, `Failed` and `Aborted` may all return to
//! `Pending` for replay. Who is allowed to trigger that replay is an external
//! policy decision, not modeled here.

use serde::{Deserialize, Serialize};
use std::fmt::{self, Display, Formatter};

/// Lifecycle state of one action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionStatus {
    /// Not started; the initial state.
    Pending,
    /// Currently executing.
    Running,
    /// Finished successfully; side effects committed.
    Complete,
    /// Finished unsuccessfully.
    Failed,
    /// Cancelled before or during execution.
    Aborted,
}

/// Rejected status changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum StatusError {
    /// The transition is not in the table; status was left unchanged.
    #[error("illegal status transition {from} -> {to}")]
    IllegalTransition {
        /// Status the action was in.
        from: ActionStatus,
        /// Status the caller asked for.
        to: ActionStatus,
    },
}

impl ActionStatus {
    /// Whether the status is terminal (yet still replayable to `Pending`).
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, ActionStatus::Complete | ActionStatus::Failed | ActionStatus::Aborted)
    }
}

impl Display for ActionStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let name = match self {
            ActionStatus::Pending => "pending",
            ActionStatus::Running => "running",
            ActionStatus::Complete => "complete",
            ActionStatus::Failed => "failed",
            ActionStatus::Aborted => "aborted",
        };
        f.write_str(name)
    }
}

/// States reachable from `from` in one committed transition.
#[must_use]
pub fn allowed_transitions(from: ActionStatus) -> &'static [ActionStatus] {
    use ActionStatus::*;
    match from {
        Pending => &[Running, Aborted],
        Running => &[Complete, Failed, Aborted],
        Complete => &[Pending],
        Failed => &[Pending],
        Aborted => &[Pending],
    }
}

/// Validate a status transition against the table.
///
/// # Errors
/// [`StatusError::IllegalTransition`] when the transition is not listed.
pub fn validate_transition(from: ActionStatus, to: ActionStatus) -> Result<(), StatusError> {
    if allowed_transitions(from).contains(&to) {
        Ok(())
    } else {
        Err(StatusError::IllegalTransition { from, to })
    }
}
