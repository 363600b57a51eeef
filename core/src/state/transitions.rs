//! Legal task state transitions.

use super::types::TaskState;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TransitionError {
    #[error("invalid transition from {from} to {to}")]
    InvalidTransition { from: TaskState, to: TaskState },
}

/// Why a transition happens. Some edges are only legal for some causes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionCause {
    Claim,
    Commit,
    /// A stale claim handed back by a supervisor sweep.
    Revoke,
    /// A failed task given another try.
    Retry,
    /// Explicit operator reset.
    Reset,
}

pub struct StateTransition;

impl StateTransition {
    pub fn validate(
        from: TaskState,
        to: TaskState,
        cause: TransitionCause,
    ) -> Result<(), TransitionError> {
        use TaskState::*;
        use TransitionCause::*;

        let is_valid = match (from, to, cause) {
            (Pending, Claimed, Claim) => true,
            (Claimed, Done, Commit) | (Claimed, Failed, Commit) => true,
            (Claimed, Pending, Revoke) | (Claimed, Pending, Reset) => true,
            (Failed, Pending, Retry) => true,
            (Done, Pending, Reset) | (Failed, Pending, Reset) => true,
            _ => false,
        };

        if is_valid {
            Ok(())
        } else {
            Err(TransitionError::InvalidTransition { from, to })
        }
    }

    /// Done, and Failed once no retry will follow. Only a reset leaves these.
    pub fn is_terminal(state: TaskState) -> bool {
        matches!(state, TaskState::Done | TaskState::Failed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_transitions() {
        assert!(StateTransition::validate(
            TaskState::Pending,
            TaskState::Claimed,
            TransitionCause::Claim
        )
        .is_ok());
        assert!(StateTransition::validate(
            TaskState::Claimed,
            TaskState::Failed,
            TransitionCause::Commit
        )
        .is_ok());
        assert!(StateTransition::validate(
            TaskState::Failed,
            TaskState::Pending,
            TransitionCause::Retry
        )
        .is_ok());
    }

    #[test]
    fn test_invalid_transitions() {
        // Done never goes back on its own.
        assert!(StateTransition::validate(
            TaskState::Done,
            TaskState::Pending,
            TransitionCause::Retry
        )
        .is_err());
        // Commits only come from a claim.
        assert!(StateTransition::validate(
            TaskState::Pending,
            TaskState::Done,
            TransitionCause::Commit
        )
        .is_err());
        assert!(StateTransition::validate(
            TaskState::Claimed,
            TaskState::Claimed,
            TransitionCause::Claim
        )
        .is_err());
    }

    #[test]
    fn test_terminal_states() {
        assert!(StateTransition::is_terminal(TaskState::Done));
        assert!(StateTransition::is_terminal(TaskState::Failed));
        assert!(!StateTransition::is_terminal(TaskState::Claimed));
    }
}
