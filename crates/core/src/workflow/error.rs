//! Approval workflow error types.

use chrono::{DateTime, Utc};
use thiserror::Error;
use wagerly_shared::types::{UserId, WorkflowId};

use crate::workflow::types::WorkflowStatus;

/// Errors that can occur during workflow operations.
///
/// Every variant leaves the workflow unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WorkflowError {
    /// Attempted an invalid status transition.
    #[error("Invalid workflow transition from {from} to {to}")]
    InvalidTransition {
        /// The current status.
        from: WorkflowStatus,
        /// The attempted target status.
        to: WorkflowStatus,
    },

    /// The workflow no longer accepts this action.
    #[error("Workflow {id} is {status} and cannot be acted on")]
    NotActionable {
        /// The workflow.
        id: WorkflowId,
        /// Its current status.
        status: WorkflowStatus,
    },

    /// The approver already signed off.
    #[error("User {approver} has already approved workflow {id}")]
    DuplicateApprover {
        /// The workflow.
        id: WorkflowId,
        /// The repeated approver.
        approver: UserId,
    },

    /// The initiator tried to approve their own request.
    #[error("User {0} initiated this operation and cannot approve it")]
    SelfApproval(UserId),

    /// The actor lacks the role for this action.
    #[error("Not authorized to {action} this workflow")]
    NotAuthorized {
        /// What was attempted.
        action: &'static str,
    },

    /// A rejection, cancellation or escalation reason is required.
    #[error("A reason is required")]
    ReasonRequired,

    /// The deadline passed before the action.
    #[error("Workflow {id} expired at {expired_at}")]
    Expired {
        /// The workflow.
        id: WorkflowId,
        /// Its deadline.
        expired_at: DateTime<Utc>,
    },

    /// Expiry attempted before the deadline.
    #[error("Workflow {id} does not expire until {expires_at}")]
    NotYetExpired {
        /// The workflow.
        id: WorkflowId,
        /// Its deadline.
        expires_at: DateTime<Utc>,
    },
}

impl WorkflowError {
    /// Returns the HTTP status code for this error.
    #[must_use]
    pub fn status_code(&self) -> u16 {
        match self {
            Self::ReasonRequired => 400,
            Self::SelfApproval(_) | Self::NotAuthorized { .. } => 403,
            Self::InvalidTransition { .. }
            | Self::NotActionable { .. }
            | Self::DuplicateApprover { .. }
            | Self::Expired { .. }
            | Self::NotYetExpired { .. } => 409,
        }
    }

    /// Returns the error code for API responses.
    #[must_use]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::InvalidTransition { .. } => "INVALID_TRANSITION",
            Self::NotActionable { .. } => "WORKFLOW_NOT_ACTIONABLE",
            Self::DuplicateApprover { .. } => "DUPLICATE_APPROVER",
            Self::SelfApproval(_) => "SELF_APPROVAL",
            Self::NotAuthorized { .. } => "NOT_AUTHORIZED",
            Self::ReasonRequired => "REASON_REQUIRED",
            Self::Expired { .. } => "WORKFLOW_EXPIRED",
            Self::NotYetExpired { .. } => "WORKFLOW_NOT_EXPIRED",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_transition_error() {
        let err = WorkflowError::InvalidTransition {
            from: WorkflowStatus::Rejected,
            to: WorkflowStatus::Approved,
        };
        assert_eq!(err.status_code(), 409);
        assert_eq!(err.error_code(), "INVALID_TRANSITION");
        assert!(err.to_string().contains("REJECTED"));
        assert!(err.to_string().contains("APPROVED"));
    }

    #[test]
    fn test_authorization_errors() {
        let err = WorkflowError::SelfApproval(UserId::new());
        assert_eq!(err.status_code(), 403);
        assert_eq!(err.error_code(), "SELF_APPROVAL");

        let err = WorkflowError::NotAuthorized { action: "escalate" };
        assert_eq!(err.status_code(), 403);
        assert!(err.to_string().contains("escalate"));
    }

    #[test]
    fn test_reason_required_error() {
        let err = WorkflowError::ReasonRequired;
        assert_eq!(err.status_code(), 400);
        assert_eq!(err.error_code(), "REASON_REQUIRED");
    }
}
