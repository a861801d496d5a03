//! Approval workflow domain types.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use wagerly_shared::types::{Currency, Money, TransactionId, UserId, WorkflowId};

use crate::actor::Actor;

/// How many distinct approvers an operation needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ApprovalType {
    /// Two approvers.
    Dual,
    /// Three approvers.
    Triple,
}

impl ApprovalType {
    /// Approvals needed before escalation.
    #[must_use]
    pub const fn required_approvals(&self) -> u32 {
        match self {
            Self::Dual => 2,
            Self::Triple => 3,
        }
    }

    /// Returns the string representation of the type.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Dual => "DUAL",
            Self::Triple => "TRIPLE",
        }
    }

    /// Parses a type from a string.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "DUAL" => Some(Self::Dual),
            "TRIPLE" => Some(Self::Triple),
            _ => None,
        }
    }
}

/// Workflow status.
///
/// The valid transitions are:
/// - Pending → Approved | Rejected | Escalated | Cancelled | Expired
/// - Escalated → Pending (reopened with the raised requirement)
/// - Escalated → Rejected | Cancelled | Expired
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkflowStatus {
    /// Collecting approvals.
    Pending,
    /// Fully approved; the parked transaction has executed.
    Approved,
    /// Refused by an approver.
    Rejected,
    /// Handed to a broader approver pool.
    Escalated,
    /// Withdrawn by the initiator or an admin.
    Cancelled,
    /// Not completed before its deadline.
    Expired,
}

impl WorkflowStatus {
    /// Returns the string representation of the status.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Approved => "APPROVED",
            Self::Rejected => "REJECTED",
            Self::Escalated => "ESCALATED",
            Self::Cancelled => "CANCELLED",
            Self::Expired => "EXPIRED",
        }
    }

    /// Parses a status from a string.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "PENDING" => Some(Self::Pending),
            "APPROVED" => Some(Self::Approved),
            "REJECTED" => Some(Self::Rejected),
            "ESCALATED" => Some(Self::Escalated),
            "CANCELLED" => Some(Self::Cancelled),
            "EXPIRED" => Some(Self::Expired),
            _ => None,
        }
    }

    /// Returns true if the workflow can never change again.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Approved | Self::Rejected | Self::Cancelled | Self::Expired
        )
    }

    /// Returns true while the parked transaction still holds funds.
    #[must_use]
    pub const fn is_open(&self) -> bool {
        matches!(self, Self::Pending | Self::Escalated)
    }
}

impl fmt::Display for WorkflowStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One approver's sign-off.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Approval {
    /// Who approved.
    pub approver_id: UserId,
    /// When.
    pub approved_at: DateTime<Utc>,
    /// Optional notes.
    pub notes: Option<String>,
}

/// Multi-party sign-off for one parked transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalWorkflow {
    /// Unique identifier.
    pub id: WorkflowId,
    /// The parked transaction.
    pub transaction_id: TransactionId,
    /// Wallet owner of the parked transaction.
    pub user_id: UserId,
    /// Tier that opened the workflow.
    pub approval_type: ApprovalType,
    /// Approvals needed; raised by escalation.
    pub required_approvals: u32,
    /// Sign-offs so far, in order.
    pub approvals: Vec<Approval>,
    /// Current status.
    pub status: WorkflowStatus,
    /// Who submitted the parked operation.
    pub initiated_by: Actor,
    /// Why approval is needed.
    pub reason: String,
    /// Amount of the parked transaction.
    pub amount: Money,
    /// Currency of the parked transaction.
    pub currency: Currency,
    /// Times escalated.
    pub escalation_count: u32,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Deadline for completion.
    pub expires_at: DateTime<Utc>,
    /// When a terminal status was reached.
    pub completed_at: Option<DateTime<Utc>>,
    /// Who closed the workflow; `None` for expiry.
    pub completed_by: Option<UserId>,
    /// Rejection, cancellation or escalation notes.
    pub completion_notes: Option<String>,
    /// Optimistic concurrency version.
    pub version: i64,
}

impl ApprovalWorkflow {
    /// Returns true if `approver` already signed off.
    #[must_use]
    pub fn has_approved(&self, approver: UserId) -> bool {
        self.approvals.iter().any(|a| a.approver_id == approver)
    }

    /// Approvals still needed.
    #[must_use]
    pub fn remaining_approvals(&self) -> u32 {
        let given = u32::try_from(self.approvals.len()).unwrap_or(u32::MAX);
        self.required_approvals.saturating_sub(given)
    }

    /// Returns true if the deadline has passed.
    #[must_use]
    pub fn is_past_expiry(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// Result of recording one approval.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApprovalProgress {
    /// Recorded; more approvals are needed.
    Recorded {
        /// Approvals still needed.
        remaining: u32,
    },
    /// The final approval; the workflow is now Approved.
    Completed,
}
