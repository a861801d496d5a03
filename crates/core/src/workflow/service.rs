//! Workflow service for approval state transitions.
//!
//! Every operation validates the actor and the current status, then returns
//! the next workflow state with its version incremented. The engine persists
//! the result with a compare-and-set on the previous version and performs
//! the balance side effects.

use chrono::{DateTime, Duration, Utc};
use wagerly_shared::config::ApprovalConfig;
use wagerly_shared::types::WorkflowId;

use crate::actor::Actor;
use crate::transaction::WalletTransaction;
use crate::workflow::error::WorkflowError;
use crate::workflow::types::{
    Approval, ApprovalProgress, ApprovalType, ApprovalWorkflow, WorkflowStatus,
};

/// Stateless service for approval workflows.
pub struct WorkflowService;

impl WorkflowService {
    /// Opens a workflow for `transaction`, which is about to be parked.
    #[must_use]
    pub fn open(
        transaction: &WalletTransaction,
        approval_type: ApprovalType,
        config: &ApprovalConfig,
        now: DateTime<Utc>,
    ) -> ApprovalWorkflow {
        let lifetime_hours = match approval_type {
            ApprovalType::Dual => config.dual_expiry_hours,
            ApprovalType::Triple => config.triple_expiry_hours,
        };
        ApprovalWorkflow {
            id: WorkflowId::new(),
            transaction_id: transaction.id,
            user_id: transaction.user_id,
            approval_type,
            required_approvals: approval_type.required_approvals(),
            approvals: Vec::new(),
            status: WorkflowStatus::Pending,
            initiated_by: transaction.actor,
            reason: format!(
                "{} of {} {} requires {} approval",
                transaction.kind,
                transaction.amount,
                transaction.currency,
                approval_type.as_str().to_lowercase()
            ),
            amount: transaction.amount,
            currency: transaction.currency,
            escalation_count: 0,
            created_at: now,
            expires_at: now + Duration::hours(lifetime_hours),
            completed_at: None,
            completed_by: None,
            completion_notes: None,
            version: 0,
        }
    }

    /// Returns true if moving from `from` to `to` is allowed.
    #[must_use]
    pub const fn is_valid_transition(from: WorkflowStatus, to: WorkflowStatus) -> bool {
        matches!(
            (from, to),
            (
                WorkflowStatus::Pending,
                WorkflowStatus::Approved
                    | WorkflowStatus::Rejected
                    | WorkflowStatus::Escalated
                    | WorkflowStatus::Cancelled
                    | WorkflowStatus::Expired
            ) | (
                WorkflowStatus::Escalated,
                WorkflowStatus::Pending
                    | WorkflowStatus::Rejected
                    | WorkflowStatus::Cancelled
                    | WorkflowStatus::Expired
            )
        )
    }

    /// Records `approver`'s sign-off.
    ///
    /// # Errors
    ///
    /// - `NotActionable` unless the workflow is Pending
    /// - `Expired` past the deadline
    /// - `NotAuthorized` for actors without an approving role
    /// - `SelfApproval` when the approver initiated the operation
    /// - `DuplicateApprover` for a second sign-off by the same person
    pub fn submit_approval(
        workflow: &ApprovalWorkflow,
        approver: &Actor,
        notes: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<(ApprovalWorkflow, ApprovalProgress), WorkflowError> {
        if workflow.status != WorkflowStatus::Pending {
            return Err(WorkflowError::NotActionable {
                id: workflow.id,
                status: workflow.status,
            });
        }
        if workflow.is_past_expiry(now) {
            return Err(WorkflowError::Expired {
                id: workflow.id,
                expired_at: workflow.expires_at,
            });
        }
        let approver_id = match approver.user_id() {
            Some(id) if approver.can_approve() => id,
            _ => return Err(WorkflowError::NotAuthorized { action: "approve" }),
        };
        if workflow.initiated_by.user_id() == Some(approver_id) {
            return Err(WorkflowError::SelfApproval(approver_id));
        }
        if workflow.has_approved(approver_id) {
            return Err(WorkflowError::DuplicateApprover {
                id: workflow.id,
                approver: approver_id,
            });
        }

        let mut next = workflow.clone();
        next.approvals.push(Approval {
            approver_id,
            approved_at: now,
            notes,
        });
        next.version += 1;

        let remaining = next.remaining_approvals();
        if remaining > 0 {
            return Ok((next, ApprovalProgress::Recorded { remaining }));
        }

        next.status = WorkflowStatus::Approved;
        next.completed_at = Some(now);
        next.completed_by = Some(approver_id);
        Ok((next, ApprovalProgress::Completed))
    }

    /// Rejects the workflow.
    pub fn reject(
        workflow: &ApprovalWorkflow,
        approver: &Actor,
        reason: &str,
        now: DateTime<Utc>,
    ) -> Result<ApprovalWorkflow, WorkflowError> {
        let reason = required_reason(reason)?;
        if !approver.can_approve() {
            return Err(WorkflowError::NotAuthorized { action: "reject" });
        }
        Self::close(workflow, WorkflowStatus::Rejected, approver, Some(reason), now)
    }

    /// Escalates a pending workflow: one more approval and a later deadline.
    pub fn escalate(
        workflow: &ApprovalWorkflow,
        officer: &Actor,
        reason: &str,
        config: &ApprovalConfig,
        now: DateTime<Utc>,
    ) -> Result<ApprovalWorkflow, WorkflowError> {
        let reason = required_reason(reason)?;
        if !officer.can_escalate() {
            return Err(WorkflowError::NotAuthorized { action: "escalate" });
        }
        let mut next = Self::transition(workflow, WorkflowStatus::Escalated)?;
        next.required_approvals += 1;
        next.escalation_count += 1;
        next.expires_at = workflow.expires_at.max(now)
            + Duration::hours(config.escalation_extension_hours);
        next.completion_notes = Some(reason);
        Ok(next)
    }

    /// Returns an escalated workflow to Pending with its raised requirement.
    pub fn reopen(
        workflow: &ApprovalWorkflow,
        officer: &Actor,
    ) -> Result<ApprovalWorkflow, WorkflowError> {
        if !officer.can_escalate() {
            return Err(WorkflowError::NotAuthorized { action: "reopen" });
        }
        Self::transition(workflow, WorkflowStatus::Pending)
    }

    /// Cancels the workflow. Only the initiator or an admin may cancel.
    pub fn cancel(
        workflow: &ApprovalWorkflow,
        actor: &Actor,
        reason: &str,
        now: DateTime<Utc>,
    ) -> Result<ApprovalWorkflow, WorkflowError> {
        let reason = required_reason(reason)?;
        let is_initiator =
            actor.user_id().is_some() && actor.user_id() == workflow.initiated_by.user_id();
        if !is_initiator && !actor.is_admin() {
            return Err(WorkflowError::NotAuthorized { action: "cancel" });
        }
        Self::close(workflow, WorkflowStatus::Cancelled, actor, Some(reason), now)
    }

    /// Expires an open workflow whose deadline has passed.
    pub fn expire(
        workflow: &ApprovalWorkflow,
        now: DateTime<Utc>,
    ) -> Result<ApprovalWorkflow, WorkflowError> {
        if workflow.status.is_open() && !workflow.is_past_expiry(now) {
            return Err(WorkflowError::NotYetExpired {
                id: workflow.id,
                expires_at: workflow.expires_at,
            });
        }
        Self::close(workflow, WorkflowStatus::Expired, &Actor::System, None, now)
    }

    fn close(
        workflow: &ApprovalWorkflow,
        to: WorkflowStatus,
        actor: &Actor,
        notes: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<ApprovalWorkflow, WorkflowError> {
        let mut next = Self::transition(workflow, to)?;
        next.completed_at = Some(now);
        next.completed_by = actor.user_id();
        next.completion_notes = notes;
        Ok(next)
    }

    fn transition(
        workflow: &ApprovalWorkflow,
        to: WorkflowStatus,
    ) -> Result<ApprovalWorkflow, WorkflowError> {
        if !Self::is_valid_transition(workflow.status, to) {
            return Err(WorkflowError::InvalidTransition {
                from: workflow.status,
                to,
            });
        }
        let mut next = workflow.clone();
        next.status = to;
        next.version += 1;
        Ok(next)
    }
}

fn required_reason(reason: &str) -> Result<String, WorkflowError> {
    let reason = reason.trim();
    if reason.is_empty() {
        Err(WorkflowError::ReasonRequired)
    } else {
        Ok(reason.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actor::StaffRole;
    use crate::transaction::{Direction, NewTransaction, OperationKind};
    use rust_decimal_macros::dec;
    use wagerly_shared::types::{AccountId, Currency, Money, UserId};

    fn player_withdrawal(player: UserId) -> WalletTransaction {
        WalletTransaction::pending(
            NewTransaction {
                user_id: player,
                account_id: AccountId::new(),
                currency: Currency::Promo,
                kind: OperationKind::Withdrawal,
                direction: Direction::Debit,
                amount: Money::normalize(dec!(501)),
                idempotency_key: Some("withdraw-0000000000000001".to_string()),
                reference: Some("ach".to_string()),
                description: None,
                actor: Actor::player(player),
                linked_transaction_id: None,
            },
            Utc::now(),
        )
    }

    fn finance() -> Actor {
        Actor::staff(UserId::new(), StaffRole::FinanceManager)
    }

    fn officer() -> Actor {
        Actor::staff(UserId::new(), StaffRole::ComplianceOfficer)
    }

    fn dual_workflow(now: DateTime<Utc>) -> ApprovalWorkflow {
        let tx = player_withdrawal(UserId::new());
        WorkflowService::open(&tx, ApprovalType::Dual, &ApprovalConfig::default(), now)
    }

    #[test]
    fn test_open_sets_requirement_and_expiry() {
        let now = Utc::now();
        let workflow = dual_workflow(now);
        assert_eq!(workflow.status, WorkflowStatus::Pending);
        assert_eq!(workflow.required_approvals, 2);
        assert_eq!(workflow.expires_at, now + Duration::hours(48));
        assert_eq!(workflow.amount.amount(), dec!(501));

        let tx = player_withdrawal(UserId::new());
        let triple = WorkflowService::open(&tx, ApprovalType::Triple, &ApprovalConfig::default(), now);
        assert_eq!(triple.required_approvals, 3);
        assert_eq!(triple.expires_at, now + Duration::hours(72));
    }

    #[test]
    fn test_two_approvals_complete_dual() {
        let now = Utc::now();
        let workflow = dual_workflow(now);

        let (first, progress) =
            WorkflowService::submit_approval(&workflow, &finance(), None, now).unwrap();
        assert_eq!(progress, ApprovalProgress::Recorded { remaining: 1 });
        assert_eq!(first.status, WorkflowStatus::Pending);
        assert_eq!(first.version, 1);

        let last = officer();
        let (done, progress) =
            WorkflowService::submit_approval(&first, &last, Some("ok".into()), now).unwrap();
        assert_eq!(progress, ApprovalProgress::Completed);
        assert_eq!(done.status, WorkflowStatus::Approved);
        assert_eq!(done.completed_by, last.user_id());
        assert_eq!(done.approvals.len(), 2);
    }

    #[test]
    fn test_duplicate_and_self_approval_rejected() {
        let now = Utc::now();
        let workflow = dual_workflow(now);
        let approver = finance();
        let (first, _) = WorkflowService::submit_approval(&workflow, &approver, None, now).unwrap();
        assert!(matches!(
            WorkflowService::submit_approval(&first, &approver, None, now),
            Err(WorkflowError::DuplicateApprover { .. })
        ));

        let mut staff_initiated = workflow.clone();
        staff_initiated.initiated_by = approver;
        assert!(matches!(
            WorkflowService::submit_approval(&staff_initiated, &approver, None, now),
            Err(WorkflowError::SelfApproval(_))
        ));
    }

    #[test]
    fn test_players_and_support_cannot_approve() {
        let now = Utc::now();
        let workflow = dual_workflow(now);
        for actor in [
            Actor::System,
            Actor::player(UserId::new()),
            Actor::staff(UserId::new(), StaffRole::Support),
        ] {
            assert_eq!(
                WorkflowService::submit_approval(&workflow, &actor, None, now),
                Err(WorkflowError::NotAuthorized { action: "approve" })
            );
        }
    }

    #[test]
    fn test_cannot_approve_after_rejection_or_expiry() {
        let now = Utc::now();
        let workflow = dual_workflow(now);

        let rejected = WorkflowService::reject(&workflow, &finance(), "docs mismatch", now).unwrap();
        assert_eq!(rejected.status, WorkflowStatus::Rejected);
        assert!(matches!(
            WorkflowService::submit_approval(&rejected, &finance(), None, now),
            Err(WorkflowError::NotActionable { .. })
        ));

        let late = now + Duration::hours(49);
        assert!(matches!(
            WorkflowService::submit_approval(&workflow, &finance(), None, late),
            Err(WorkflowError::Expired { .. })
        ));
    }

    #[test]
    fn test_reject_requires_reason() {
        let workflow = dual_workflow(Utc::now());
        assert_eq!(
            WorkflowService::reject(&workflow, &finance(), "  ", Utc::now()),
            Err(WorkflowError::ReasonRequired)
        );
    }

    #[test]
    fn test_escalate_and_reopen() {
        let now = Utc::now();
        let config = ApprovalConfig::default();
        let workflow = dual_workflow(now);

        assert!(matches!(
            WorkflowService::escalate(&workflow, &finance(), "large", &config, now),
            Err(WorkflowError::NotAuthorized { .. })
        ));

        let escalated =
            WorkflowService::escalate(&workflow, &officer(), "pattern review", &config, now).unwrap();
        assert_eq!(escalated.status, WorkflowStatus::Escalated);
        assert_eq!(escalated.required_approvals, 3);
        assert_eq!(escalated.escalation_count, 1);
        assert_eq!(escalated.expires_at, workflow.expires_at + Duration::hours(24));

        // Approvals wait until the workflow is reopened.
        assert!(matches!(
            WorkflowService::submit_approval(&escalated, &finance(), None, now),
            Err(WorkflowError::NotActionable { .. })
        ));

        let reopened = WorkflowService::reopen(&escalated, &officer()).unwrap();
        assert_eq!(reopened.status, WorkflowStatus::Pending);
        assert_eq!(reopened.remaining_approvals(), 3);
        assert!(matches!(
            WorkflowService::reopen(&reopened, &officer()),
            Err(WorkflowError::InvalidTransition { .. })
        ));
    }

    #[test]
    fn test_cancel_by_initiator_or_admin_only() {
        let now = Utc::now();
        let workflow = dual_workflow(now);
        let initiator = workflow.initiated_by;

        assert!(matches!(
            WorkflowService::cancel(&workflow, &finance(), "changed mind", now),
            Err(WorkflowError::NotAuthorized { .. })
        ));
        let by_player = WorkflowService::cancel(&workflow, &initiator, "changed mind", now).unwrap();
        assert_eq!(by_player.status, WorkflowStatus::Cancelled);

        let admin = Actor::staff(UserId::new(), StaffRole::Admin);
        let by_admin = WorkflowService::cancel(&workflow, &admin, "duplicate", now).unwrap();
        assert_eq!(by_admin.completed_by, admin.user_id());
    }

    #[test]
    fn test_expire() {
        let now = Utc::now();
        let workflow = dual_workflow(now);
        assert!(matches!(
            WorkflowService::expire(&workflow, now),
            Err(WorkflowError::NotYetExpired { .. })
        ));

        let expired = WorkflowService::expire(&workflow, now + Duration::hours(48)).unwrap();
        assert_eq!(expired.status, WorkflowStatus::Expired);
        assert!(expired.completed_by.is_none());

        assert!(matches!(
            WorkflowService::expire(&expired, now + Duration::hours(100)),
            Err(WorkflowError::InvalidTransition { .. })
        ));
    }
}
