//! Approval workflows driven through the wallet engine.

mod common;

use chrono::{Duration, Utc};
use rust_decimal_macros::dec;
use wagerly_core::actor::Actor;
use wagerly_core::engine::{DepositRequest, WithdrawalRequest};
use wagerly_core::transaction::{TransactionStatus, WalletTransaction};
use wagerly_core::workflow::{ApprovalType, WorkflowStatus};
use wagerly_shared::types::{Currency, UserId};

use common::{Harness, admin, compliance_officer, finance, harness, key, money};

/// Funds a verified player with 1000 promo and parks a 600 withdrawal.
async fn parked_withdrawal(h: &Harness) -> (UserId, WalletTransaction) {
    let user = h.verified_player();
    h.fund_promo(user, dec!(1000)).await;
    let tx = h
        .engine
        .withdraw(
            WithdrawalRequest::new(user, money(dec!(600)), "bank_transfer", key("withdraw")),
            Actor::player(user),
        )
        .await
        .unwrap();
    assert_eq!(tx.status, TransactionStatus::RequiresApproval);
    (user, tx)
}

#[tokio::test]
async fn test_reject_releases_hold() {
    let h = harness();
    let (user, tx) = parked_withdrawal(&h).await;
    let workflow_id = tx.workflow_id.unwrap();

    let err = h
        .engine
        .reject_workflow(workflow_id, finance(), "  ")
        .await
        .unwrap_err();
    assert_eq!(err.error_code(), "REASON_REQUIRED");

    let rejected = h
        .engine
        .reject_workflow(workflow_id, finance(), "payment method mismatch")
        .await
        .unwrap();
    assert_eq!(rejected.status, WorkflowStatus::Rejected);
    assert!(rejected.completed_at.is_some());

    let tx = h.engine.get_transaction(tx.id).await.unwrap();
    assert_eq!(tx.status, TransactionStatus::Rejected);
    assert_eq!(tx.failure_reason.as_deref(), Some("payment method mismatch"));

    let account = h.account(user, Currency::Promo).await;
    assert_eq!(account.balance, money(dec!(1000)));
    assert_eq!(account.available, money(dec!(1000)));
    assert!(account.held.is_zero());
    assert_eq!(h.ledger(account.id).await.len(), 1);

    let err = h
        .engine
        .submit_approval(workflow_id, compliance_officer(), None)
        .await
        .unwrap_err();
    assert_eq!(err.error_code(), "WORKFLOW_NOT_ACTIONABLE");
}

#[tokio::test]
async fn test_only_initiator_or_admin_can_cancel() {
    let h = harness();
    let (user, tx) = parked_withdrawal(&h).await;
    let workflow_id = tx.workflow_id.unwrap();

    let err = h
        .engine
        .cancel_workflow(workflow_id, Actor::player(UserId::new()), "changed my mind")
        .await
        .unwrap_err();
    assert_eq!(err.error_code(), "NOT_AUTHORIZED");
    assert_eq!(err.http_status_code(), 403);

    let cancelled = h
        .engine
        .cancel_workflow(workflow_id, Actor::player(user), "changed my mind")
        .await
        .unwrap();
    assert_eq!(cancelled.status, WorkflowStatus::Cancelled);
    assert_eq!(cancelled.completed_by, Some(user));

    let account = h.account(user, Currency::Promo).await;
    assert_eq!(account.available, money(dec!(1000)));

    // An admin may cancel any open workflow.
    let (_, other) = parked_withdrawal(&h).await;
    let cancelled = h
        .engine
        .cancel_workflow(other.workflow_id.unwrap(), admin(), "duplicate request")
        .await
        .unwrap();
    assert_eq!(cancelled.status, WorkflowStatus::Cancelled);
}

#[tokio::test]
async fn test_initiator_cannot_approve_own_operation() {
    let h = harness();
    let user = UserId::new();
    h.fund_play(user, dec!(100)).await;
    let initiator = finance();

    let tx = h
        .engine
        .adjust(
            wagerly_core::engine::AdjustmentRequest {
                user_id: user,
                currency: Currency::Play,
                amount: money(dec!(750)),
                reason: "tournament prize".to_string(),
                idempotency_key: key("adjust"),
            },
            initiator,
        )
        .await
        .unwrap();

    let err = h
        .engine
        .submit_approval(tx.workflow_id.unwrap(), initiator, None)
        .await
        .unwrap_err();
    assert_eq!(err.error_code(), "SELF_APPROVAL");
}

#[tokio::test]
async fn test_same_approver_counts_once() {
    let h = harness();
    let (_, tx) = parked_withdrawal(&h).await;
    let workflow_id = tx.workflow_id.unwrap();
    let approver = finance();

    h.engine
        .submit_approval(workflow_id, approver, None)
        .await
        .unwrap();
    let err = h
        .engine
        .submit_approval(workflow_id, approver, None)
        .await
        .unwrap_err();
    assert_eq!(err.error_code(), "DUPLICATE_APPROVER");

    let err = h
        .engine
        .submit_approval(workflow_id, Actor::System, None)
        .await
        .unwrap_err();
    assert_eq!(err.error_code(), "NOT_AUTHORIZED");

    let workflow = h.engine.get_workflow(workflow_id).await.unwrap();
    assert_eq!(workflow.approvals.len(), 1);
    assert_eq!(workflow.status, WorkflowStatus::Pending);
}

#[tokio::test]
async fn test_escalation_raises_requirement_and_extends_deadline() {
    let h = harness();
    let (user, tx) = parked_withdrawal(&h).await;
    let workflow_id = tx.workflow_id.unwrap();
    let original = h.engine.get_workflow(workflow_id).await.unwrap();

    let err = h
        .engine
        .escalate_workflow(workflow_id, finance(), "unusual pattern")
        .await
        .unwrap_err();
    assert_eq!(err.error_code(), "NOT_AUTHORIZED");

    let escalated = h
        .engine
        .escalate_workflow(workflow_id, compliance_officer(), "unusual pattern")
        .await
        .unwrap();
    assert_eq!(escalated.status, WorkflowStatus::Escalated);
    assert_eq!(escalated.required_approvals, 3);
    assert_eq!(escalated.escalation_count, 1);
    assert_eq!(
        escalated.expires_at,
        original.expires_at + Duration::hours(24)
    );

    let err = h
        .engine
        .submit_approval(workflow_id, finance(), None)
        .await
        .unwrap_err();
    assert_eq!(err.error_code(), "WORKFLOW_NOT_ACTIONABLE");

    let reopened = h
        .engine
        .reopen_workflow(workflow_id, compliance_officer())
        .await
        .unwrap();
    assert_eq!(reopened.status, WorkflowStatus::Pending);
    assert_eq!(reopened.required_approvals, 3);

    for approver in [finance(), compliance_officer()] {
        let progress = h
            .engine
            .submit_approval(workflow_id, approver, None)
            .await
            .unwrap();
        assert_eq!(progress.status, WorkflowStatus::Pending);
    }
    let done = h
        .engine
        .submit_approval(workflow_id, admin(), None)
        .await
        .unwrap();
    assert_eq!(done.status, WorkflowStatus::Approved);
    assert_eq!(
        h.account(user, Currency::Promo).await.balance,
        money(dec!(400))
    );
}

#[tokio::test]
async fn test_large_deposit_needs_three_approvals() {
    let h = harness();
    let user = UserId::new();
    let tx = h
        .engine
        .deposit(
            DepositRequest::new(user, money(dec!(10000)), "wire_55", key("deposit")),
            Actor::System,
        )
        .await
        .unwrap();
    assert_eq!(tx.status, TransactionStatus::RequiresApproval);

    let workflow_id = tx.workflow_id.unwrap();
    let workflow = h.engine.get_workflow(workflow_id).await.unwrap();
    assert_eq!(workflow.approval_type, ApprovalType::Triple);
    assert_eq!(workflow.expires_at - workflow.created_at, Duration::hours(72));

    // Parked credits do not touch the balance.
    let account = h.account(user, Currency::Play).await;
    assert!(account.balance.is_zero());
    assert!(account.held.is_zero());

    for approver in [finance(), compliance_officer(), admin()] {
        h.engine
            .submit_approval(workflow_id, approver, None)
            .await
            .unwrap();
    }

    let executed = h.engine.get_transaction(tx.id).await.unwrap();
    assert_eq!(executed.status, TransactionStatus::Completed);
    let account = h.account(user, Currency::Play).await;
    assert_eq!(account.balance, money(dec!(10000)));
    assert_eq!(account.daily_deposit_total, money(dec!(10000)));
    assert_eq!(h.ledger(account.id).await.len(), 1);
}

#[tokio::test]
async fn test_expiry_sweep_rejects_stale_workflows() {
    let h = harness();
    let (user, tx) = parked_withdrawal(&h).await;
    let workflow_id = tx.workflow_id.unwrap();
    let maintenance = h.engine.maintenance(50);

    let report = maintenance.expire_stale(Utc::now()).await.unwrap();
    assert_eq!(report.processed, 0);

    let report = maintenance
        .expire_stale(Utc::now() + Duration::hours(49))
        .await
        .unwrap();
    assert_eq!(report.processed, 1);
    assert_eq!(report.failed, 0);

    let workflow = h.engine.get_workflow(workflow_id).await.unwrap();
    assert_eq!(workflow.status, WorkflowStatus::Expired);
    let tx = h.engine.get_transaction(tx.id).await.unwrap();
    assert_eq!(tx.status, TransactionStatus::Rejected);

    let account = h.account(user, Currency::Promo).await;
    assert_eq!(account.available, money(dec!(1000)));
    assert!(account.held.is_zero());
    let balance = h.engine.get_balance(user).await.unwrap();
    assert_eq!(balance.promo.held, money(dec!(0)));

    let report = maintenance
        .expire_stale(Utc::now() + Duration::hours(49))
        .await
        .unwrap();
    assert_eq!(report.processed, 0);
}

#[tokio::test]
async fn test_daily_reset_and_key_purge_sweeps() {
    let h = harness();
    let user = UserId::new();
    h.fund_play(user, dec!(300)).await;
    let maintenance = h.engine.maintenance(50);

    let report = maintenance.reset_daily_totals(Utc::now()).await.unwrap();
    assert_eq!(report.processed, 0);

    let tomorrow = Utc::now() + Duration::days(1);
    let report = maintenance.reset_daily_totals(tomorrow).await.unwrap();
    assert_eq!(report.processed, 1);
    let account = h.account(user, Currency::Play).await;
    assert!(account.daily_deposit_total.is_zero());
    assert_eq!(account.balance, money(dec!(300)));

    let purged = maintenance
        .purge_idempotency(Utc::now() + Duration::hours(25))
        .await
        .unwrap();
    assert_eq!(purged, 1);
}
