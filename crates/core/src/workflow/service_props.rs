//! Property-based tests for WorkflowService.

use chrono::{Duration, Utc};
use proptest::prelude::*;
use rust_decimal_macros::dec;
use wagerly_shared::config::ApprovalConfig;
use wagerly_shared::types::{AccountId, Currency, Money, UserId};

use crate::actor::{Actor, StaffRole};
use crate::transaction::{Direction, NewTransaction, OperationKind, WalletTransaction};
use crate::workflow::error::WorkflowError;
use crate::workflow::service::WorkflowService;
use crate::workflow::types::{ApprovalProgress, ApprovalType, ApprovalWorkflow, WorkflowStatus};

fn arb_status() -> impl Strategy<Value = WorkflowStatus> {
    prop_oneof![
        Just(WorkflowStatus::Pending),
        Just(WorkflowStatus::Approved),
        Just(WorkflowStatus::Rejected),
        Just(WorkflowStatus::Escalated),
        Just(WorkflowStatus::Cancelled),
        Just(WorkflowStatus::Expired),
    ]
}

fn arb_approval_type() -> impl Strategy<Value = ApprovalType> {
    prop_oneof![Just(ApprovalType::Dual), Just(ApprovalType::Triple)]
}

#[derive(Debug, Clone, Copy)]
enum Action {
    Approve(u8),
    Reject,
    Escalate,
    Reopen,
    Cancel,
    Expire,
}

fn arb_action() -> impl Strategy<Value = Action> {
    prop_oneof![
        4 => (0u8..4).prop_map(Action::Approve),
        1 => Just(Action::Reject),
        1 => Just(Action::Escalate),
        1 => Just(Action::Reopen),
        1 => Just(Action::Cancel),
        1 => Just(Action::Expire),
    ]
}

fn workflow(approval_type: ApprovalType) -> ApprovalWorkflow {
    let player = UserId::new();
    let tx = WalletTransaction::pending(
        NewTransaction {
            user_id: player,
            account_id: AccountId::new(),
            currency: Currency::Promo,
            kind: OperationKind::Withdrawal,
            direction: Direction::Debit,
            amount: Money::normalize(dec!(750)),
            idempotency_key: None,
            reference: None,
            description: None,
            actor: Actor::player(player),
            linked_transaction_id: None,
        },
        Utc::now(),
    );
    WorkflowService::open(&tx, approval_type, &ApprovalConfig::default(), Utc::now())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    /// No transition ever leaves a terminal status.
    #[test]
    fn prop_terminal_states_are_final(from in arb_status(), to in arb_status()) {
        if from.is_terminal() {
            prop_assert!(!WorkflowService::is_valid_transition(from, to));
        }
    }

    /// Random action sequences keep the workflow consistent.
    #[test]
    fn prop_action_sequences_stay_consistent(
        approval_type in arb_approval_type(),
        actions in prop::collection::vec(arb_action(), 1..30),
    ) {
        let config = ApprovalConfig::default();
        let now = Utc::now();
        let approvers: Vec<Actor> = (0..4)
            .map(|_| Actor::staff(UserId::new(), StaffRole::FinanceManager))
            .collect();
        let officer = Actor::staff(UserId::new(), StaffRole::ComplianceOfficer);
        let mut current = workflow(approval_type);
        let mut completions = 0;

        for action in actions {
            let before = current.clone();
            let result = match action {
                Action::Approve(i) => {
                    WorkflowService::submit_approval(&current, &approvers[usize::from(i)], None, now)
                        .map(|(next, progress)| {
                            if progress == ApprovalProgress::Completed {
                                completions += 1;
                            }
                            next
                        })
                }
                Action::Reject => WorkflowService::reject(&current, &officer, "no", now),
                Action::Escalate => WorkflowService::escalate(&current, &officer, "review", &config, now),
                Action::Reopen => WorkflowService::reopen(&current, &officer),
                Action::Cancel => WorkflowService::cancel(&current, &current.initiated_by, "stop", now),
                Action::Expire => WorkflowService::expire(&current, now + Duration::days(30)),
            };

            match result {
                Ok(next) => {
                    prop_assert_eq!(next.version, before.version + 1);
                    prop_assert!(
                        next.status == before.status
                            || WorkflowService::is_valid_transition(before.status, next.status)
                    );
                    current = next;
                }
                Err(_) => prop_assert_eq!(&current, &before),
            }

            let given = u32::try_from(current.approvals.len()).unwrap();
            prop_assert!(given <= current.required_approvals);
            if current.status == WorkflowStatus::Approved {
                prop_assert_eq!(given, current.required_approvals);
            }
        }

        prop_assert!(completions <= 1);
    }

    /// The same approver can never be counted twice.
    #[test]
    fn prop_approvers_are_distinct(repeats in 2usize..6) {
        let now = Utc::now();
        let approver = Actor::staff(UserId::new(), StaffRole::Admin);
        let mut current = workflow(ApprovalType::Triple);
        for _ in 0..repeats {
            match WorkflowService::submit_approval(&current, &approver, None, now) {
                Ok((next, _)) => current = next,
                Err(err) => prop_assert!(
                    matches!(err, WorkflowError::DuplicateApprover { .. }),
                    "unexpected error: {}", err
                ),
            }
        }
        prop_assert_eq!(current.approvals.len(), 1);
    }
}
