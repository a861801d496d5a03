//! Conversions between domain types and database rows.
//!
//! Enums are stored as their canonical upper-case strings and actors in
//! their `system` / `player:<id>` / `staff:<role>:<id>` form. Decoding a
//! value the domain does not recognise is reported as corrupt data rather
//! than silently defaulted.

use chrono::{DateTime, Utc};
use sea_orm::ActiveValue::Set;
use sea_orm::prelude::DateTimeWithTimeZone;
use wagerly_core::account::Account;
use wagerly_core::actor::Actor;
use wagerly_core::idempotency::{IdempotencyError, IdempotencyRecord, RecordState};
use wagerly_core::ledger::LedgerEntry;
use wagerly_core::store::StoreError;
use wagerly_core::transaction::{Direction, OperationKind, TransactionStatus, WalletTransaction};
use wagerly_core::workflow::{Approval, ApprovalType, ApprovalWorkflow, WorkflowStatus};
use wagerly_shared::types::{
    AccountId, Currency, LedgerEntryId, Money, TransactionId, UserId, WorkflowId,
};

use crate::entities::{
    accounts, approval_workflows, idempotency_keys, ledger_entries, wallet_transactions,
};

/// Stored state of an unfinished idempotency key.
pub(crate) const IN_FLIGHT: &str = "IN_FLIGHT";
/// Stored state of a finished idempotency key.
pub(crate) const COMPLETED: &str = "COMPLETED";

fn corrupt(what: &str, value: impl std::fmt::Display) -> StoreError {
    StoreError::Corrupt(format!("invalid {what}: {value}"))
}

pub(crate) fn utc(ts: DateTimeWithTimeZone) -> DateTime<Utc> {
    ts.with_timezone(&Utc)
}

pub(crate) fn tz(ts: DateTime<Utc>) -> DateTimeWithTimeZone {
    ts.fixed_offset()
}

fn currency(value: &str) -> Result<Currency, StoreError> {
    value.parse().map_err(|_| corrupt("currency", value))
}

fn kind(value: &str) -> Result<OperationKind, StoreError> {
    OperationKind::parse(value).ok_or_else(|| corrupt("operation kind", value))
}

fn actor(value: &str) -> Result<Actor, StoreError> {
    value.parse().map_err(|_| corrupt("actor", value))
}

// ============================================================================
// Accounts
// ============================================================================

pub(crate) fn into_account(row: accounts::Model) -> Result<Account, StoreError> {
    Ok(Account {
        id: AccountId::from_uuid(row.id),
        user_id: UserId::from_uuid(row.user_id),
        currency: currency(&row.currency)?,
        balance: Money::from(row.balance),
        available: Money::from(row.available),
        held: Money::from(row.held),
        lifetime_wagered: Money::from(row.lifetime_wagered),
        lifetime_won: Money::from(row.lifetime_won),
        daily_deposit_total: Money::from(row.daily_deposit_total),
        daily_withdrawal_total: Money::from(row.daily_withdrawal_total),
        daily_reset_at: utc(row.daily_reset_at),
        frozen_until: row.frozen_until.map(utc),
        freeze_reason: row.freeze_reason,
        version: row.version,
        created_at: utc(row.created_at),
        updated_at: utc(row.updated_at),
    })
}

pub(crate) fn account_model(account: &Account) -> accounts::ActiveModel {
    accounts::ActiveModel {
        id: Set(account.id.into_inner()),
        user_id: Set(account.user_id.into_inner()),
        currency: Set(account.currency.as_str().to_string()),
        balance: Set(account.balance.amount()),
        available: Set(account.available.amount()),
        held: Set(account.held.amount()),
        lifetime_wagered: Set(account.lifetime_wagered.amount()),
        lifetime_won: Set(account.lifetime_won.amount()),
        daily_deposit_total: Set(account.daily_deposit_total.amount()),
        daily_withdrawal_total: Set(account.daily_withdrawal_total.amount()),
        daily_reset_at: Set(tz(account.daily_reset_at)),
        frozen_until: Set(account.frozen_until.map(tz)),
        freeze_reason: Set(account.freeze_reason.clone()),
        version: Set(account.version),
        created_at: Set(tz(account.created_at)),
        updated_at: Set(tz(account.updated_at)),
    }
}

// ============================================================================
// Ledger
// ============================================================================

pub(crate) fn into_ledger_entry(row: ledger_entries::Model) -> Result<LedgerEntry, StoreError> {
    Ok(LedgerEntry {
        id: LedgerEntryId::from_uuid(row.id),
        account_id: AccountId::from_uuid(row.account_id),
        user_id: UserId::from_uuid(row.user_id),
        currency: currency(&row.currency)?,
        kind: kind(&row.kind)?,
        amount: Money::from(row.amount),
        balance_before: Money::from(row.balance_before),
        balance_after: Money::from(row.balance_after),
        transaction_id: TransactionId::from_uuid(row.transaction_id),
        reference_id: row.reference_id,
        actor: actor(&row.actor)?,
        reason: row.reason,
        created_at: utc(row.created_at),
    })
}

pub(crate) fn ledger_entry_model(entry: &LedgerEntry) -> ledger_entries::ActiveModel {
    ledger_entries::ActiveModel {
        id: Set(entry.id.into_inner()),
        account_id: Set(entry.account_id.into_inner()),
        user_id: Set(entry.user_id.into_inner()),
        currency: Set(entry.currency.as_str().to_string()),
        kind: Set(entry.kind.as_str().to_string()),
        amount: Set(entry.amount.amount()),
        balance_before: Set(entry.balance_before.amount()),
        balance_after: Set(entry.balance_after.amount()),
        transaction_id: Set(entry.transaction_id.into_inner()),
        reference_id: Set(entry.reference_id.clone()),
        actor: Set(entry.actor.to_string()),
        reason: Set(entry.reason.clone()),
        created_at: Set(tz(entry.created_at)),
    }
}

// ============================================================================
// Transactions
// ============================================================================

pub(crate) fn into_transaction(
    row: wallet_transactions::Model,
) -> Result<WalletTransaction, StoreError> {
    Ok(WalletTransaction {
        id: TransactionId::from_uuid(row.id),
        user_id: UserId::from_uuid(row.user_id),
        account_id: AccountId::from_uuid(row.account_id),
        currency: currency(&row.currency)?,
        kind: kind(&row.kind)?,
        direction: Direction::parse(&row.direction)
            .ok_or_else(|| corrupt("direction", &row.direction))?,
        amount: Money::from(row.amount),
        status: TransactionStatus::parse(&row.status)
            .ok_or_else(|| corrupt("transaction status", &row.status))?,
        idempotency_key: row.idempotency_key,
        reference: row.reference,
        description: row.description,
        actor: actor(&row.actor)?,
        balance_before: row.balance_before.map(Money::from),
        balance_after: row.balance_after.map(Money::from),
        linked_transaction_id: row.linked_transaction_id.map(TransactionId::from_uuid),
        workflow_id: row.workflow_id.map(WorkflowId::from_uuid),
        reversed_by: row.reversed_by.map(TransactionId::from_uuid),
        failure_reason: row.failure_reason,
        created_at: utc(row.created_at),
        processed_at: row.processed_at.map(utc),
    })
}

pub(crate) fn transaction_model(tx: &WalletTransaction) -> wallet_transactions::ActiveModel {
    wallet_transactions::ActiveModel {
        id: Set(tx.id.into_inner()),
        user_id: Set(tx.user_id.into_inner()),
        account_id: Set(tx.account_id.into_inner()),
        currency: Set(tx.currency.as_str().to_string()),
        kind: Set(tx.kind.as_str().to_string()),
        direction: Set(tx.direction.as_str().to_string()),
        amount: Set(tx.amount.amount()),
        status: Set(tx.status.as_str().to_string()),
        idempotency_key: Set(tx.idempotency_key.clone()),
        reference: Set(tx.reference.clone()),
        description: Set(tx.description.clone()),
        actor: Set(tx.actor.to_string()),
        balance_before: Set(tx.balance_before.map(Money::amount)),
        balance_after: Set(tx.balance_after.map(Money::amount)),
        linked_transaction_id: Set(tx.linked_transaction_id.map(TransactionId::into_inner)),
        workflow_id: Set(tx.workflow_id.map(WorkflowId::into_inner)),
        reversed_by: Set(tx.reversed_by.map(TransactionId::into_inner)),
        failure_reason: Set(tx.failure_reason.clone()),
        created_at: Set(tz(tx.created_at)),
        processed_at: Set(tx.processed_at.map(tz)),
    }
}

// ============================================================================
// Workflows
// ============================================================================

pub(crate) fn into_workflow(
    row: approval_workflows::Model,
) -> Result<ApprovalWorkflow, StoreError> {
    let approvals: Vec<Approval> = serde_json::from_value(row.approvals)
        .map_err(|err| corrupt("approvals", err))?;
    Ok(ApprovalWorkflow {
        id: WorkflowId::from_uuid(row.id),
        transaction_id: TransactionId::from_uuid(row.transaction_id),
        user_id: UserId::from_uuid(row.user_id),
        approval_type: ApprovalType::parse(&row.approval_type)
            .ok_or_else(|| corrupt("approval type", &row.approval_type))?,
        required_approvals: u32::try_from(row.required_approvals)
            .map_err(|_| corrupt("required approvals", row.required_approvals))?,
        approvals,
        status: WorkflowStatus::parse(&row.status)
            .ok_or_else(|| corrupt("workflow status", &row.status))?,
        initiated_by: actor(&row.initiated_by)?,
        reason: row.reason,
        amount: Money::from(row.amount),
        currency: currency(&row.currency)?,
        escalation_count: u32::try_from(row.escalation_count)
            .map_err(|_| corrupt("escalation count", row.escalation_count))?,
        created_at: utc(row.created_at),
        expires_at: utc(row.expires_at),
        completed_at: row.completed_at.map(utc),
        completed_by: row.completed_by.map(UserId::from_uuid),
        completion_notes: row.completion_notes,
        version: row.version,
    })
}

pub(crate) fn workflow_model(
    workflow: &ApprovalWorkflow,
) -> Result<approval_workflows::ActiveModel, StoreError> {
    let approvals =
        serde_json::to_value(&workflow.approvals).map_err(|err| corrupt("approvals", err))?;
    Ok(approval_workflows::ActiveModel {
        id: Set(workflow.id.into_inner()),
        transaction_id: Set(workflow.transaction_id.into_inner()),
        user_id: Set(workflow.user_id.into_inner()),
        approval_type: Set(workflow.approval_type.as_str().to_string()),
        required_approvals: Set(i32::try_from(workflow.required_approvals)
            .map_err(|_| corrupt("required approvals", workflow.required_approvals))?),
        approvals: Set(approvals),
        status: Set(workflow.status.as_str().to_string()),
        initiated_by: Set(workflow.initiated_by.to_string()),
        reason: Set(workflow.reason.clone()),
        amount: Set(workflow.amount.amount()),
        currency: Set(workflow.currency.as_str().to_string()),
        escalation_count: Set(i32::try_from(workflow.escalation_count)
            .map_err(|_| corrupt("escalation count", workflow.escalation_count))?),
        created_at: Set(tz(workflow.created_at)),
        expires_at: Set(tz(workflow.expires_at)),
        completed_at: Set(workflow.completed_at.map(tz)),
        completed_by: Set(workflow.completed_by.map(UserId::into_inner)),
        completion_notes: Set(workflow.completion_notes.clone()),
        version: Set(workflow.version),
    })
}

// ============================================================================
// Idempotency keys
// ============================================================================

pub(crate) fn into_idempotency_record(
    row: idempotency_keys::Model,
) -> Result<IdempotencyRecord, IdempotencyError> {
    let state = match (row.state.as_str(), row.outcome) {
        (IN_FLIGHT, _) => RecordState::InFlight,
        (COMPLETED, Some(outcome)) => RecordState::Completed(
            serde_json::from_value(outcome)
                .map_err(|err| IdempotencyError::Store(format!("invalid outcome: {err}")))?,
        ),
        (state, _) => {
            return Err(IdempotencyError::Store(format!(
                "invalid idempotency state: {state}"
            )));
        }
    };
    Ok(IdempotencyRecord {
        key: row.key,
        state,
        created_at: utc(row.created_at),
        expires_at: utc(row.expires_at),
    })
}
