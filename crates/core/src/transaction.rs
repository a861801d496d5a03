//! The engine's unit of work and its lifecycle.
//!
//! A transaction is created `Pending` and moves to exactly one terminal
//! state. The valid transitions are:
//! - Pending → Completed (executed directly)
//! - Pending → RequiresApproval (parked behind a workflow)
//! - Pending → Failed (execution error)
//! - RequiresApproval → Completed (approved)
//! - RequiresApproval → Rejected (rejected, cancelled or expired)

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use wagerly_shared::types::{AccountId, Currency, Money, TransactionId, UserId, WorkflowId};

use crate::actor::Actor;

/// Kind of balance-affecting operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OperationKind {
    /// Purchase of play currency.
    Deposit,
    /// Redemption of promotional currency.
    Withdrawal,
    /// Stake placed on a game round.
    Bet,
    /// Payout of a game round.
    Win,
    /// Promotional credit.
    Bonus,
    /// Manual back-office correction.
    Adjustment,
    /// Reversal of an earlier transaction.
    Reversal,
}

impl OperationKind {
    /// Returns the string representation of the kind.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Deposit => "DEPOSIT",
            Self::Withdrawal => "WITHDRAWAL",
            Self::Bet => "BET",
            Self::Win => "WIN",
            Self::Bonus => "BONUS",
            Self::Adjustment => "ADJUSTMENT",
            Self::Reversal => "REVERSAL",
        }
    }

    /// Parses a kind from a string.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "DEPOSIT" => Some(Self::Deposit),
            "WITHDRAWAL" => Some(Self::Withdrawal),
            "BET" => Some(Self::Bet),
            "WIN" => Some(Self::Win),
            "BONUS" => Some(Self::Bonus),
            "ADJUSTMENT" => Some(Self::Adjustment),
            "REVERSAL" => Some(Self::Reversal),
            _ => None,
        }
    }

    /// Operations initiated by or for a player, as opposed to back-office corrections.
    #[must_use]
    pub const fn is_player_facing(&self) -> bool {
        matches!(
            self,
            Self::Deposit | Self::Withdrawal | Self::Bet | Self::Win | Self::Bonus
        )
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether a transaction adds to or takes from the balance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Direction {
    /// Adds to the balance.
    Credit,
    /// Takes from the balance.
    Debit,
}

impl Direction {
    /// Returns the string representation of the direction.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Credit => "CREDIT",
            Self::Debit => "DEBIT",
        }
    }

    /// Parses a direction from a string.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "CREDIT" => Some(Self::Credit),
            "DEBIT" => Some(Self::Debit),
            _ => None,
        }
    }

    /// The opposite direction.
    #[must_use]
    pub const fn inverse(self) -> Self {
        match self {
            Self::Credit => Self::Debit,
            Self::Debit => Self::Credit,
        }
    }
}

/// Lifecycle status of a wallet transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionStatus {
    /// Created, not yet executed.
    Pending,
    /// Applied to the balance and recorded in the ledger.
    Completed,
    /// Execution failed; no balance change.
    Failed,
    /// Parked behind an approval workflow.
    RequiresApproval,
    /// Workflow ended without approval; no balance change.
    Rejected,
}

impl TransactionStatus {
    /// Returns the string representation of the status.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Completed => "COMPLETED",
            Self::Failed => "FAILED",
            Self::RequiresApproval => "REQUIRES_APPROVAL",
            Self::Rejected => "REJECTED",
        }
    }

    /// Parses a status from a string.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "PENDING" => Some(Self::Pending),
            "COMPLETED" => Some(Self::Completed),
            "FAILED" => Some(Self::Failed),
            "REQUIRES_APPROVAL" => Some(Self::RequiresApproval),
            "REJECTED" => Some(Self::Rejected),
            _ => None,
        }
    }

    /// Returns true if no further transition is possible.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Rejected)
    }

    /// Returns true if moving to `next` is a valid lifecycle step.
    #[must_use]
    pub const fn can_transition_to(&self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Completed | Self::RequiresApproval | Self::Failed)
                | (Self::RequiresApproval, Self::Completed | Self::Rejected)
        )
    }
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Attempted an invalid lifecycle step.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Transaction {id} cannot move from {from} to {to}")]
pub struct InvalidTransition {
    /// The transaction.
    pub id: TransactionId,
    /// Current status.
    pub from: TransactionStatus,
    /// Attempted status.
    pub to: TransactionStatus,
}

/// A wallet transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalletTransaction {
    /// Unique identifier.
    pub id: TransactionId,
    /// Wallet owner.
    pub user_id: UserId,
    /// Account the transaction applies to.
    pub account_id: AccountId,
    /// Currency of the account.
    pub currency: Currency,
    /// Operation kind.
    pub kind: OperationKind,
    /// Credit or debit.
    pub direction: Direction,
    /// Unsigned amount.
    pub amount: Money,
    /// Lifecycle status.
    pub status: TransactionStatus,
    /// Idempotency key the operation was submitted under.
    pub idempotency_key: Option<String>,
    /// External correlation (payment, game round or promotion reference).
    pub reference: Option<String>,
    /// Free-text description or reason.
    pub description: Option<String>,
    /// Who initiated the operation.
    pub actor: Actor,
    /// Balance before execution.
    pub balance_before: Option<Money>,
    /// Balance after execution.
    pub balance_after: Option<Money>,
    /// Related transaction (a win's bet, a reversal's original).
    pub linked_transaction_id: Option<TransactionId>,
    /// Workflow the transaction is parked behind.
    pub workflow_id: Option<WorkflowId>,
    /// Reversal that undid this transaction.
    pub reversed_by: Option<TransactionId>,
    /// Captured failure or rejection reason.
    pub failure_reason: Option<String>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Completion time.
    pub processed_at: Option<DateTime<Utc>>,
    /// Failure or rejection time.
    pub failed_at: Option<DateTime<Utc>>,
}

/// Fields describing a new transaction.
#[derive(Debug, Clone)]
pub struct NewTransaction {
    /// Wallet owner.
    pub user_id: UserId,
    /// Account the transaction applies to.
    pub account_id: AccountId,
    /// Currency.
    pub currency: Currency,
    /// Operation kind.
    pub kind: OperationKind,
    /// Credit or debit.
    pub direction: Direction,
    /// Unsigned amount.
    pub amount: Money,
    /// Idempotency key.
    pub idempotency_key: Option<String>,
    /// External correlation.
    pub reference: Option<String>,
    /// Description or reason.
    pub description: Option<String>,
    /// Initiator.
    pub actor: Actor,
    /// Related transaction.
    pub linked_transaction_id: Option<TransactionId>,
}

impl WalletTransaction {
    /// Creates a pending transaction.
    #[must_use]
    pub fn pending(new: NewTransaction, now: DateTime<Utc>) -> Self {
        Self {
            id: TransactionId::new(),
            user_id: new.user_id,
            account_id: new.account_id,
            currency: new.currency,
            kind: new.kind,
            direction: new.direction,
            amount: new.amount,
            status: TransactionStatus::Pending,
            idempotency_key: new.idempotency_key,
            reference: new.reference,
            description: new.description,
            actor: new.actor,
            balance_before: None,
            balance_after: None,
            linked_transaction_id: new.linked_transaction_id,
            workflow_id: None,
            reversed_by: None,
            failure_reason: None,
            created_at: now,
            processed_at: None,
            failed_at: None,
        }
    }

    /// Amount with the sign of its direction.
    #[must_use]
    pub fn signed_amount(&self) -> Money {
        match self.direction {
            Direction::Credit => self.amount,
            Direction::Debit => -self.amount,
        }
    }

    fn transition(&self, to: TransactionStatus) -> Result<Self, InvalidTransition> {
        if !self.status.can_transition_to(to) {
            return Err(InvalidTransition {
                id: self.id,
                from: self.status,
                to,
            });
        }
        let mut next = self.clone();
        next.status = to;
        Ok(next)
    }

    /// Marks the transaction executed with its balance snapshot.
    pub fn complete(
        &self,
        balance_before: Money,
        balance_after: Money,
        now: DateTime<Utc>,
    ) -> Result<Self, InvalidTransition> {
        let mut next = self.transition(TransactionStatus::Completed)?;
        next.balance_before = Some(balance_before);
        next.balance_after = Some(balance_after);
        next.processed_at = Some(now);
        Ok(next)
    }

    /// Parks the transaction behind `workflow_id`.
    pub fn park(&self, workflow_id: WorkflowId) -> Result<Self, InvalidTransition> {
        let mut next = self.transition(TransactionStatus::RequiresApproval)?;
        next.workflow_id = Some(workflow_id);
        Ok(next)
    }

    /// Records an execution failure.
    pub fn fail(&self, reason: &str, now: DateTime<Utc>) -> Result<Self, InvalidTransition> {
        let mut next = self.transition(TransactionStatus::Failed)?;
        next.failure_reason = Some(reason.to_string());
        next.failed_at = Some(now);
        Ok(next)
    }

    /// Records that the parked transaction will never execute.
    pub fn reject(&self, reason: &str, now: DateTime<Utc>) -> Result<Self, InvalidTransition> {
        let mut next = self.transition(TransactionStatus::Rejected)?;
        next.failure_reason = Some(reason.to_string());
        next.failed_at = Some(now);
        Ok(next)
    }

    /// Returns true if a completed transaction can still be reversed.
    #[must_use]
    pub fn is_reversible(&self) -> bool {
        self.status == TransactionStatus::Completed
            && self.reversed_by.is_none()
            && self.kind != OperationKind::Reversal
    }

    /// Links a completed transaction to the reversal that undid it.
    ///
    /// The status stays `Completed`; only `reversed_by` changes.
    #[must_use]
    pub fn mark_reversed(&self, reversal_id: TransactionId) -> Self {
        let mut next = self.clone();
        next.reversed_by = Some(reversal_id);
        next
    }
}
