//! Ledger service for entry construction and reconciliation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use wagerly_shared::types::{AccountId, LedgerEntryId, Money};

use crate::account::Account;
use crate::ledger::entry::LedgerEntry;
use crate::ledger::error::LedgerError;
use crate::transaction::WalletTransaction;

/// Result of comparing the ledger sum with the live balance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reconciliation {
    /// The account checked.
    pub account_id: AccountId,
    /// True when the difference is zero.
    pub balanced: bool,
    /// Sum of all ledger entries.
    pub ledger_sum: Money,
    /// Live account balance.
    pub account_balance: Money,
    /// `account_balance - ledger_sum`.
    pub difference: Money,
}

/// Stateless ledger logic.
pub struct LedgerService;

impl LedgerService {
    /// Builds the entry recording `transaction` moving `before` to `after`.
    ///
    /// # Errors
    ///
    /// Returns `ZeroAmount` for a zero amount, `AccountMismatch` if the two
    /// snapshots are different accounts, and `BalanceMismatch` if
    /// `after.balance != before.balance + amount`.
    pub fn build_entry(
        transaction: &WalletTransaction,
        before: &Account,
        after: &Account,
        reason: &str,
        now: DateTime<Utc>,
    ) -> Result<LedgerEntry, LedgerError> {
        let amount = transaction.signed_amount();
        if amount.is_zero() {
            return Err(LedgerError::ZeroAmount);
        }
        if before.id != after.id {
            return Err(LedgerError::AccountMismatch {
                account: before.id,
                entry_account: after.id,
            });
        }
        Self::check_arithmetic(before.balance, amount, after.balance)?;

        let reference_id = transaction.reference.clone().or_else(|| {
            transaction
                .linked_transaction_id
                .map(|linked| linked.to_string())
        });

        Ok(LedgerEntry {
            id: LedgerEntryId::new(),
            account_id: after.id,
            user_id: after.user_id,
            currency: after.currency,
            kind: transaction.kind,
            amount,
            balance_before: before.balance,
            balance_after: after.balance,
            transaction_id: transaction.id,
            reference_id,
            actor: transaction.actor,
            reason: reason.to_string(),
            created_at: now,
        })
    }

    /// Sum of the signed amounts.
    #[must_use]
    pub fn sum(entries: &[LedgerEntry]) -> Money {
        entries.iter().map(|e| e.amount).sum()
    }

    /// Verifies each entry's arithmetic and that consecutive entries chain.
    ///
    /// `entries` must be the account's complete history in creation order.
    pub fn verify_chain(account_id: AccountId, entries: &[LedgerEntry]) -> Result<(), LedgerError> {
        let mut running = Money::ZERO;
        for entry in entries {
            if entry.account_id != account_id {
                return Err(LedgerError::AccountMismatch {
                    account: account_id,
                    entry_account: entry.account_id,
                });
            }
            if entry.balance_before != running {
                return Err(LedgerError::BrokenChain {
                    entry_id: entry.id,
                    expected: running,
                    actual: entry.balance_before,
                });
            }
            Self::check_arithmetic(entry.balance_before, entry.amount, entry.balance_after)?;
            running = entry.balance_after;
        }
        Ok(())
    }

    /// Compares a ledger sum with the account's live balance.
    #[must_use]
    pub fn reconcile(account: &Account, ledger_sum: Money) -> Reconciliation {
        let difference = account.balance - ledger_sum;
        Reconciliation {
            account_id: account.id,
            balanced: difference.is_zero(),
            ledger_sum,
            account_balance: account.balance,
            difference,
        }
    }

    fn check_arithmetic(before: Money, amount: Money, after: Money) -> Result<(), LedgerError> {
        if before + amount == after {
            Ok(())
        } else {
            Err(LedgerError::BalanceMismatch {
                before,
                amount,
                after,
            })
        }
    }
}
