//! Ledger error types.

use thiserror::Error;
use wagerly_shared::types::{AccountId, LedgerEntryId, Money};

/// Errors that can occur while building or verifying ledger entries.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
    /// Entry amount cannot be zero.
    #[error("Entry amount cannot be zero")]
    ZeroAmount,

    /// Snapshot arithmetic does not hold.
    #[error("Entry does not balance: before {before} + amount {amount} != after {after}")]
    BalanceMismatch {
        /// Balance before.
        before: Money,
        /// Signed amount.
        amount: Money,
        /// Balance after.
        after: Money,
    },

    /// Entry belongs to a different account than the one being verified.
    #[error("Entry account {entry_account} does not match account {account}")]
    AccountMismatch {
        /// The account being verified.
        account: AccountId,
        /// The account on the entry.
        entry_account: AccountId,
    },

    /// Consecutive entries do not chain (`before` of one != `after` of the previous).
    #[error("Ledger chain broken at entry {entry_id}: expected before {expected}, found {actual}")]
    BrokenChain {
        /// Offending entry.
        entry_id: LedgerEntryId,
        /// Previous entry's balance after.
        expected: Money,
        /// This entry's balance before.
        actual: Money,
    },
}

impl LedgerError {
    /// Returns the error code for API responses.
    #[must_use]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::ZeroAmount => "ZERO_AMOUNT",
            Self::BalanceMismatch { .. } => "LEDGER_BALANCE_MISMATCH",
            Self::AccountMismatch { .. } => "LEDGER_ACCOUNT_MISMATCH",
            Self::BrokenChain { .. } => "LEDGER_CHAIN_BROKEN",
        }
    }
}
