//! Account error types.

use chrono::{DateTime, Utc};
use thiserror::Error;
use wagerly_shared::types::{AccountId, Money};

/// Errors that can occur during account transitions.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AccountError {
    // ========== Validation Errors ==========
    /// Amounts moved by a transition must be strictly positive.
    #[error("Amount must be positive, got {0}")]
    NonPositiveAmount(Money),

    // ========== Balance Errors ==========
    /// Debit or hold exceeds the available balance.
    #[error("Insufficient balance on account {account_id}: requested {requested}, available {available}")]
    InsufficientBalance {
        /// The account.
        account_id: AccountId,
        /// Requested amount.
        requested: Money,
        /// Available balance.
        available: Money,
    },

    /// Release or confirm exceeds the held amount.
    #[error("Insufficient held funds on account {account_id}: requested {requested}, held {held}")]
    InsufficientHeld {
        /// The account.
        account_id: AccountId,
        /// Requested amount.
        requested: Money,
        /// Held amount.
        held: Money,
    },

    /// `balance == available + held` or a non-negativity bound does not hold.
    #[error("Account {account_id} invariant violated: balance {balance}, available {available}, held {held}")]
    InvariantViolation {
        /// The account.
        account_id: AccountId,
        /// Total balance.
        balance: Money,
        /// Available balance.
        available: Money,
        /// Held amount.
        held: Money,
    },

    // ========== State Errors ==========
    /// The account is frozen.
    #[error("Account {account_id} is frozen until {until}")]
    Frozen {
        /// The account.
        account_id: AccountId,
        /// Freeze expiry.
        until: DateTime<Utc>,
    },

    // ========== Concurrency Errors ==========
    /// Account version mismatch.
    #[error("Account version mismatch for account {account_id}: expected {expected}, got {actual}")]
    VersionMismatch {
        /// The account.
        account_id: AccountId,
        /// The expected version.
        expected: i64,
        /// The actual version found.
        actual: i64,
    },
}

impl AccountError {
    /// Returns the error code for API responses.
    #[must_use]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::NonPositiveAmount(_) => "NON_POSITIVE_AMOUNT",
            Self::InsufficientBalance { .. } => "INSUFFICIENT_BALANCE",
            Self::InsufficientHeld { .. } => "INSUFFICIENT_HELD",
            Self::InvariantViolation { .. } => "ACCOUNT_INVARIANT_VIOLATION",
            Self::Frozen { .. } => "ACCOUNT_FROZEN",
            Self::VersionMismatch { .. } => "ACCOUNT_VERSION_MISMATCH",
        }
    }

    /// Returns true if this error is retryable.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::VersionMismatch { .. })
    }
}
