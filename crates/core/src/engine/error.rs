//! Wallet engine error types.

use chrono::{DateTime, Utc};
use thiserror::Error;
use wagerly_shared::types::{AccountId, Money, TransactionId};

use crate::account::AccountError;
use crate::compliance::DenyCode;
use crate::idempotency::IdempotencyError;
use crate::ledger::LedgerError;
use crate::lock::LockError;
use crate::profile::ProfileError;
use crate::store::StoreError;
use crate::transaction::InvalidTransition;
use crate::workflow::WorkflowError;

/// Errors returned by wallet operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WalletError {
    // ========== Request Errors ==========
    /// The request is malformed or violates a business rule.
    #[error("Validation failed: {0}")]
    Validation(String),

    /// The actor may not perform this operation.
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// A referenced entity does not exist.
    #[error("Not found: {0}")]
    NotFound(String),

    // ========== Balance Errors ==========
    /// The debit or hold exceeds the available balance.
    #[error("Insufficient balance: requested {requested}, available {available}")]
    InsufficientBalance {
        /// Requested amount.
        requested: Money,
        /// Available balance.
        available: Money,
    },

    /// The account is frozen.
    #[error("Account is frozen until {until}")]
    AccountFrozen {
        /// Freeze expiry.
        until: DateTime<Utc>,
    },

    // ========== Compliance Errors ==========
    /// The compliance gate refused the operation.
    #[error("{message}")]
    Compliance {
        /// Machine-readable reason.
        code: DenyCode,
        /// Human-readable explanation.
        message: String,
    },

    // ========== Concurrency Errors ==========
    /// Another request with the same idempotency key is still running.
    #[error("Request with idempotency key {0} is still in progress")]
    IdempotencyConflict(String),

    /// The idempotency key was first used for a different request.
    #[error("Idempotency key {0} was already used for a different request")]
    IdempotencyKeyReused(String),

    /// The per-user lock could not be acquired in time.
    #[error("Timed out after {waited_ms}ms waiting for lock {key}")]
    LockTimeout {
        /// Lock key.
        key: String,
        /// How long the caller waited.
        waited_ms: u64,
    },

    /// A versioned write lost a race.
    #[error("Concurrent modification: {0}")]
    OptimisticConflict(String),

    // ========== Integrity Errors ==========
    /// The ledger no longer sums to the account balance.
    #[error("Ledger integrity violation on account {account_id}: difference {difference}")]
    LedgerIntegrityViolation {
        /// The drifted account.
        account_id: AccountId,
        /// `balance - ledger_sum`.
        difference: Money,
    },

    /// A workflow action was refused.
    #[error(transparent)]
    WorkflowState(WorkflowError),

    /// A transaction status change was refused.
    #[error(transparent)]
    TransactionState(InvalidTransition),

    // ========== Infrastructure Errors ==========
    /// The operation was accepted but could not be persisted.
    #[error("Transaction {transaction_id} failed: {reason}")]
    ExecutionFailed {
        /// The failed transaction.
        transaction_id: TransactionId,
        /// What went wrong.
        reason: String,
    },

    /// The player profile could not be loaded.
    #[error("Player profile unavailable: {0}")]
    ProfileUnavailable(String),

    /// The store failed.
    #[error("Store error: {0}")]
    Store(String),

    /// A ledger entry could not be built.
    #[error(transparent)]
    Ledger(LedgerError),

    /// An unexpected internal failure.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl WalletError {
    /// Returns the HTTP status code for this error.
    #[must_use]
    pub fn http_status_code(&self) -> u16 {
        match self {
            Self::Validation(_) => 400,
            Self::Forbidden(_) => 403,
            Self::NotFound(_) => 404,
            Self::IdempotencyConflict(_)
            | Self::OptimisticConflict(_)
            | Self::TransactionState(_) => 409,
            Self::InsufficientBalance { .. }
            | Self::Compliance { .. }
            | Self::IdempotencyKeyReused(_) => 422,
            Self::AccountFrozen { .. } => 423,
            Self::WorkflowState(err) => err.status_code(),
            Self::LockTimeout { .. } | Self::ProfileUnavailable(_) | Self::Store(_) => 503,
            Self::LedgerIntegrityViolation { .. }
            | Self::ExecutionFailed { .. }
            | Self::Ledger(_)
            | Self::Internal(_) => 500,
        }
    }

    /// Returns the error code for API responses.
    ///
    /// Compliance refusals report their deny code.
    #[must_use]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::Forbidden(_) => "FORBIDDEN",
            Self::NotFound(_) => "NOT_FOUND",
            Self::InsufficientBalance { .. } => "INSUFFICIENT_BALANCE",
            Self::AccountFrozen { .. } => "ACCOUNT_FROZEN",
            Self::Compliance { code, .. } => code.as_str(),
            Self::IdempotencyConflict(_) => "IDEMPOTENCY_CONFLICT",
            Self::IdempotencyKeyReused(_) => "IDEMPOTENCY_KEY_REUSED",
            Self::LockTimeout { .. } => "LOCK_TIMEOUT",
            Self::OptimisticConflict(_) => "OPTIMISTIC_CONFLICT",
            Self::LedgerIntegrityViolation { .. } => "LEDGER_INTEGRITY_VIOLATION",
            Self::WorkflowState(err) => err.error_code(),
            Self::TransactionState(_) => "INVALID_TRANSACTION_STATE",
            Self::ExecutionFailed { .. } => "EXECUTION_FAILED",
            Self::ProfileUnavailable(_) => "PROFILE_UNAVAILABLE",
            Self::Store(_) => "STORE_ERROR",
            Self::Ledger(err) => err.error_code(),
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Returns true if the client should retry the same request later.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::IdempotencyConflict(_) | Self::LockTimeout { .. } | Self::OptimisticConflict(_)
        )
    }

    /// The deny code, if this is a compliance refusal.
    #[must_use]
    pub const fn deny_code(&self) -> Option<DenyCode> {
        match self {
            Self::Compliance { code, .. } => Some(*code),
            _ => None,
        }
    }
}

impl From<AccountError> for WalletError {
    fn from(err: AccountError) -> Self {
        match err {
            AccountError::NonPositiveAmount(amount) => {
                Self::Validation(format!("amount must be positive, got {amount}"))
            }
            AccountError::InsufficientBalance {
                requested,
                available,
                ..
            } => Self::InsufficientBalance {
                requested,
                available,
            },
            AccountError::Frozen { until, .. } => Self::AccountFrozen { until },
            AccountError::VersionMismatch { .. } => Self::OptimisticConflict(err.to_string()),
            AccountError::InsufficientHeld { .. } | AccountError::InvariantViolation { .. } => {
                Self::Internal(err.to_string())
            }
        }
    }
}

impl From<StoreError> for WalletError {
    fn from(err: StoreError) -> Self {
        if err.is_conflict() {
            Self::OptimisticConflict(err.to_string())
        } else {
            Self::Store(err.to_string())
        }
    }
}

impl From<LockError> for WalletError {
    fn from(err: LockError) -> Self {
        match err {
            LockError::Timeout { key, waited_ms } => Self::LockTimeout { key, waited_ms },
            LockError::Backend(msg) => Self::Store(msg),
        }
    }
}

impl From<IdempotencyError> for WalletError {
    fn from(err: IdempotencyError) -> Self {
        match err {
            IdempotencyError::InvalidKey(msg) => {
                Self::Validation(format!("invalid idempotency key: {msg}"))
            }
            IdempotencyError::InFlight(key) => Self::IdempotencyConflict(key),
            IdempotencyError::Store(msg) => Self::Store(msg),
        }
    }
}

impl From<WorkflowError> for WalletError {
    fn from(err: WorkflowError) -> Self {
        Self::WorkflowState(err)
    }
}

impl From<InvalidTransition> for WalletError {
    fn from(err: InvalidTransition) -> Self {
        Self::TransactionState(err)
    }
}

impl From<LedgerError> for WalletError {
    fn from(err: LedgerError) -> Self {
        Self::Ledger(err)
    }
}

impl From<ProfileError> for WalletError {
    fn from(err: ProfileError) -> Self {
        let ProfileError::Unavailable(msg) = err;
        Self::ProfileUnavailable(msg)
    }
}
