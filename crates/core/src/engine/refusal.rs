//! Refusals recorded against idempotency keys.
//!
//! A request refused before anything was written still consumes its key: a
//! retry with the same key gets the same error back instead of being
//! evaluated again under different conditions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use wagerly_shared::types::{Currency, Money, UserId};

use crate::compliance::DenyCode;
use crate::engine::error::WalletError;
use crate::transaction::{Direction, OperationKind, WalletTransaction};

/// What a key was first used for. A replay must match it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestFingerprint {
    /// Player the request acted on.
    pub user_id: UserId,
    /// Operation kind.
    pub kind: OperationKind,
    /// Credit or debit.
    pub direction: Direction,
    /// Account currency.
    pub currency: Currency,
    /// Requested amount.
    pub amount: Money,
}

impl RequestFingerprint {
    /// The fingerprint of the request that produced `tx`.
    #[must_use]
    pub const fn of_transaction(tx: &WalletTransaction) -> Self {
        Self {
            user_id: tx.user_id,
            kind: tx.kind,
            direction: tx.direction,
            currency: tx.currency,
            amount: tx.amount,
        }
    }
}

/// A refusal as stored under its key, with the request it answered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordedRefusal {
    /// The refused request.
    pub request: RequestFingerprint,
    /// The refusal itself.
    pub refusal: Refusal,
}

/// The replayable subset of `WalletError`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Refusal {
    /// Compliance denial.
    Compliance {
        /// Deny code.
        code: DenyCode,
        /// Message shown to the player.
        message: String,
    },
    /// Not enough available balance.
    InsufficientBalance {
        /// Requested amount.
        requested: Money,
        /// Available balance at the time.
        available: Money,
    },
    /// Account frozen.
    AccountFrozen {
        /// Freeze expiry.
        until: DateTime<Utc>,
    },
    /// Business-rule validation failure.
    Validation {
        /// Explanation.
        message: String,
    },
    /// Missing referenced entity.
    NotFound {
        /// Explanation.
        message: String,
    },
}

impl Refusal {
    /// Extracts a refusal from `err`, or `None` for errors that must not
    /// consume the key (transient and infrastructure failures).
    #[must_use]
    pub fn from_error(err: &WalletError) -> Option<Self> {
        match err {
            WalletError::Compliance { code, message } => Some(Self::Compliance {
                code: *code,
                message: message.clone(),
            }),
            WalletError::InsufficientBalance {
                requested,
                available,
            } => Some(Self::InsufficientBalance {
                requested: *requested,
                available: *available,
            }),
            WalletError::AccountFrozen { until } => Some(Self::AccountFrozen { until: *until }),
            WalletError::Validation(message) => Some(Self::Validation {
                message: message.clone(),
            }),
            WalletError::NotFound(message) => Some(Self::NotFound {
                message: message.clone(),
            }),
            _ => None,
        }
    }

    /// Rebuilds the original error.
    #[must_use]
    pub fn into_error(self) -> WalletError {
        match self {
            Self::Compliance { code, message } => WalletError::Compliance { code, message },
            Self::InsufficientBalance {
                requested,
                available,
            } => WalletError::InsufficientBalance {
                requested,
                available,
            },
            Self::AccountFrozen { until } => WalletError::AccountFrozen { until },
            Self::Validation { message } => WalletError::Validation(message),
            Self::NotFound { message } => WalletError::NotFound(message),
        }
    }
}
