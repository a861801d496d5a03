//! Compliance gate inputs and decisions.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use wagerly_shared::types::{Currency, Money};

use crate::profile::KycStatus;
use crate::transaction::OperationKind;
use crate::workflow::ApprovalType;

/// Stable machine-readable reason for a denial.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DenyCode {
    /// PLAY currency cannot be redeemed.
    CurrencyNotWithdrawable,
    /// Promotional currency is illegal in the player's state.
    StateRestricted,
    /// The player has an active self-exclusion.
    SelfExcluded,
    /// Below the configured minimum.
    AmountBelowMinimum,
    /// Above the configured maximum.
    AmountAboveMaximum,
    /// Today's running total would exceed the daily limit.
    DailyLimitExceeded,
    /// Identity verification needed first.
    KycRequired,
    /// The bet would push the session loss over the limit.
    SessionLimitExceeded,
    /// The player is younger than the minimum age.
    AgeRestricted,
}

impl DenyCode {
    /// Returns the string representation of the code.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CurrencyNotWithdrawable => "CURRENCY_NOT_WITHDRAWABLE",
            Self::StateRestricted => "STATE_RESTRICTED",
            Self::SelfExcluded => "SELF_EXCLUDED",
            Self::AmountBelowMinimum => "AMOUNT_BELOW_MINIMUM",
            Self::AmountAboveMaximum => "AMOUNT_ABOVE_MAXIMUM",
            Self::DailyLimitExceeded => "DAILY_LIMIT_EXCEEDED",
            Self::KycRequired => "KYC_REQUIRED",
            Self::SessionLimitExceeded => "SESSION_LIMIT_EXCEEDED",
            Self::AgeRestricted => "AGE_RESTRICTED",
        }
    }

    /// Parses a code from a string.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "CURRENCY_NOT_WITHDRAWABLE" => Some(Self::CurrencyNotWithdrawable),
            "STATE_RESTRICTED" => Some(Self::StateRestricted),
            "SELF_EXCLUDED" => Some(Self::SelfExcluded),
            "AMOUNT_BELOW_MINIMUM" => Some(Self::AmountBelowMinimum),
            "AMOUNT_ABOVE_MAXIMUM" => Some(Self::AmountAboveMaximum),
            "DAILY_LIMIT_EXCEEDED" => Some(Self::DailyLimitExceeded),
            "KYC_REQUIRED" => Some(Self::KycRequired),
            "SESSION_LIMIT_EXCEEDED" => Some(Self::SessionLimitExceeded),
            "AGE_RESTRICTED" => Some(Self::AgeRestricted),
            _ => None,
        }
    }
}

impl fmt::Display for DenyCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything the gate needs to judge one proposed operation.
#[derive(Debug, Clone, Copy)]
pub struct ComplianceCheck<'a> {
    /// Operation kind.
    pub kind: OperationKind,
    /// Currency of the account.
    pub currency: Currency,
    /// Unsigned amount.
    pub amount: Money,
    /// Player's verification status.
    pub kyc_status: KycStatus,
    /// Player's state code.
    pub jurisdiction: Option<&'a str>,
    /// End of any self-exclusion.
    pub self_excluded_until: Option<DateTime<Utc>>,
    /// Today's total for this kind, before the proposed amount.
    pub daily_total: Money,
    /// Current session loss in this currency.
    pub session_loss: Money,
    /// Evaluation instant.
    pub now: DateTime<Utc>,
}

/// Outcome of a compliance evaluation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// The operation may proceed.
    Allow,
    /// The operation is refused.
    Deny {
        /// Machine-readable reason.
        code: DenyCode,
        /// Human-readable explanation.
        message: String,
    },
    /// The operation must be signed off first.
    RequireApproval(ApprovalType),
}

impl Decision {
    pub(crate) fn deny(code: DenyCode, message: impl Into<String>) -> Self {
        Self::Deny {
            code,
            message: message.into(),
        }
    }

    /// Returns true for `Allow`.
    #[must_use]
    pub const fn is_allowed(&self) -> bool {
        matches!(self, Self::Allow)
    }

    /// The deny code, if this is a denial.
    #[must_use]
    pub const fn deny_code(&self) -> Option<DenyCode> {
        match self {
            Self::Deny { code, .. } => Some(*code),
            _ => None,
        }
    }
}
