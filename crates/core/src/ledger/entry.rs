//! Ledger entry domain types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use wagerly_shared::types::{AccountId, Currency, LedgerEntryId, Money, TransactionId, UserId};

use crate::actor::Actor;
use crate::transaction::OperationKind;

/// An immutable record of one balance change.
///
/// Invariant: `balance_after == balance_before + amount`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    /// Unique, time-sortable identifier.
    pub id: LedgerEntryId,
    /// Account whose balance changed.
    pub account_id: AccountId,
    /// Account owner.
    pub user_id: UserId,
    /// Account currency.
    pub currency: Currency,
    /// Operation that caused the change.
    pub kind: OperationKind,
    /// Signed amount: positive for credit, negative for debit.
    pub amount: Money,
    /// Balance before the change.
    pub balance_before: Money,
    /// Balance after the change.
    pub balance_after: Money,
    /// Transaction that produced this entry.
    pub transaction_id: TransactionId,
    /// External correlation id (payment, game round, original transaction).
    pub reference_id: Option<String>,
    /// Who caused the change.
    pub actor: Actor,
    /// Human-readable reason.
    pub reason: String,
    /// Creation time.
    pub created_at: DateTime<Utc>,
}

impl LedgerEntry {
    /// Returns true if this entry added to the balance.
    #[must_use]
    pub fn is_credit(&self) -> bool {
        self.amount.is_positive()
    }
}

/// Half-open creation-time window `[from, to)`; `None` leaves a side unbounded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    /// Inclusive lower bound.
    pub from: Option<DateTime<Utc>>,
    /// Exclusive upper bound.
    pub to: Option<DateTime<Utc>>,
}

impl TimeRange {
    /// The unbounded range.
    #[must_use]
    pub const fn all() -> Self {
        Self {
            from: None,
            to: None,
        }
    }

    /// A bounded range.
    #[must_use]
    pub const fn between(from: DateTime<Utc>, to: DateTime<Utc>) -> Self {
        Self {
            from: Some(from),
            to: Some(to),
        }
    }

    /// Returns true if `at` falls inside the range.
    #[must_use]
    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        self.from.is_none_or(|from| at >= from) && self.to.is_none_or(|to| at < to)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_time_range_contains() {
        let now = Utc::now();
        let range = TimeRange::between(now, now + Duration::hours(1));
        assert!(range.contains(now));
        assert!(range.contains(now + Duration::minutes(59)));
        assert!(!range.contains(now + Duration::hours(1)));
        assert!(!range.contains(now - Duration::seconds(1)));
        assert!(TimeRange::all().contains(now));
    }
}
