//! Account domain type.

use chrono::{DateTime, NaiveTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use wagerly_shared::types::{AccountId, Currency, Money, UserId};

/// A wallet account for one (user, currency) pair.
///
/// Invariant: `balance == available + held`, with `available >= 0` and `held >= 0`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    /// Unique identifier.
    pub id: AccountId,
    /// Owner.
    pub user_id: UserId,
    /// Currency held by this account.
    pub currency: Currency,
    /// Total balance.
    pub balance: Money,
    /// Spendable balance.
    pub available: Money,
    /// Funds reserved for pending withdrawals and workflows.
    pub held: Money,
    /// Sum of all bets.
    pub lifetime_wagered: Money,
    /// Sum of all wins.
    pub lifetime_won: Money,
    /// Deposits since `daily_reset_at`.
    pub daily_deposit_total: Money,
    /// Withdrawals since `daily_reset_at`.
    pub daily_withdrawal_total: Money,
    /// Start of the UTC day the daily totals belong to.
    pub daily_reset_at: DateTime<Utc>,
    /// Debits, credits and holds are refused until this instant.
    pub frozen_until: Option<DateTime<Utc>>,
    /// Why the account was frozen.
    pub freeze_reason: Option<String>,
    /// Optimistic concurrency version.
    pub version: i64,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last update time.
    pub updated_at: DateTime<Utc>,
}

impl Account {
    /// Creates an empty account at version 0.
    #[must_use]
    pub fn open(user_id: UserId, currency: Currency, now: DateTime<Utc>) -> Self {
        Self {
            id: AccountId::new(),
            user_id,
            currency,
            balance: Money::ZERO,
            available: Money::ZERO,
            held: Money::ZERO,
            lifetime_wagered: Money::ZERO,
            lifetime_won: Money::ZERO,
            daily_deposit_total: Money::ZERO,
            daily_withdrawal_total: Money::ZERO,
            daily_reset_at: start_of_day(now),
            frozen_until: None,
            freeze_reason: None,
            version: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Returns true if the account is frozen at `now`.
    #[must_use]
    pub fn is_frozen_at(&self, now: DateTime<Utc>) -> bool {
        self.frozen_until.is_some_and(|until| until > now)
    }

    /// Returns true if the daily totals belong to a day before `now`'s.
    #[must_use]
    pub fn daily_totals_stale(&self, now: DateTime<Utc>) -> bool {
        now.date_naive() > self.daily_reset_at.date_naive()
    }

    /// Returns true if the balance split holds.
    #[must_use]
    pub fn is_consistent(&self) -> bool {
        !self.available.is_negative()
            && !self.held.is_negative()
            && self.balance == self.available + self.held
    }
}

/// Midnight UTC of `now`'s day.
#[must_use]
pub fn start_of_day(now: DateTime<Utc>) -> DateTime<Utc> {
    Utc.from_utc_datetime(&now.date_naive().and_time(NaiveTime::MIN))
}

/// A freeze that never lapses on its own.
#[must_use]
pub fn indefinite_freeze() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(9999, 12, 31, 23, 59, 59)
        .single()
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_open_is_empty_and_consistent() {
        let now = Utc::now();
        let account = Account::open(UserId::new(), Currency::Play, now);
        assert!(account.balance.is_zero());
        assert_eq!(account.version, 0);
        assert!(account.is_consistent());
        assert!(!account.is_frozen_at(now));
        assert_eq!(account.daily_reset_at, start_of_day(now));
    }

    #[test]
    fn test_frozen_window() {
        let now = Utc::now();
        let mut account = Account::open(UserId::new(), Currency::Promo, now);
        account.frozen_until = Some(now + Duration::hours(1));
        assert!(account.is_frozen_at(now));
        assert!(!account.is_frozen_at(now + Duration::hours(2)));
    }

    #[test]
    fn test_daily_totals_stale_after_midnight() {
        let now = Utc.with_ymd_and_hms(2026, 3, 10, 23, 59, 0).unwrap();
        let account = Account::open(UserId::new(), Currency::Play, now);
        assert!(!account.daily_totals_stale(now));
        assert!(account.daily_totals_stale(now + Duration::minutes(2)));
    }

    #[test]
    fn test_indefinite_freeze_is_far_future() {
        assert!(indefinite_freeze() > Utc::now() + Duration::days(365 * 1000));
    }
}
