//! Account balance transitions.

use chrono::{DateTime, Utc};
use wagerly_shared::types::Money;

use crate::account::error::AccountError;
use crate::account::types::{Account, start_of_day};
use crate::transaction::OperationKind;

/// Stateless service for account transitions.
///
/// Every transition checks `expected_version` against the account it is
/// given, validates the amount, and returns the next state with the
/// version incremented. Nothing is persisted here.
pub struct AccountService;

impl AccountService {
    /// Adds `amount` to the balance and the available balance.
    pub fn credit(
        account: &Account,
        amount: Money,
        expected_version: i64,
        now: DateTime<Utc>,
    ) -> Result<Account, AccountError> {
        Self::precheck(account, amount, expected_version)?;
        Self::ensure_not_frozen(account, now)?;

        let mut next = account.clone();
        next.balance = account.balance.checked_add(amount).map_err(|_| overflow(account))?;
        next.available = account
            .available
            .checked_add(amount)
            .map_err(|_| overflow(account))?;
        Self::finish(next, now)
    }

    /// Removes `amount` from the balance and the available balance.
    pub fn debit(
        account: &Account,
        amount: Money,
        expected_version: i64,
        now: DateTime<Utc>,
    ) -> Result<Account, AccountError> {
        Self::precheck(account, amount, expected_version)?;
        Self::ensure_not_frozen(account, now)?;
        Self::ensure_available(account, amount)?;

        let mut next = account.clone();
        next.balance = account.balance - amount;
        next.available = account.available - amount;
        Self::finish(next, now)
    }

    /// Moves `amount` from available to held; the total balance is unchanged.
    pub fn hold(
        account: &Account,
        amount: Money,
        expected_version: i64,
        now: DateTime<Utc>,
    ) -> Result<Account, AccountError> {
        Self::precheck(account, amount, expected_version)?;
        Self::ensure_not_frozen(account, now)?;
        Self::ensure_available(account, amount)?;

        let mut next = account.clone();
        next.available = account.available - amount;
        next.held = account.held + amount;
        Self::finish(next, now)
    }

    /// Returns held funds to available. Allowed on frozen accounts.
    pub fn release(
        account: &Account,
        amount: Money,
        expected_version: i64,
        now: DateTime<Utc>,
    ) -> Result<Account, AccountError> {
        Self::precheck(account, amount, expected_version)?;
        Self::ensure_held(account, amount)?;

        let mut next = account.clone();
        next.available = account.available + amount;
        next.held = account.held - amount;
        Self::finish(next, now)
    }

    /// Converts held funds into an actual debit.
    pub fn confirm_hold(
        account: &Account,
        amount: Money,
        expected_version: i64,
        now: DateTime<Utc>,
    ) -> Result<Account, AccountError> {
        Self::precheck(account, amount, expected_version)?;
        Self::ensure_not_frozen(account, now)?;
        Self::ensure_held(account, amount)?;

        let mut next = account.clone();
        next.balance = account.balance - amount;
        next.held = account.held - amount;
        Self::finish(next, now)
    }

    /// Freezes the account until `until`.
    pub fn freeze(
        account: &Account,
        until: DateTime<Utc>,
        reason: &str,
        expected_version: i64,
        now: DateTime<Utc>,
    ) -> Result<Account, AccountError> {
        Self::check_version(account, expected_version)?;
        let mut next = account.clone();
        next.frozen_until = Some(until);
        next.freeze_reason = Some(reason.to_string());
        Self::finish(next, now)
    }

    /// Lifts any freeze.
    pub fn unfreeze(
        account: &Account,
        expected_version: i64,
        now: DateTime<Utc>,
    ) -> Result<Account, AccountError> {
        Self::check_version(account, expected_version)?;
        let mut next = account.clone();
        next.frozen_until = None;
        next.freeze_reason = None;
        Self::finish(next, now)
    }

    /// Zeroes the daily totals and starts a new day, as a versioned write.
    pub fn reset_daily_totals(
        account: &Account,
        expected_version: i64,
        now: DateTime<Utc>,
    ) -> Result<Account, AccountError> {
        Self::check_version(account, expected_version)?;
        let mut next = Self::current_day_view(account, now);
        next.daily_deposit_total = Money::ZERO;
        next.daily_withdrawal_total = Money::ZERO;
        next.daily_reset_at = start_of_day(now);
        Self::finish(next, now)
    }

    /// The account as seen today: stale daily totals read as zero.
    ///
    /// The version is untouched; the rolled totals are persisted by the next
    /// transition that commits.
    #[must_use]
    pub fn current_day_view(account: &Account, now: DateTime<Utc>) -> Account {
        if !account.daily_totals_stale(now) {
            return account.clone();
        }
        let mut view = account.clone();
        view.daily_deposit_total = Money::ZERO;
        view.daily_withdrawal_total = Money::ZERO;
        view.daily_reset_at = start_of_day(now);
        view
    }

    /// Folds a completed operation into the daily and lifetime counters.
    #[must_use]
    pub fn record_activity(account: Account, kind: OperationKind, amount: Money) -> Account {
        Self::record_lifetime(Self::record_daily(account, kind, amount), kind, amount)
    }

    /// Adds `amount` to the daily total `kind` is limited by, if any.
    #[must_use]
    pub fn record_daily(mut account: Account, kind: OperationKind, amount: Money) -> Account {
        if let Some(total) = daily_total_mut(&mut account, kind) {
            *total = *total + amount;
        }
        account
    }

    /// Adds `amount` to the lifetime wagered or won counter.
    #[must_use]
    pub fn record_lifetime(mut account: Account, kind: OperationKind, amount: Money) -> Account {
        match kind {
            OperationKind::Bet => account.lifetime_wagered = account.lifetime_wagered + amount,
            OperationKind::Win => account.lifetime_won = account.lifetime_won + amount,
            _ => {}
        }
        account
    }

    /// Takes back a parked amount counted by `record_daily` on `requested_at`.
    ///
    /// Amounts counted on an earlier day have already rolled away. The total
    /// never drops below zero.
    #[must_use]
    pub fn unrecord_daily(
        account: Account,
        kind: OperationKind,
        amount: Money,
        requested_at: DateTime<Utc>,
    ) -> Account {
        if account.daily_reset_at.date_naive() != requested_at.date_naive() {
            return account;
        }
        let mut account = account;
        if let Some(total) = daily_total_mut(&mut account, kind) {
            *total = if *total > amount { *total - amount } else { Money::ZERO };
        }
        account
    }

    /// Counts a parked amount toward today's limit, as a versioned write.
    /// No money moves.
    pub fn reserve_daily_allowance(
        account: &Account,
        kind: OperationKind,
        amount: Money,
        expected_version: i64,
        now: DateTime<Utc>,
    ) -> Result<Account, AccountError> {
        Self::precheck(account, amount, expected_version)?;
        let next = Self::record_daily(Self::current_day_view(account, now), kind, amount);
        Self::finish(next, now)
    }

    /// Returns a parked amount's share of the daily limit, as a versioned
    /// write. See `unrecord_daily`.
    pub fn release_daily_allowance(
        account: &Account,
        kind: OperationKind,
        amount: Money,
        requested_at: DateTime<Utc>,
        expected_version: i64,
        now: DateTime<Utc>,
    ) -> Result<Account, AccountError> {
        Self::precheck(account, amount, expected_version)?;
        let view = Self::current_day_view(account, now);
        Self::finish(Self::unrecord_daily(view, kind, amount, requested_at), now)
    }

    /// Whether `kind` is limited by a daily total.
    #[must_use]
    pub const fn has_daily_limit(kind: OperationKind) -> bool {
        matches!(kind, OperationKind::Deposit | OperationKind::Withdrawal)
    }

    /// Verifies the balance split.
    pub fn check_invariants(account: &Account) -> Result<(), AccountError> {
        if account.is_consistent() {
            Ok(())
        } else {
            Err(AccountError::InvariantViolation {
                account_id: account.id,
                balance: account.balance,
                available: account.available,
                held: account.held,
            })
        }
    }

    fn precheck(account: &Account, amount: Money, expected_version: i64) -> Result<(), AccountError> {
        Self::check_version(account, expected_version)?;
        if !amount.is_positive() {
            return Err(AccountError::NonPositiveAmount(amount));
        }
        Ok(())
    }

    fn check_version(account: &Account, expected_version: i64) -> Result<(), AccountError> {
        if account.version == expected_version {
            Ok(())
        } else {
            Err(AccountError::VersionMismatch {
                account_id: account.id,
                expected: expected_version,
                actual: account.version,
            })
        }
    }

    fn ensure_not_frozen(account: &Account, now: DateTime<Utc>) -> Result<(), AccountError> {
        match account.frozen_until {
            Some(until) if until > now => Err(AccountError::Frozen {
                account_id: account.id,
                until,
            }),
            _ => Ok(()),
        }
    }

    fn ensure_available(account: &Account, amount: Money) -> Result<(), AccountError> {
        if amount > account.available {
            return Err(AccountError::InsufficientBalance {
                account_id: account.id,
                requested: amount,
                available: account.available,
            });
        }
        Ok(())
    }

    fn ensure_held(account: &Account, amount: Money) -> Result<(), AccountError> {
        if amount > account.held {
            return Err(AccountError::InsufficientHeld {
                account_id: account.id,
                requested: amount,
                held: account.held,
            });
        }
        Ok(())
    }

    fn finish(mut next: Account, now: DateTime<Utc>) -> Result<Account, AccountError> {
        next.version += 1;
        next.updated_at = now;
        Self::check_invariants(&next)?;
        Ok(next)
    }
}

fn daily_total_mut(account: &mut Account, kind: OperationKind) -> Option<&mut Money> {
    match kind {
        OperationKind::Deposit => Some(&mut account.daily_deposit_total),
        OperationKind::Withdrawal => Some(&mut account.daily_withdrawal_total),
        _ => None,
    }
}

fn overflow(account: &Account) -> AccountError {
    AccountError::InvariantViolation {
        account_id: account.id,
        balance: account.balance,
        available: account.available,
        held: account.held,
    }
}
