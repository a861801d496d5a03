//! Property-based tests for LedgerService.

use chrono::Utc;
use proptest::prelude::*;
use rust_decimal::Decimal;
use wagerly_shared::types::{Currency, Money, UserId};

use crate::account::{Account, AccountService};
use crate::actor::Actor;
use crate::ledger::service::LedgerService;
use crate::transaction::{Direction, NewTransaction, OperationKind, WalletTransaction};

/// Strategy for signed, non-zero balance changes.
fn balance_change_strategy() -> impl Strategy<Value = Money> {
    prop_oneof![
        (1i64..1_000_000i64).prop_map(|n| Money::normalize(Decimal::new(n, 4))),
        (1i64..1_000_000i64).prop_map(|n| Money::normalize(Decimal::new(-n, 4))),
    ]
}

fn transaction(account: &Account, change: Money) -> WalletTransaction {
    let (kind, direction) = if change.is_positive() {
        (OperationKind::Win, Direction::Credit)
    } else {
        (OperationKind::Bet, Direction::Debit)
    };
    WalletTransaction::pending(
        NewTransaction {
            user_id: account.user_id,
            account_id: account.id,
            currency: account.currency,
            kind,
            direction,
            amount: change.abs(),
            idempotency_key: None,
            reference: None,
            description: None,
            actor: Actor::System,
            linked_transaction_id: None,
        },
        Utc::now(),
    )
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    /// Entries built for accepted changes always chain and reconcile.
    #[test]
    fn prop_entries_chain_and_reconcile(changes in prop::collection::vec(balance_change_strategy(), 1..80)) {
        let now = Utc::now();
        let mut account = Account::open(UserId::new(), Currency::Promo, now);
        let mut entries = Vec::new();

        for change in changes {
            let tx = transaction(&account, change);
            let next = if change.is_positive() {
                AccountService::credit(&account, change, account.version, now)
            } else {
                AccountService::debit(&account, change.abs(), account.version, now)
            };
            let Ok(next) = next else { continue };

            let entry = LedgerService::build_entry(&tx, &account, &next, "prop", now).unwrap();
            prop_assert_eq!(entry.balance_before + entry.amount, entry.balance_after);
            entries.push(entry);
            account = next;
        }

        prop_assert!(LedgerService::verify_chain(account.id, &entries).is_ok());
        let reconciliation = LedgerService::reconcile(&account, LedgerService::sum(&entries));
        prop_assert!(reconciliation.balanced);
        prop_assert!(reconciliation.difference.is_zero());
    }

    /// Any nonzero drift is reported with the exact difference.
    #[test]
    fn prop_drift_is_reported(change in balance_change_strategy()) {
        let now = Utc::now();
        let account = Account::open(UserId::new(), Currency::Play, now);
        let account = AccountService::credit(&account, Money::normalize(Decimal::new(500, 0)), 0, now).unwrap();
        let reconciliation = LedgerService::reconcile(&account, account.balance + change);
        prop_assert!(!reconciliation.balanced);
        prop_assert_eq!(reconciliation.difference, -change);
    }
}
