//! Property-based tests for AccountService.
//!
//! Random operation sequences are applied to one account while a parallel
//! list of ledger amounts is kept, the way the engine would append them.

use chrono::Utc;
use proptest::prelude::*;
use rust_decimal::Decimal;
use wagerly_shared::types::{Currency, Money, UserId};

use crate::account::error::AccountError;
use crate::account::service::AccountService;
use crate::account::types::Account;

#[derive(Debug, Clone, Copy)]
enum Op {
    Credit(Money),
    Debit(Money),
    Hold(Money),
    Release(Money),
    Confirm(Money),
}

/// Strategy for positive amounts with four decimal places.
fn arb_amount() -> impl Strategy<Value = Money> {
    (1i64..5_000_000i64).prop_map(|n| Money::normalize(Decimal::new(n, 4)))
}

fn arb_op() -> impl Strategy<Value = Op> {
    prop_oneof![
        arb_amount().prop_map(Op::Credit),
        arb_amount().prop_map(Op::Debit),
        arb_amount().prop_map(Op::Hold),
        arb_amount().prop_map(Op::Release),
        arb_amount().prop_map(Op::Confirm),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    /// Ledger sum equals balance and the balance split holds after every step.
    #[test]
    fn prop_conservation_and_non_negative(ops in prop::collection::vec(arb_op(), 1..60)) {
        let now = Utc::now();
        let mut account = Account::open(UserId::new(), Currency::Promo, now);
        let mut ledger: Vec<Money> = Vec::new();

        for op in ops {
            let version = account.version;
            let result = match op {
                Op::Credit(a) => AccountService::credit(&account, a, version, now).map(|n| (n, Some(a))),
                Op::Debit(a) => AccountService::debit(&account, a, version, now).map(|n| (n, Some(-a))),
                Op::Hold(a) => AccountService::hold(&account, a, version, now).map(|n| (n, None)),
                Op::Release(a) => AccountService::release(&account, a, version, now).map(|n| (n, None)),
                Op::Confirm(a) => AccountService::confirm_hold(&account, a, version, now).map(|n| (n, Some(-a))),
            };

            match result {
                Ok((next, entry)) => {
                    prop_assert_eq!(next.version, version + 1);
                    if let Some(amount) = entry {
                        ledger.push(amount);
                    }
                    account = next;
                }
                Err(AccountError::InsufficientBalance { requested, available, .. }) => {
                    prop_assert!(requested > available);
                }
                Err(AccountError::InsufficientHeld { requested, held, .. }) => {
                    prop_assert!(requested > held);
                }
                Err(other) => prop_assert!(false, "unexpected error: {other}"),
            }

            prop_assert!(!account.available.is_negative());
            prop_assert!(!account.held.is_negative());
            prop_assert_eq!(account.balance, account.available + account.held);
            prop_assert_eq!(ledger.iter().copied().sum::<Money>(), account.balance);
        }
    }

    /// A failed transition leaves the caller's account untouched.
    #[test]
    fn prop_rejected_debit_changes_nothing(balance in arb_amount(), extra in arb_amount()) {
        let now = Utc::now();
        let account = Account::open(UserId::new(), Currency::Play, now);
        let account = AccountService::credit(&account, balance, 0, now).unwrap();
        let snapshot = account.clone();

        let result = AccountService::debit(&account, balance + extra, 1, now);
        prop_assert!(
            matches!(result, Err(AccountError::InsufficientBalance { .. })),
            "expected InsufficientBalance"
        );
        prop_assert_eq!(account, snapshot);
    }
}
