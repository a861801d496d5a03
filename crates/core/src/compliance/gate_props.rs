//! Property-based tests for ComplianceGate.

use chrono::{Duration, TimeZone, Utc};
use proptest::prelude::*;
use rstest::rstest;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use wagerly_shared::config::ComplianceConfig;
use wagerly_shared::types::{Currency, Money};

use crate::compliance::gate::ComplianceGate;
use crate::compliance::types::{ComplianceCheck, Decision, DenyCode};
use crate::profile::KycStatus;
use crate::transaction::OperationKind;
use crate::workflow::ApprovalType;

fn arb_kind() -> impl Strategy<Value = OperationKind> {
    prop_oneof![
        Just(OperationKind::Deposit),
        Just(OperationKind::Withdrawal),
        Just(OperationKind::Bet),
        Just(OperationKind::Win),
        Just(OperationKind::Bonus),
        Just(OperationKind::Adjustment),
    ]
}

fn arb_currency() -> impl Strategy<Value = Currency> {
    prop_oneof![Just(Currency::Play), Just(Currency::Promo)]
}

fn arb_kyc() -> impl Strategy<Value = KycStatus> {
    prop_oneof![
        Just(KycStatus::NotStarted),
        Just(KycStatus::InProgress),
        Just(KycStatus::PendingReview),
        Just(KycStatus::Verified),
        Just(KycStatus::Rejected),
    ]
}

fn arb_money(max: i64) -> impl Strategy<Value = Money> {
    (0i64..max).prop_map(|n| Money::normalize(Decimal::new(n, 4)))
}

fn arb_state() -> impl Strategy<Value = Option<&'static str>> {
    prop_oneof![Just(None), Just(Some("NJ")), Just(Some("WA")), Just(Some("id"))]
}

fn verified_withdrawal(amount: Decimal) -> ComplianceCheck<'static> {
    ComplianceCheck {
        kind: OperationKind::Withdrawal,
        currency: Currency::Promo,
        amount: Money::normalize(amount),
        kyc_status: KycStatus::Verified,
        jurisdiction: Some("NJ"),
        self_excluded_until: None,
        daily_total: Money::ZERO,
        session_loss: Money::ZERO,
        now: Utc.with_ymd_and_hms(2026, 10, 17, 12, 0, 0).unwrap(),
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    /// Identical checks always yield identical decisions.
    #[test]
    fn prop_evaluate_is_deterministic(
        kind in arb_kind(),
        currency in arb_currency(),
        amount in arb_money(200_000_000),
        kyc_status in arb_kyc(),
        jurisdiction in arb_state(),
        excluded_for in prop::option::of(-48i64..48),
        daily_total in arb_money(100_000_000),
        session_loss in arb_money(10_000_000),
    ) {
        let gate = ComplianceGate::new(ComplianceConfig::default());
        let now = Utc::now();
        let check = ComplianceCheck {
            kind,
            currency,
            amount,
            kyc_status,
            jurisdiction,
            self_excluded_until: excluded_for.map(|h| now + Duration::hours(h)),
            daily_total,
            session_loss,
            now,
        };
        let first = gate.evaluate(&check);
        let second = gate.evaluate(&check);
        prop_assert_eq!(first, second);
    }

    /// Approval is never requested for a kind that is not approval-gated.
    #[test]
    fn prop_ungated_kinds_never_require_approval(
        kind in prop_oneof![Just(OperationKind::Bet), Just(OperationKind::Win), Just(OperationKind::Bonus)],
        amount in arb_money(1_000_000_000),
    ) {
        let gate = ComplianceGate::new(ComplianceConfig::default());
        let check = ComplianceCheck {
            kind,
            currency: Currency::Play,
            amount,
            kyc_status: KycStatus::Verified,
            jurisdiction: None,
            self_excluded_until: None,
            daily_total: Money::ZERO,
            session_loss: Money::ZERO,
            now: Utc::now(),
        };
        prop_assert!(!matches!(gate.evaluate(&check), Decision::RequireApproval(_)));
    }

    /// An unverified player is refused every withdrawal at or above the KYC threshold.
    #[test]
    fn prop_unverified_large_withdrawals_need_kyc(
        units in 50i64..5_000i64,
        kyc_status in prop_oneof![Just(KycStatus::NotStarted), Just(KycStatus::Rejected)],
    ) {
        let gate = ComplianceGate::new(ComplianceConfig::default());
        let mut check = verified_withdrawal(Decimal::from(units));
        check.kyc_status = kyc_status;
        prop_assert_eq!(gate.evaluate(&check).deny_code(), Some(DenyCode::KycRequired));
    }
}

#[rstest]
#[case(dec!(499.9999), Decision::Allow)]
#[case(dec!(500), Decision::RequireApproval(ApprovalType::Dual))]
#[case(dec!(500.0001), Decision::RequireApproval(ApprovalType::Dual))]
fn test_dual_threshold_boundary(#[case] amount: Decimal, #[case] expected: Decision) {
    let gate = ComplianceGate::new(ComplianceConfig::default());
    assert_eq!(gate.evaluate(&verified_withdrawal(amount)), expected);
}

#[rstest]
#[case(dec!(9999.9999), Decision::RequireApproval(ApprovalType::Dual))]
#[case(dec!(10000), Decision::RequireApproval(ApprovalType::Triple))]
fn test_triple_threshold_boundary(#[case] amount: Decimal, #[case] expected: Decision) {
    let gate = ComplianceGate::new(ComplianceConfig::default());
    let check = ComplianceCheck {
        kind: OperationKind::Deposit,
        currency: Currency::Play,
        ..verified_withdrawal(amount)
    };
    assert_eq!(gate.evaluate(&check), expected);
}

// The KYC threshold coincides with the withdrawal minimum, so one unit
// below it is refused for the amount instead.
#[rstest]
#[case(dec!(49.9999), DenyCode::AmountBelowMinimum)]
#[case(dec!(50), DenyCode::KycRequired)]
fn test_kyc_threshold_boundary(#[case] amount: Decimal, #[case] expected: DenyCode) {
    let gate = ComplianceGate::new(ComplianceConfig::default());
    let mut check = verified_withdrawal(amount);
    check.kyc_status = KycStatus::InProgress;
    assert_eq!(gate.evaluate(&check).deny_code(), Some(expected));
}
