//! The compliance gate.

use chrono::NaiveDate;
use tracing::debug;
use wagerly_shared::config::{ComplianceConfig, OperationRule};

use crate::compliance::age::whole_years_between;
use crate::compliance::types::{ComplianceCheck, Decision, DenyCode};
use crate::transaction::OperationKind;
use crate::workflow::ApprovalType;

/// Decides allow, deny or require-approval for a proposed operation.
///
/// Holds configuration only. `evaluate` reads nothing but its input, so
/// identical checks always produce identical decisions.
#[derive(Debug, Clone)]
pub struct ComplianceGate {
    config: ComplianceConfig,
}

impl ComplianceGate {
    /// Creates a gate over the given thresholds.
    #[must_use]
    pub const fn new(config: ComplianceConfig) -> Self {
        Self { config }
    }

    /// The thresholds in force.
    #[must_use]
    pub const fn config(&self) -> &ComplianceConfig {
        &self.config
    }

    /// The configured rule for `kind`. Reversals have none.
    #[must_use]
    pub fn rule_for(&self, kind: OperationKind) -> Option<&OperationRule> {
        match kind {
            OperationKind::Deposit => Some(&self.config.deposit),
            OperationKind::Withdrawal => Some(&self.config.withdrawal),
            OperationKind::Bet => Some(&self.config.bet),
            OperationKind::Win => Some(&self.config.win),
            OperationKind::Bonus => Some(&self.config.bonus),
            OperationKind::Adjustment => Some(&self.config.adjustment),
            OperationKind::Reversal => None,
        }
    }

    /// Evaluates the rules in precedence order; the first denial wins.
    #[must_use]
    pub fn evaluate(&self, check: &ComplianceCheck<'_>) -> Decision {
        let decision = self.decide(check);
        debug!(
            kind = %check.kind,
            currency = %check.currency,
            amount = %check.amount,
            decision = ?decision,
            "Compliance evaluated"
        );
        decision
    }

    fn decide(&self, check: &ComplianceCheck<'_>) -> Decision {
        if let Some(denied) = self.currency_legality(check) {
            return denied;
        }

        if matches!(check.kind, OperationKind::Bet | OperationKind::Withdrawal)
            && let Some(until) = check.self_excluded_until
            && until > check.now
        {
            return Decision::deny(
                DenyCode::SelfExcluded,
                format!("Self-excluded until {until}"),
            );
        }

        let Some(rule) = self.rule_for(check.kind) else {
            return Decision::Allow;
        };

        if let Some(min) = rule.min_amount
            && check.amount < min
        {
            return Decision::deny(
                DenyCode::AmountBelowMinimum,
                format!("Minimum {} amount is {min}", check.kind),
            );
        }
        if let Some(max) = rule.max_amount
            && check.amount > max
        {
            return Decision::deny(
                DenyCode::AmountAboveMaximum,
                format!("Maximum {} amount is {max}", check.kind),
            );
        }

        if let Some(limit) = rule.daily_limit
            && check.daily_total + check.amount > limit
        {
            return Decision::deny(
                DenyCode::DailyLimitExceeded,
                format!(
                    "Daily {} limit {limit} exceeded: {} already today",
                    check.kind, check.daily_total
                ),
            );
        }

        if check.kind == OperationKind::Withdrawal
            && check.amount >= self.config.kyc_withdrawal_threshold
            && !check.kyc_status.is_verified()
        {
            return Decision::deny(
                DenyCode::KycRequired,
                format!(
                    "Identity verification required for withdrawals of {} or more",
                    self.config.kyc_withdrawal_threshold
                ),
            );
        }

        if check.kind == OperationKind::Bet
            && check.session_loss + check.amount > self.config.session_loss_limit
        {
            return Decision::deny(
                DenyCode::SessionLimitExceeded,
                format!(
                    "Session loss limit {} would be exceeded",
                    self.config.session_loss_limit
                ),
            );
        }

        if rule.approval_gated {
            if check.amount >= self.config.triple_approval_threshold {
                return Decision::RequireApproval(ApprovalType::Triple);
            }
            if check.amount >= self.config.dual_approval_threshold {
                return Decision::RequireApproval(ApprovalType::Dual);
            }
        }

        Decision::Allow
    }

    fn currency_legality(&self, check: &ComplianceCheck<'_>) -> Option<Decision> {
        if check.kind == OperationKind::Withdrawal && !check.currency.is_withdrawable() {
            return Some(Decision::deny(
                DenyCode::CurrencyNotWithdrawable,
                format!("{} cannot be withdrawn", check.currency),
            ));
        }
        if check.currency.is_jurisdiction_restricted()
            && check.kind.is_player_facing()
            && let Some(state) = check.jurisdiction
            && self.config.is_restricted_jurisdiction(state)
        {
            return Some(Decision::deny(
                DenyCode::StateRestricted,
                format!("{} is not available in {}", check.currency, state.trim()),
            ));
        }
        None
    }

    /// Checks the player's age against the configured minimum.
    ///
    /// An unknown date of birth passes; verification happens elsewhere.
    #[must_use]
    pub fn check_age(&self, date_of_birth: Option<NaiveDate>, today: NaiveDate) -> Decision {
        match date_of_birth {
            Some(birth) if whole_years_between(birth, today) < self.config.minimum_age => {
                Decision::deny(
                    DenyCode::AgeRestricted,
                    format!("Players must be at least {}", self.config.minimum_age),
                )
            }
            _ => Decision::Allow,
        }
    }
}
