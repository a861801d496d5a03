//! Inputs to wallet operations.

use serde::{Deserialize, Serialize};
use wagerly_shared::types::{Currency, Money, TransactionId, UserId};

/// Purchase of currency, confirmed by the payment processor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepositRequest {
    /// Credited player.
    pub user_id: UserId,
    /// Credited currency; purchases are play currency.
    pub currency: Currency,
    /// Purchase amount.
    pub amount: Money,
    /// Processor payment reference.
    pub payment_reference: String,
    /// Client idempotency key.
    pub idempotency_key: String,
}

impl DepositRequest {
    /// A play-currency deposit.
    #[must_use]
    pub fn new(
        user_id: UserId,
        amount: Money,
        payment_reference: impl Into<String>,
        idempotency_key: impl Into<String>,
    ) -> Self {
        Self {
            user_id,
            currency: Currency::Play,
            amount,
            payment_reference: payment_reference.into(),
            idempotency_key: idempotency_key.into(),
        }
    }

    /// Overrides the currency.
    #[must_use]
    pub fn in_currency(mut self, currency: Currency) -> Self {
        self.currency = currency;
        self
    }
}

/// Promotional credit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BonusRequest {
    /// Credited player.
    pub user_id: UserId,
    /// Credited currency.
    pub currency: Currency,
    /// Bonus amount.
    pub amount: Money,
    /// Promotion identifier.
    pub promotion_reference: String,
    /// Why the bonus was granted.
    pub reason: String,
    /// Client key; derived from the user and promotion when absent.
    pub idempotency_key: Option<String>,
}

impl BonusRequest {
    /// The key this bonus is deduplicated by.
    ///
    /// Without a client key, one bonus per user per promotion.
    #[must_use]
    pub fn effective_key(&self) -> String {
        self.idempotency_key.clone().unwrap_or_else(|| {
            format!("bonus-{}-{}", self.user_id, self.promotion_reference)
        })
    }
}

/// Stake on a game round.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BetRequest {
    /// Betting player.
    pub user_id: UserId,
    /// Staked currency.
    pub currency: Currency,
    /// Stake.
    pub amount: Money,
    /// Game round reference.
    pub game_reference: String,
    /// Client idempotency key.
    pub idempotency_key: String,
}

/// Payout of a game round.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WinRequest {
    /// Winning player.
    pub user_id: UserId,
    /// Paid currency; must match the linked bet's.
    pub currency: Currency,
    /// Payout.
    pub amount: Money,
    /// Game round reference.
    pub game_reference: String,
    /// The completed bet this win settles.
    pub linked_bet_id: Option<TransactionId>,
    /// Client idempotency key.
    pub idempotency_key: String,
}

/// Redemption of promotional currency.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WithdrawalRequest {
    /// Redeeming player.
    pub user_id: UserId,
    /// Debited currency; only promotional currency is withdrawable.
    pub currency: Currency,
    /// Amount.
    pub amount: Money,
    /// Payout method (bank, card, ...).
    pub payment_method: String,
    /// Client idempotency key.
    pub idempotency_key: String,
}

impl WithdrawalRequest {
    /// A promotional-currency withdrawal.
    #[must_use]
    pub fn new(
        user_id: UserId,
        amount: Money,
        payment_method: impl Into<String>,
        idempotency_key: impl Into<String>,
    ) -> Self {
        Self {
            user_id,
            currency: Currency::Promo,
            amount,
            payment_method: payment_method.into(),
            idempotency_key: idempotency_key.into(),
        }
    }

    /// Overrides the currency.
    #[must_use]
    pub fn in_currency(mut self, currency: Currency) -> Self {
        self.currency = currency;
        self
    }
}

/// Manual back-office correction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdjustmentRequest {
    /// Adjusted player.
    pub user_id: UserId,
    /// Adjusted currency.
    pub currency: Currency,
    /// Signed amount: positive credits, negative debits.
    pub amount: Money,
    /// Why the correction is needed.
    pub reason: String,
    /// Client idempotency key.
    pub idempotency_key: String,
}

/// Reversal of a completed transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReversalRequest {
    /// The transaction to undo.
    pub transaction_id: TransactionId,
    /// Why it is being reversed.
    pub reason: String,
    /// Client idempotency key.
    pub idempotency_key: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_bonus_key_is_derived_per_promotion() {
        let user_id = UserId::new();
        let bonus = BonusRequest {
            user_id,
            currency: Currency::Promo,
            amount: Money::normalize(dec!(100)),
            promotion_reference: "welcome-2026".to_string(),
            reason: "welcome offer".to_string(),
            idempotency_key: None,
        };
        assert_eq!(bonus.effective_key(), format!("bonus-{user_id}-welcome-2026"));

        let keyed = BonusRequest {
            idempotency_key: Some("bonus-client-key-0001".to_string()),
            ..bonus
        };
        assert_eq!(keyed.effective_key(), "bonus-client-key-0001");
    }

    #[test]
    fn test_default_currencies() {
        let user_id = UserId::new();
        let amount = Money::normalize(dec!(20));
        assert_eq!(
            DepositRequest::new(user_id, amount, "pay_1", "deposit-key-000000001").currency,
            Currency::Play
        );
        assert_eq!(
            WithdrawalRequest::new(user_id, amount, "bank", "withdraw-key-00000001").currency,
            Currency::Promo
        );
    }
}
