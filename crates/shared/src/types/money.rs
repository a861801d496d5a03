//! Fixed-point money and the dual wallet currencies.
//!
//! CRITICAL: Never use floating-point for money calculations.
//! Every `Money` value carries exactly four fractional digits and every
//! arithmetic boundary re-rounds half-up (midpoint away from zero).

use std::cmp::Ordering;
use std::fmt;
use std::iter::Sum;
use std::ops::{Add, Neg, Sub};
use std::str::FromStr;

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Number of fractional digits carried by every monetary value.
pub const MONEY_SCALE: u32 = 4;

/// Intermediate scale used by percentage calculations before normalizing.
const PERCENTAGE_SCALE: u32 = 6;

const ROUNDING: RoundingStrategy = RoundingStrategy::MidpointAwayFromZero;

/// Errors produced by money parsing and arithmetic.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MoneyError {
    /// Input could not be parsed as a finite decimal amount.
    #[error("Invalid monetary amount: {0}")]
    Malformed(String),

    /// Division by a zero divisor.
    #[error("Division by zero")]
    DivisionByZero,

    /// Result does not fit the decimal range.
    #[error("Monetary arithmetic overflow")]
    Overflow,
}

/// A monetary amount normalized to four decimal places.
///
/// Equality and ordering are exact comparisons of the scaled value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "Decimal", into = "Decimal")]
pub struct Money(Decimal);

impl Money {
    /// Zero at money scale.
    pub const ZERO: Self = Self(Decimal::from_parts(0, 0, 0, false, MONEY_SCALE));

    /// Rounds an arbitrary decimal to money scale.
    #[must_use]
    pub fn normalize(value: Decimal) -> Self {
        let mut rounded = value.round_dp_with_strategy(MONEY_SCALE, ROUNDING);
        rounded.rescale(MONEY_SCALE);
        Self(rounded)
    }

    /// Parses a decimal string such as `"100.5"` into money.
    ///
    /// Non-numeric input (including `NaN` and `inf`) is rejected.
    pub fn parse(input: &str) -> Result<Self, MoneyError> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(MoneyError::Malformed(input.to_string()));
        }
        Decimal::from_str(trimmed)
            .map(Self::normalize)
            .map_err(|_| MoneyError::Malformed(input.to_string()))
    }

    /// Builds money from a count of ten-thousandths (`12_345` is `1.2345`).
    #[must_use]
    pub fn from_minor_units(units: i64) -> Self {
        Self(Decimal::new(units, MONEY_SCALE))
    }

    /// Returns the underlying decimal, always at money scale.
    #[must_use]
    pub const fn amount(self) -> Decimal {
        self.0
    }

    /// Adds two amounts, failing instead of overflowing.
    pub fn checked_add(self, other: Self) -> Result<Self, MoneyError> {
        self.0
            .checked_add(other.0)
            .map(Self::normalize)
            .ok_or(MoneyError::Overflow)
    }

    /// Subtracts `other`, failing instead of overflowing.
    pub fn checked_sub(self, other: Self) -> Result<Self, MoneyError> {
        self.0
            .checked_sub(other.0)
            .map(Self::normalize)
            .ok_or(MoneyError::Overflow)
    }

    /// Multiplies by a factor and re-rounds.
    pub fn multiply(self, factor: Decimal) -> Result<Self, MoneyError> {
        self.0
            .checked_mul(factor)
            .map(Self::normalize)
            .ok_or(MoneyError::Overflow)
    }

    /// Divides by a money amount or a plain factor and re-rounds.
    pub fn divide(self, divisor: impl Into<Decimal>) -> Result<Self, MoneyError> {
        let divisor = divisor.into();
        if divisor.is_zero() {
            return Err(MoneyError::DivisionByZero);
        }
        self.0
            .checked_div(divisor)
            .map(Self::normalize)
            .ok_or(MoneyError::Overflow)
    }

    /// Computes `rate` percent of this amount (`rate = 5` is five percent).
    pub fn percentage(self, rate: Decimal) -> Result<Self, MoneyError> {
        let scaled = self
            .0
            .checked_mul(rate)
            .and_then(|v| v.checked_div(Decimal::ONE_HUNDRED))
            .ok_or(MoneyError::Overflow)?;
        Ok(Self::normalize(
            scaled.round_dp_with_strategy(PERCENTAGE_SCALE, ROUNDING),
        ))
    }

    /// Exact three-way comparison.
    #[must_use]
    pub fn compare(self, other: Self) -> Ordering {
        self.cmp(&other)
    }

    /// Returns true if the amount is exactly zero.
    #[must_use]
    pub fn is_zero(self) -> bool {
        self.0.is_zero()
    }

    /// Returns true if the amount is strictly greater than zero.
    #[must_use]
    pub fn is_positive(self) -> bool {
        self.0 > Decimal::ZERO
    }

    /// Returns true if the amount is strictly below zero.
    #[must_use]
    pub fn is_negative(self) -> bool {
        self.0 < Decimal::ZERO
    }

    /// Absolute value.
    #[must_use]
    pub fn abs(self) -> Self {
        Self(self.0.abs())
    }

    /// Returns true if `min <= self <= max`.
    #[must_use]
    pub fn is_within(self, min: Self, max: Self) -> bool {
        self >= min && self <= max
    }
}

impl Default for Money {
    fn default() -> Self {
        Self::ZERO
    }
}

impl From<Decimal> for Money {
    fn from(value: Decimal) -> Self {
        Self::normalize(value)
    }
}

impl From<Money> for Decimal {
    fn from(value: Money) -> Self {
        value.0
    }
}

impl FromStr for Money {
    type Err = MoneyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.4}", self.0)
    }
}

// Operators follow `Decimal` semantics and panic on overflow; use the
// `checked_*` methods where inputs are not already bounded by configuration.
impl Add for Money {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self::normalize(self.0 + rhs.0)
    }
}

impl Sub for Money {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self {
        Self::normalize(self.0 - rhs.0)
    }
}

impl Neg for Money {
    type Output = Self;

    fn neg(self) -> Self {
        if self.is_zero() {
            return Self::ZERO;
        }
        Self(-self.0)
    }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::ZERO, |acc, m| acc + m)
    }
}

impl<'a> Sum<&'a Money> for Money {
    fn sum<I: Iterator<Item = &'a Self>>(iter: I) -> Self {
        iter.copied().sum()
    }
}

/// The two wallet currencies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Currency {
    /// Purchased play currency ("Gold"); never redeemable.
    #[serde(alias = "GOLD")]
    Play,
    /// Promotional currency ("Sweeps"); redeemable after KYC.
    #[serde(alias = "SWEEPS")]
    Promo,
}

impl Currency {
    /// Both currencies, in a stable order.
    pub const ALL: [Self; 2] = [Self::Play, Self::Promo];

    /// Whether balances in this currency can ever be withdrawn.
    #[must_use]
    pub const fn is_withdrawable(self) -> bool {
        matches!(self, Self::Promo)
    }

    /// Whether this currency is subject to jurisdiction restrictions.
    #[must_use]
    pub const fn is_jurisdiction_restricted(self) -> bool {
        matches!(self, Self::Promo)
    }

    /// Canonical storage code.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Play => "PLAY",
            Self::Promo => "PROMO",
        }
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Currency {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "PLAY" | "GOLD" => Ok(Self::Play),
            "PROMO" | "SWEEPS" => Ok(Self::Promo),
            _ => Err(format!("Unknown currency: {s}")),
        }
    }
}
