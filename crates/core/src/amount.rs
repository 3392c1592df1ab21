//! Amount - Non-negative integer amounts in the smallest currency unit
//!
//! Balances are held as lovelace (1 ADA = 1_000_000 lovelace). Decimal
//! values only appear at the edges: user input, display and multipliers.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Number of fractional digits in one whole coin.
pub const DECIMALS: u32 = 6;

/// Minor units per whole coin.
pub const UNIT: u64 = 1_000_000;

/// Errors that can occur when working with amounts
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AmountError {
    #[error("Amount cannot be negative: {0}")]
    NegativeAmount(Decimal),

    #[error("Amount has more than 6 decimal places: {0}")]
    TooPrecise(Decimal),

    #[error("Amount out of range: {0}")]
    Overflow(String),

    #[error("Invalid amount: {0}")]
    Parse(String),
}

/// A non-negative amount counted in minor units.
///
/// # Example
/// ```
/// use dicebank_core::Amount;
///
/// let stake: Amount = "2.5".parse().unwrap();
/// assert_eq!(stake.minor(), 2_500_000);
/// assert!("-1".parse::<Amount>().is_err());
/// ```
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Amount(u64);

impl Amount {
    /// Zero amount constant
    pub const ZERO: Self = Self(0);

    /// Create from minor units (lovelace)
    #[inline]
    pub const fn from_minor(minor: u64) -> Self {
        Self(minor)
    }

    /// Create from whole coins
    pub fn from_whole(whole: u64) -> Result<Self, AmountError> {
        whole
            .checked_mul(UNIT)
            .map(Self)
            .ok_or_else(|| AmountError::Overflow(format!("{whole} coins")))
    }

    /// Convert a decimal coin value, rejecting negatives and sub-lovelace precision.
    pub fn from_decimal(value: Decimal) -> Result<Self, AmountError> {
        if value.is_sign_negative() && !value.is_zero() {
            return Err(AmountError::NegativeAmount(value));
        }
        let scaled = value
            .checked_mul(Decimal::from(UNIT))
            .ok_or_else(|| AmountError::Overflow(value.to_string()))?;
        if !scaled.fract().is_zero() {
            return Err(AmountError::TooPrecise(value));
        }
        scaled
            .to_u64()
            .map(Self)
            .ok_or_else(|| AmountError::Overflow(value.to_string()))
    }

    /// Minor units
    #[inline]
    pub const fn minor(&self) -> u64 {
        self.0
    }

    /// Value in whole coins, always carrying six decimal places
    pub fn to_decimal(&self) -> Decimal {
        Decimal::from_i128_with_scale(i128::from(self.0), DECIMALS)
    }

    #[inline]
    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }

    pub fn checked_add(&self, other: Amount) -> Option<Amount> {
        self.0.checked_add(other.0).map(Amount)
    }

    /// Returns None if the result would be negative
    pub fn checked_sub(&self, other: Amount) -> Option<Amount> {
        self.0.checked_sub(other.0).map(Amount)
    }

    /// Multiply by a decimal factor, rounding down to whole minor units.
    ///
    /// Returns None for negative factors or overflow.
    pub fn mul_floor(&self, factor: Decimal) -> Option<Amount> {
        Decimal::from(self.0)
            .checked_mul(factor)?
            .floor()
            .to_u64()
            .map(Amount)
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_decimal())
    }
}

impl FromStr for Amount {
    type Err = AmountError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let value = Decimal::from_str(s.trim()).map_err(|e| AmountError::Parse(e.to_string()))?;
        Self::from_decimal(value)
    }
}

impl TryFrom<Decimal> for Amount {
    type Error = AmountError;

    fn try_from(value: Decimal) -> Result<Self, Self::Error> {
        Self::from_decimal(value)
    }
}

impl From<Amount> for Decimal {
    fn from(amount: Amount) -> Self {
        amount.to_decimal()
    }
}
