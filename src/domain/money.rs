use crate::error::{CheckoutError, Result};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, Sub};

/// Number of fractional digits carried by every amount.
pub const SCALE: u32 = 2;

/// Represents a non-negative monetary amount with 2 decimal places.
///
/// This is a wrapper around `rust_decimal::Decimal` so that prices never go
/// through binary floating point. Derived quantities are rounded half-up with
/// [`Money::round_half_up`], once, at the point they are derived.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "Decimal", into = "Decimal")]
pub struct Money(Decimal);

impl Money {
    pub const ZERO: Self = Self(Decimal::ZERO);
    /// The smallest representable amount (0.01).
    pub const CENT: Self = Self(Decimal::from_parts(1, 0, 0, false, SCALE));

    /// Creates an amount, rejecting negatives and more than 2 fractional digits.
    pub fn new(value: Decimal) -> Result<Self> {
        if value.is_sign_negative() && !value.is_zero() {
            return Err(CheckoutError::InvalidAmount(value));
        }
        if value.normalize().scale() > SCALE {
            return Err(CheckoutError::InvalidAmount(value));
        }
        Ok(Self(value.round_dp(SCALE)))
    }

    /// Rounds an arbitrary non-negative quantity half-up to 2 decimal places.
    pub fn round_half_up(value: Decimal) -> Self {
        let rounded = value
            .max(Decimal::ZERO)
            .round_dp_with_strategy(SCALE, RoundingStrategy::MidpointAwayFromZero);
        Self(rounded)
    }

    pub fn value(&self) -> Decimal {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    /// Subtraction that stops at zero instead of going negative.
    pub fn saturating_sub(self, rhs: Self) -> Self {
        Self((self.0 - rhs.0).max(Decimal::ZERO))
    }
}

impl TryFrom<Decimal> for Money {
    type Error = CheckoutError;

    fn try_from(value: Decimal) -> Result<Self> {
        Self::new(value)
    }
}

impl From<Money> for Decimal {
    fn from(money: Money) -> Self {
        money.0
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2}", self.0)
    }
}

impl Add for Money {
    type Output = Self;
    fn add(self, rhs: Self) -> Self::Output {
        Self(self.0 + rhs.0)
    }
}

impl Sub for Money {
    type Output = Self;
    fn sub(self, rhs: Self) -> Self::Output {
        self.saturating_sub(rhs)
    }
}
