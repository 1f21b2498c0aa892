use super::money::Money;
use crate::error::{FieldErrors, Result};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DiscountType {
    Percentage,
    Fixed,
}

/// Why a coupon could not be applied. Checks run in declaration order and the
/// first failing one is reported.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RejectionReason {
    NotFound,
    Inactive,
    NotYetValid,
    Expired,
    UsageExceeded,
    BelowMinimum,
}

impl fmt::Display for RejectionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::NotFound => "coupon not found",
            Self::Inactive => "coupon is inactive",
            Self::NotYetValid => "coupon is not valid yet",
            Self::Expired => "coupon has expired",
            Self::UsageExceeded => "coupon usage limit reached",
            Self::BelowMinimum => "amount is below the coupon minimum",
        };
        f.write_str(text)
    }
}

/// Normalizes a user-typed coupon code to its stored form.
pub fn normalize_code(code: &str) -> String {
    code.trim().to_uppercase()
}

/// A discount coupon as kept by coupon storage.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
#[serde(rename_all = "camelCase")]
pub struct Coupon {
    /// Unique code, always uppercase.
    pub code: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub discount_type: DiscountType,
    pub discount_value: Decimal,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_amount: Option<Money>,
    /// Cap on the computed discount. Only meaningful for percentage coupons.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_discount: Option<Money>,
    pub valid_from: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub valid_until: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_uses: Option<u32>,
    #[serde(default)]
    pub current_uses: u32,
    pub is_active: bool,
}

impl Coupon {
    /// Builds a coupon from an administrative draft, enforcing the definition rules.
    pub fn from_draft(draft: CouponDraft, now: DateTime<Utc>) -> Result<Self> {
        draft.validate()?;
        let max_discount = match draft.discount_type {
            DiscountType::Percentage => draft.max_discount,
            DiscountType::Fixed => None,
        };
        Ok(Self {
            code: normalize_code(&draft.code),
            description: draft.description.filter(|d| !d.trim().is_empty()),
            discount_type: draft.discount_type,
            discount_value: draft.discount_value,
            min_amount: draft.min_amount,
            max_discount,
            valid_from: draft.valid_from.unwrap_or(now),
            valid_until: draft.valid_until,
            max_uses: draft.max_uses,
            current_uses: 0,
            is_active: draft.is_active,
        })
    }

    /// Runs the eligibility checks in order, returning the first failure.
    pub fn check_eligibility(
        &self,
        amount: Money,
        now: DateTime<Utc>,
    ) -> std::result::Result<(), RejectionReason> {
        if !self.is_active {
            return Err(RejectionReason::Inactive);
        }
        if now < self.valid_from {
            return Err(RejectionReason::NotYetValid);
        }
        if let Some(until) = self.valid_until
            && now > until
        {
            return Err(RejectionReason::Expired);
        }
        if self.is_exhausted() {
            return Err(RejectionReason::UsageExceeded);
        }
        if let Some(min) = self.min_amount
            && amount < min
        {
            return Err(RejectionReason::BelowMinimum);
        }
        Ok(())
    }

    /// Discount this coupon grants on `amount`. Never exceeds `amount`.
    pub fn discount_for(&self, amount: Money) -> Money {
        let discount = match self.discount_type {
            DiscountType::Percentage => {
                let raw = Money::round_half_up(
                    amount.value() * self.discount_value / Decimal::ONE_HUNDRED,
                );
                match self.max_discount {
                    Some(cap) => raw.min(cap),
                    None => raw,
                }
            }
            DiscountType::Fixed => Money::round_half_up(self.discount_value),
        };
        discount.min(amount)
    }

    pub fn is_exhausted(&self) -> bool {
        self.max_uses.is_some_and(|max| self.current_uses >= max)
    }
}

/// Coupon fields supplied by an operator when creating or replacing a coupon.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
#[serde(rename_all = "camelCase")]
pub struct CouponDraft {
    pub code: String,
    #[serde(default)]
    pub description: Option<String>,
    pub discount_type: DiscountType,
    pub discount_value: Decimal,
    #[serde(default)]
    pub min_amount: Option<Money>,
    #[serde(default)]
    pub max_discount: Option<Money>,
    #[serde(default)]
    pub valid_from: Option<DateTime<Utc>>,
    #[serde(default)]
    pub valid_until: Option<DateTime<Utc>>,
    #[serde(default)]
    pub max_uses: Option<u32>,
    #[serde(default = "default_active")]
    pub is_active: bool,
}

fn default_active() -> bool {
    true
}

impl CouponDraft {
    pub fn validate(&self) -> Result<()> {
        let mut errors = FieldErrors::default();

        if self.code.trim().chars().count() < 3 {
            errors.push("code", "must have at least 3 characters");
        }
        if self.discount_value <= Decimal::ZERO {
            errors.push("discountValue", "must be greater than zero");
        } else if self.discount_type == DiscountType::Percentage
            && self.discount_value > Decimal::ONE_HUNDRED
        {
            errors.push("discountValue", "percentage cannot exceed 100");
        }
        if let (Some(from), Some(until)) = (self.valid_from, self.valid_until)
            && until <= from
        {
            errors.push("validUntil", "must be after validFrom");
        }
        if self.max_uses == Some(0) {
            errors.push("maxUses", "must be greater than zero");
        }

        errors.into_result()
    }
}
