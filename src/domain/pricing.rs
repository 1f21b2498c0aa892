//! Price computation for a checkout.
//!
//! Pure functions only: no storage, no clock. Given a base amount, a payment
//! method and optionally an accepted coupon discount, derives the discount, the
//! final amount and the installment breakdown.

use super::money::{Money, SCALE};
use super::payment::PaymentMethod;
use crate::error::{CheckoutError, FieldErrors, Result};
use rust_decimal::{Decimal, RoundingStrategy};
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

pub const MAX_INSTALLMENTS: u32 = 12;

/// Which discount ended up in the price.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DiscountSource {
    None,
    PaymentMethod,
    Coupon,
}

/// Tunables of the pricing rules.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PricingPolicy {
    /// Share of the base amount taken off for PIX payments (0.15 = 15%).
    pub pix_discount_rate: Decimal,
    pub max_installments: u32,
}

impl PricingPolicy {
    /// Installment cap actually enforced. Never above [`MAX_INSTALLMENTS`].
    pub fn installment_cap(&self) -> u32 {
        self.max_installments.clamp(1, MAX_INSTALLMENTS)
    }

    pub fn validate(&self) -> Result<()> {
        let mut errors = FieldErrors::default();
        if !(1..=MAX_INSTALLMENTS).contains(&self.max_installments) {
            errors.push(
                "maxInstallments",
                format!("must be between 1 and {MAX_INSTALLMENTS}"),
            );
        }
        if self.pix_discount_rate.is_sign_negative() || self.pix_discount_rate >= Decimal::ONE {
            errors.push("pixDiscountRate", "must be at least 0 and below 1");
        }
        errors.into_result()
    }
}

impl Default for PricingPolicy {
    fn default() -> Self {
        Self {
            pix_discount_rate: dec!(0.15),
            max_installments: MAX_INSTALLMENTS,
        }
    }
}

/// Split of the final amount into installments.
///
/// Every installment but the last equals `installment_value`; the last one
/// absorbs the rounding remainder so the installments add up to the final
/// amount exactly.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "camelCase")]
pub struct InstallmentPlan {
    pub count: u32,
    pub installment_value: Money,
    pub last_installment_value: Money,
}

impl InstallmentPlan {
    pub fn split(total: Money, count: u32) -> Self {
        let exact = total.value() / Decimal::from(count);
        let mut installment_value = Money::round_half_up(exact);
        // Rounding up can overshoot on tiny totals split many ways; round down
        // instead so the last installment is never negative.
        if installment_value.value() * Decimal::from(count - 1) > total.value() {
            installment_value = Money::round_half_up(
                exact.round_dp_with_strategy(SCALE, RoundingStrategy::ToZero),
            );
        }
        let others = installment_value.value() * Decimal::from(count - 1);
        let last_installment_value = Money::round_half_up(total.value() - others);
        Self {
            count,
            installment_value,
            last_installment_value,
        }
    }

    pub fn total(&self) -> Money {
        Money::round_half_up(
            self.installment_value.value() * Decimal::from(self.count - 1)
                + self.last_installment_value.value(),
        )
    }
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "camelCase")]
pub struct PricingResult {
    pub base_amount: Money,
    pub discount_amount: Money,
    pub final_amount: Money,
    pub discount_source: DiscountSource,
    pub installments: InstallmentPlan,
}

/// Computes checkout prices.
///
/// The PIX incentive and a coupon never stack: whichever discount is larger
/// applies, and on a tie the payment-method discount wins.
#[derive(Debug, Clone, Default)]
pub struct PricingEngine {
    policy: PricingPolicy,
}

impl PricingEngine {
    pub fn new(policy: PricingPolicy) -> Self {
        Self { policy }
    }

    /// Prices a checkout.
    ///
    /// # Arguments
    ///
    /// * `base_amount` - Plan price before any discount. Must be positive.
    /// * `method` - PIX forces a single installment.
    /// * `installments` - Requested credit-card installments, 1 to 12.
    /// * `coupon_discount` - Discount of an already accepted coupon, if any.
    pub fn price(
        &self,
        base_amount: Money,
        method: PaymentMethod,
        installments: u32,
        coupon_discount: Option<Money>,
    ) -> Result<PricingResult> {
        if base_amount.is_zero() {
            return Err(CheckoutError::InvalidAmount(base_amount.value()));
        }

        let (method_discount, count) = match method {
            PaymentMethod::Pix => (
                Money::round_half_up(base_amount.value() * self.policy.pix_discount_rate),
                1,
            ),
            PaymentMethod::CreditCard => {
                let max = self.policy.installment_cap();
                if !(1..=max).contains(&installments) {
                    return Err(CheckoutError::InvalidInstallments {
                        requested: installments,
                        max,
                    });
                }
                (Money::ZERO, installments)
            }
        };

        let (discount, source) = match coupon_discount {
            Some(coupon) if coupon > method_discount => (coupon, DiscountSource::Coupon),
            _ if !method_discount.is_zero() => (method_discount, DiscountSource::PaymentMethod),
            _ => (Money::ZERO, DiscountSource::None),
        };

        // Keep at least one cent to pay.
        let ceiling = base_amount - Money::CENT;
        let discount_amount = discount.min(ceiling);
        let final_amount = base_amount - discount_amount;

        Ok(PricingResult {
            base_amount,
            discount_amount,
            final_amount,
            discount_source: if discount_amount.is_zero() {
                DiscountSource::None
            } else {
                source
            },
            installments: InstallmentPlan::split(final_amount, count),
        })
    }
}
