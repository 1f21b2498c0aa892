use crate::domain::coupon::{Coupon, RejectionReason};
use crate::domain::money::Money;
use crate::domain::ports::CouponStoreRef;
use crate::error::{CheckoutError, Result};
use chrono::{DateTime, Utc};

/// Result of checking a coupon against an amount.
#[derive(Debug, Clone, PartialEq)]
pub enum CouponDecision {
    Accepted {
        discount_amount: Money,
        final_amount: Money,
        coupon: Coupon,
    },
    Rejected {
        reason: RejectionReason,
    },
}

impl CouponDecision {
    /// Discount granted, or the rejection as an error.
    pub fn into_discount(self) -> Result<(Money, Coupon)> {
        match self {
            Self::Accepted {
                discount_amount,
                coupon,
                ..
            } => Ok((discount_amount, coupon)),
            Self::Rejected { reason } => Err(CheckoutError::CouponRejected(reason)),
        }
    }
}

/// Validates coupon codes against coupon storage.
///
/// Validation is a read-only preview: it never consumes a use. Usage is
/// consumed by [`CouponStore::redeem`](crate::domain::ports::CouponStore::redeem)
/// once a checkout is approved.
#[derive(Clone)]
pub struct CouponValidator {
    coupons: CouponStoreRef,
}

impl CouponValidator {
    pub fn new(coupons: CouponStoreRef) -> Self {
        Self { coupons }
    }

    pub async fn validate(
        &self,
        code: &str,
        amount: Money,
        now: DateTime<Utc>,
    ) -> Result<CouponDecision> {
        if amount.is_zero() {
            return Err(CheckoutError::InvalidAmount(amount.value()));
        }

        let Some(coupon) = self.coupons.get(code).await? else {
            tracing::debug!(code, "coupon not found");
            return Ok(CouponDecision::Rejected {
                reason: RejectionReason::NotFound,
            });
        };

        if let Err(reason) = coupon.check_eligibility(amount, now) {
            tracing::debug!(code = %coupon.code, %reason, "coupon rejected");
            return Ok(CouponDecision::Rejected { reason });
        }

        let discount_amount = coupon.discount_for(amount);
        let final_amount = amount - discount_amount;
        tracing::debug!(code = %coupon.code, %discount_amount, "coupon accepted");
        Ok(CouponDecision::Accepted {
            discount_amount,
            final_amount,
            coupon,
        })
    }
}
