use crate::domain::money::Money;
use crate::domain::pricing::{PricingPolicy, MAX_INSTALLMENTS};
use crate::error::Result;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::time::Duration;

/// Runtime settings of the checkout pipeline.
#[derive(Debug, Clone)]
pub struct CheckoutConfig {
    /// Price of the subscription plan. When set, checkouts for any other base
    /// amount are refused.
    pub plan_amount: Option<Money>,
    pub pix_discount_rate: Decimal,
    /// How long a PIX charge stays payable after creation.
    pub pix_window: Duration,
    pub max_installments: u32,
    pub tracker: TrackerConfig,
}

impl CheckoutConfig {
    pub fn pricing_policy(&self) -> PricingPolicy {
        PricingPolicy {
            pix_discount_rate: self.pix_discount_rate,
            max_installments: self.max_installments,
        }
    }

    /// Refuses settings the pricing rules cannot honor, such as an
    /// installment cap above 12.
    pub fn validate(&self) -> Result<()> {
        self.pricing_policy().validate()
    }
}

impl Default for CheckoutConfig {
    fn default() -> Self {
        Self {
            plan_amount: Some(Money::round_half_up(dec!(154.80))),
            pix_discount_rate: dec!(0.15),
            pix_window: Duration::from_secs(60 * 60),
            max_installments: MAX_INSTALLMENTS,
            tracker: TrackerConfig::default(),
        }
    }
}

/// Timer cadence of a tracked session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrackerConfig {
    /// Countdown granularity; each tick re-evaluates the PIX deadline.
    pub tick_interval: Duration,
    /// Settlement polling cadence for PIX sessions.
    pub poll_interval: Duration,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_secs(1),
            poll_interval: Duration::from_secs(5),
        }
    }
}

/// Credentials of the single administrative operator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdminCredentials {
    pub email: String,
    pub password: String,
}
