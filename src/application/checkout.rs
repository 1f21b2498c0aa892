use super::coupon_validator::CouponValidator;
use super::session::PaymentSessionStateMachine;
use crate::config::CheckoutConfig;
use crate::domain::customer::Customer;
use crate::domain::money::Money;
use crate::domain::payment::{
    CardDetails, PaymentMethod, PaymentSession, PaymentStatus, SessionEvent, SessionId,
};
use crate::domain::ports::{IntentRequest, PaymentProcessorRef};
use crate::domain::pricing::{DiscountSource, PricingEngine, PricingResult};
use crate::error::{CheckoutError, FieldErrors, Result};
use std::sync::Arc;

/// A checkout as submitted by the buyer.
#[derive(Debug, Clone)]
pub struct CheckoutRequest {
    pub customer: Customer,
    pub amount: Money,
    pub method: PaymentMethod,
    pub installments: u32,
    pub coupon_code: Option<String>,
    pub card: Option<CardDetails>,
}

/// Turns a validated checkout into a payment session with the processor.
///
/// Everything that can be refused locally (customer fields, coupon, price) is
/// settled before the processor is called, so a refused checkout never leaves
/// a partial session behind.
pub struct CheckoutOrchestrator {
    config: CheckoutConfig,
    pricing: PricingEngine,
    coupons: CouponValidator,
    processor: PaymentProcessorRef,
    machine: Arc<PaymentSessionStateMachine>,
}

impl CheckoutOrchestrator {
    pub fn new(
        config: CheckoutConfig,
        coupons: CouponValidator,
        processor: PaymentProcessorRef,
        machine: Arc<PaymentSessionStateMachine>,
    ) -> Self {
        Self {
            pricing: PricingEngine::new(config.pricing_policy()),
            config,
            coupons,
            processor,
            machine,
        }
    }

    /// Prices a checkout without creating anything, resolving the coupon if given.
    ///
    /// Returns the price and the coupon code that ended up applied.
    pub async fn quote(
        &self,
        amount: Money,
        method: PaymentMethod,
        installments: u32,
        coupon_code: Option<&str>,
    ) -> Result<(PricingResult, Option<String>)> {
        let coupon = match coupon_code {
            Some(code) => Some(
                self.coupons
                    .validate(code, amount, self.machine.clock().now())
                    .await?
                    .into_discount()?,
            ),
            None => None,
        };

        let pricing = self.pricing.price(
            amount,
            method,
            installments,
            coupon.as_ref().map(|(discount, _)| *discount),
        )?;
        let applied = match (pricing.discount_source, coupon) {
            (DiscountSource::Coupon, Some((_, coupon))) => Some(coupon.code),
            _ => None,
        };
        Ok((pricing, applied))
    }

    pub async fn create_checkout(&self, request: CheckoutRequest) -> Result<PaymentSession> {
        self.validate(&request)?;

        let (pricing, coupon_code) = self
            .quote(
                request.amount,
                request.method,
                request.installments,
                request.coupon_code.as_deref(),
            )
            .await?;

        let id = SessionId::new();
        let now = self.machine.clock().now();
        let pix_expires_at = match request.method {
            PaymentMethod::Pix => {
                let window = chrono::Duration::from_std(self.config.pix_window)
                    .map_err(|e| CheckoutError::InternalError(Box::new(e)))?;
                Some(now + window)
            }
            PaymentMethod::CreditCard => None,
        };

        let intent = self
            .processor
            .create_intent(IntentRequest {
                session_id: id,
                customer: request.customer.clone(),
                amount: pricing.final_amount,
                method: request.method,
                installments: pricing.installments.count,
                card: request.card.clone(),
                pix_expires_at,
            })
            .await
            .inspect_err(|err| tracing::warn!(session = %id, error = %err, "payment intent failed"))?;

        if intent.amount != pricing.final_amount {
            tracing::error!(
                session = %id,
                expected = %pricing.final_amount,
                charged = %intent.amount,
                "processor altered the charged amount"
            );
            return Err(CheckoutError::AmountMismatch {
                expected: pricing.final_amount,
                charged: intent.amount,
            });
        }
        if request.method == PaymentMethod::Pix && intent.pix.is_none() {
            return Err(CheckoutError::ProcessorProtocol(
                "PIX intent without QR payload".to_string(),
            ));
        }

        let mut session = PaymentSession::open(id, request.customer, &pricing, request.method, now);
        session.coupon_code = coupon_code;
        session.processor_reference = Some(intent.reference);
        session.pix = intent.pix;
        if intent.status == PaymentStatus::Processing {
            session.status = PaymentStatus::Processing;
        }
        let session = self.machine.open(session).await?;

        // Processors may settle card charges synchronously.
        if intent.status.is_terminal() {
            return self
                .machine
                .apply(session.id, SessionEvent::Processor(intent.status))
                .await;
        }
        Ok(session)
    }

    fn validate(&self, request: &CheckoutRequest) -> Result<()> {
        let mut errors = match request.customer.validate() {
            Ok(()) => FieldErrors::default(),
            Err(CheckoutError::ValidationFailed(errors)) => errors,
            Err(other) => return Err(other),
        };

        if let Some(plan) = self.config.plan_amount
            && request.amount != plan
        {
            errors.push("amount", format!("must match the plan price {plan}"));
        }
        if request.method == PaymentMethod::CreditCard {
            match &request.card {
                None => errors.push("creditCard", "required for credit card payments"),
                Some(card) if card.payment_token.trim().is_empty() => {
                    errors.push("creditCard", "payment token is required")
                }
                Some(_) => {}
            }
        }

        errors.into_result()
    }
}
