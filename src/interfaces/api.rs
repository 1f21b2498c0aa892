//! Wire shapes of the checkout surface and the mapping of failures onto
//! HTTP-style status codes.
//!
//! The transport itself is left to the embedding service; everything here is
//! plain serde data plus [`CheckoutApi`], which accepts and returns these DTOs.

use crate::application::checkout::{CheckoutOrchestrator, CheckoutRequest};
use crate::application::coupon_validator::{CouponDecision, CouponValidator};
use crate::application::session::PaymentSessionStateMachine;
use crate::domain::coupon::{DiscountType, RejectionReason};
use crate::domain::customer::Customer;
use crate::domain::money::Money;
use crate::domain::payment::{CardDetails, PaymentMethod, PaymentSession, PaymentStatus, PixCharge, SessionId};
use crate::domain::pricing::InstallmentPlan;
use crate::error::{CheckoutError, ErrorKind};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutRequestDto {
    pub customer: Customer,
    pub amount: Decimal,
    pub payment_method: PaymentMethod,
    #[serde(default)]
    pub installments: Option<u32>,
    #[serde(default)]
    pub coupon_code: Option<String>,
    #[serde(default)]
    pub credit_card: Option<CardDetails>,
}

impl TryFrom<CheckoutRequestDto> for CheckoutRequest {
    type Error = CheckoutError;

    fn try_from(dto: CheckoutRequestDto) -> Result<Self, Self::Error> {
        Ok(Self {
            customer: dto.customer,
            amount: Money::new(dto.amount)?,
            method: dto.payment_method,
            installments: dto.installments.unwrap_or(1),
            coupon_code: dto
                .coupon_code
                .filter(|code| !code.trim().is_empty()),
            card: dto.credit_card,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutResponse {
    pub id: SessionId,
    pub status: PaymentStatus,
    pub amount: Money,
    pub discount_amount: Money,
    pub final_amount: Money,
    pub payment_method: PaymentMethod,
    pub installments: u32,
    pub installment_value: Money,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coupon_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pix: Option<PixCharge>,
}

impl From<&PaymentSession> for CheckoutResponse {
    fn from(session: &PaymentSession) -> Self {
        let plan = InstallmentPlan::split(session.final_amount, session.installments);
        Self {
            id: session.id,
            status: session.status,
            amount: session.amount,
            discount_amount: session.discount_amount,
            final_amount: session.final_amount,
            payment_method: session.payment_method,
            installments: session.installments,
            installment_value: plan.installment_value,
            created_at: session.created_at,
            coupon_code: session.coupon_code.clone(),
            pix: session.pix.clone(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CouponValidationRequest {
    pub code: String,
    pub amount: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CouponSummary {
    pub code: String,
    pub discount_type: DiscountType,
    pub discount_value: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CouponValidationResponse {
    pub valid: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub discount_amount: Option<Money>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub final_amount: Option<Money>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coupon: Option<CouponSummary>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<RejectionReason>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl From<CouponDecision> for CouponValidationResponse {
    fn from(decision: CouponDecision) -> Self {
        match decision {
            CouponDecision::Accepted {
                discount_amount,
                final_amount,
                coupon,
            } => Self {
                valid: true,
                discount_amount: Some(discount_amount),
                final_amount: Some(final_amount),
                coupon: Some(CouponSummary {
                    code: coupon.code,
                    discount_type: coupon.discount_type,
                    discount_value: coupon.discount_value,
                }),
                reason: None,
                error: None,
            },
            CouponDecision::Rejected { reason } => Self {
                valid: false,
                discount_amount: None,
                final_amount: None,
                coupon: None,
                reason: Some(reason),
                error: Some(reason.to_string()),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentStatusResponse {
    pub id: SessionId,
    pub status: PaymentStatus,
    pub amount: Money,
    pub discount_amount: Money,
    pub final_amount: Money,
    pub payment_method: PaymentMethod,
    pub installments: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    /// Whole seconds left to pay, derived from `expires_at` at response time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remaining_seconds: Option<i64>,
}

impl PaymentStatusResponse {
    pub fn new(session: &PaymentSession, now: DateTime<Utc>) -> Self {
        Self {
            id: session.id,
            status: session.status,
            amount: session.amount,
            discount_amount: session.discount_amount,
            final_amount: session.final_amount,
            payment_method: session.payment_method,
            installments: session.installments,
            created_at: session.created_at,
            updated_at: session.updated_at,
            expires_at: session.expires_at(),
            remaining_seconds: session
                .remaining(now)
                .filter(|_| !session.status.is_terminal())
                .map(|r| r.num_seconds()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldErrorDto {
    pub field: String,
    pub message: String,
}

/// Error body of every failed call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiError {
    pub status: u16,
    pub error: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<FieldErrorDto>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<RejectionReason>,
    pub retryable: bool,
}

impl ApiError {
    pub fn is_authentication(&self) -> bool {
        self.status == 401
    }
}

impl From<CheckoutError> for ApiError {
    fn from(err: CheckoutError) -> Self {
        if err.kind() == ErrorKind::Internal {
            tracing::error!(error = %err, "internal failure");
        }
        let fields = match &err {
            CheckoutError::ValidationFailed(errors) => errors
                .0
                .iter()
                .map(|e| FieldErrorDto {
                    field: e.field.to_string(),
                    message: e.message.clone(),
                })
                .collect(),
            _ => Vec::new(),
        };
        let reason = match &err {
            CheckoutError::CouponRejected(reason) => Some(*reason),
            _ => None,
        };
        Self {
            status: err.status_code(),
            retryable: err.is_retryable(),
            error: err.to_string(),
            fields,
            reason,
        }
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

/// Buyer-facing entry points, speaking wire DTOs.
pub struct CheckoutApi {
    orchestrator: Arc<CheckoutOrchestrator>,
    coupons: CouponValidator,
    machine: Arc<PaymentSessionStateMachine>,
}

impl CheckoutApi {
    pub fn new(
        orchestrator: Arc<CheckoutOrchestrator>,
        coupons: CouponValidator,
        machine: Arc<PaymentSessionStateMachine>,
    ) -> Self {
        Self {
            orchestrator,
            coupons,
            machine,
        }
    }

    pub async fn create_checkout(&self, request: CheckoutRequestDto) -> ApiResult<CheckoutResponse> {
        let session = self
            .orchestrator
            .create_checkout(request.try_into()?)
            .await?;
        Ok(CheckoutResponse::from(&session))
    }

    pub async fn validate_coupon(
        &self,
        request: CouponValidationRequest,
    ) -> ApiResult<CouponValidationResponse> {
        let amount = Money::new(request.amount)?;
        let decision = self
            .coupons
            .validate(&request.code, amount, self.machine.clock().now())
            .await?;
        Ok(decision.into())
    }

    /// Current status, with the PIX deadline re-evaluated first.
    pub async fn payment_status(&self, id: &str) -> ApiResult<PaymentStatusResponse> {
        let session = self.machine.evaluate(id.parse()?).await?;
        Ok(PaymentStatusResponse::new(&session, self.machine.clock().now()))
    }

    /// Processor webhook delivering a charge outcome. Safe to deliver twice.
    pub async fn processor_callback(
        &self,
        id: &str,
        status: PaymentStatus,
    ) -> ApiResult<PaymentStatusResponse> {
        let session = self.machine.notify(id.parse()?, status).await?;
        Ok(PaymentStatusResponse::new(&session, self.machine.clock().now()))
    }

    pub async fn cancel(&self, id: &str) -> ApiResult<PaymentStatusResponse> {
        let session = self.machine.cancel(id.parse()?).await?;
        Ok(PaymentStatusResponse::new(&session, self.machine.clock().now()))
    }
}
