use super::coupon::Coupon;
use super::customer::Customer;
use super::money::Money;
use super::payment::{CardDetails, PaymentMethod, PaymentSession, PaymentStatus, PixCharge, SessionId};
use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;

#[async_trait]
pub trait CouponStore: Send + Sync {
    /// Looks a coupon up by code, case-insensitively.
    async fn get(&self, code: &str) -> Result<Option<Coupon>>;
    async fn store(&self, coupon: Coupon) -> Result<()>;
    /// Stores a new coupon. Fails with `DuplicateCoupon` when the code is
    /// taken, atomically with respect to other inserts.
    async fn insert(&self, coupon: Coupon) -> Result<()>;
    /// Replaces the definition of an existing coupon and returns it as
    /// stored. `current_uses` is carried over from the stored coupon under
    /// the same serialization as [`redeem`](Self::redeem), so no redemption
    /// is lost. Fails with `NotFound` when the code is unknown.
    async fn replace_definition(&self, coupon: Coupon) -> Result<Coupon>;
    async fn remove(&self, code: &str) -> Result<bool>;
    async fn get_all(&self) -> Result<Vec<Coupon>>;
    /// Consumes one use of the coupon.
    ///
    /// Must be atomic per code: concurrent redemptions never push
    /// `current_uses` past `max_uses`. Fails with `CouponRejected` when the
    /// quota is already used up.
    async fn redeem(&self, code: &str) -> Result<Coupon>;
}

#[async_trait]
pub trait PaymentSessionStore: Send + Sync {
    async fn store(&self, session: PaymentSession) -> Result<()>;
    async fn get(&self, id: SessionId) -> Result<Option<PaymentSession>>;
    async fn get_all(&self) -> Result<Vec<PaymentSession>>;
}

/// What the checkout asks the processor to charge.
#[derive(Debug, Clone)]
pub struct IntentRequest {
    pub session_id: SessionId,
    pub customer: Customer,
    pub amount: Money,
    pub method: PaymentMethod,
    pub installments: u32,
    pub card: Option<CardDetails>,
    /// Deadline requested for PIX charges.
    pub pix_expires_at: Option<DateTime<Utc>>,
}

/// The processor's answer to an intent request.
#[derive(Debug, Clone)]
pub struct ProcessorIntent {
    pub reference: String,
    /// Amount the processor will actually charge.
    pub amount: Money,
    pub status: PaymentStatus,
    pub pix: Option<PixCharge>,
}

#[async_trait]
pub trait PaymentProcessor: Send + Sync {
    async fn create_intent(&self, request: IntentRequest) -> Result<ProcessorIntent>;
    /// Current status of a charge. Transport failures surface as
    /// `ProcessorUnavailable`.
    async fn fetch_status(&self, session_id: SessionId) -> Result<PaymentStatus>;
}

/// An authenticated operator of the administrative operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Operator {
    pub email: String,
}

#[async_trait]
pub trait Authenticator: Send + Sync {
    /// Exchanges credentials for an opaque bearer token.
    async fn login(&self, email: &str, password: &str) -> Result<String>;
    /// Resolves a bearer token. Unknown tokens fail with `Unauthenticated`.
    async fn verify(&self, token: &str) -> Result<Operator>;
}

pub type CouponStoreRef = Arc<dyn CouponStore>;
pub type PaymentSessionStoreRef = Arc<dyn PaymentSessionStore>;
pub type PaymentProcessorRef = Arc<dyn PaymentProcessor>;
pub type AuthenticatorRef = Arc<dyn Authenticator>;
