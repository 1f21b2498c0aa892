use crate::domain::coupon::{normalize_code, Coupon, RejectionReason};
use crate::domain::payment::{PaymentSession, SessionId};
use crate::domain::ports::{CouponStore, PaymentSessionStore};
use crate::error::{CheckoutError, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::Arc;
use tokio::sync::RwLock;

/// A thread-safe in-memory store for coupons.
///
/// Uses `Arc<RwLock<HashMap<String, Coupon>>>` keyed by the uppercase code.
/// Redemption takes the write lock for the whole check-and-increment, which
/// serializes concurrent redemptions.
#[derive(Default, Clone)]
pub struct InMemoryCouponStore {
    coupons: Arc<RwLock<HashMap<String, Coupon>>>,
}

impl InMemoryCouponStore {
    /// Creates a new, empty in-memory coupon store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CouponStore for InMemoryCouponStore {
    async fn get(&self, code: &str) -> Result<Option<Coupon>> {
        let coupons = self.coupons.read().await;
        Ok(coupons.get(&normalize_code(code)).cloned())
    }

    async fn store(&self, mut coupon: Coupon) -> Result<()> {
        coupon.code = normalize_code(&coupon.code);
        let mut coupons = self.coupons.write().await;
        coupons.insert(coupon.code.clone(), coupon);
        Ok(())
    }

    async fn insert(&self, mut coupon: Coupon) -> Result<()> {
        coupon.code = normalize_code(&coupon.code);
        let mut coupons = self.coupons.write().await;
        match coupons.entry(coupon.code.clone()) {
            Entry::Occupied(_) => Err(CheckoutError::DuplicateCoupon(coupon.code)),
            Entry::Vacant(slot) => {
                slot.insert(coupon);
                Ok(())
            }
        }
    }

    async fn replace_definition(&self, mut coupon: Coupon) -> Result<Coupon> {
        coupon.code = normalize_code(&coupon.code);
        let mut coupons = self.coupons.write().await;
        let stored = coupons
            .get_mut(&coupon.code)
            .ok_or_else(|| CheckoutError::not_found("coupon", &coupon.code))?;
        coupon.current_uses = stored.current_uses;
        *stored = coupon.clone();
        Ok(coupon)
    }

    async fn remove(&self, code: &str) -> Result<bool> {
        let mut coupons = self.coupons.write().await;
        Ok(coupons.remove(&normalize_code(code)).is_some())
    }

    async fn get_all(&self) -> Result<Vec<Coupon>> {
        let coupons = self.coupons.read().await;
        let mut all: Vec<Coupon> = coupons.values().cloned().collect();
        all.sort_by(|a, b| a.code.cmp(&b.code));
        Ok(all)
    }

    async fn redeem(&self, code: &str) -> Result<Coupon> {
        let code = normalize_code(code);
        let mut coupons = self.coupons.write().await;
        let coupon = coupons
            .get_mut(&code)
            .ok_or(CheckoutError::CouponRejected(RejectionReason::NotFound))?;
        if coupon.is_exhausted() {
            return Err(CheckoutError::CouponRejected(RejectionReason::UsageExceeded));
        }
        coupon.current_uses += 1;
        Ok(coupon.clone())
    }
}

/// A thread-safe in-memory store for payment sessions.
#[derive(Default, Clone)]
pub struct InMemoryPaymentSessionStore {
    sessions: Arc<RwLock<HashMap<SessionId, PaymentSession>>>,
}

impl InMemoryPaymentSessionStore {
    /// Creates a new, empty in-memory session store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PaymentSessionStore for InMemoryPaymentSessionStore {
    async fn store(&self, session: PaymentSession) -> Result<()> {
        let mut sessions = self.sessions.write().await;
        sessions.insert(session.id, session);
        Ok(())
    }

    async fn get(&self, id: SessionId) -> Result<Option<PaymentSession>> {
        let sessions = self.sessions.read().await;
        Ok(sessions.get(&id).cloned())
    }

    async fn get_all(&self) -> Result<Vec<PaymentSession>> {
        let sessions = self.sessions.read().await;
        let mut all: Vec<PaymentSession> = sessions.values().cloned().collect();
        all.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(all)
    }
}
