use super::session::PaymentSessionStateMachine;
use crate::domain::coupon::{normalize_code, Coupon, CouponDraft};
use crate::domain::money::Money;
use crate::domain::payment::{PaymentMethod, PaymentSession, PaymentStatus, SessionEvent, SessionId};
use crate::domain::ports::{AuthenticatorRef, CouponStoreRef, Operator, PaymentSessionStoreRef};
use crate::error::{CheckoutError, FieldErrors, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

pub const DEFAULT_PAGE_SIZE: u32 = 10;
pub const MAX_PAGE_SIZE: u32 = 100;

/// Listing criteria for payment sessions. Pages start at 1.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentFilter {
    #[serde(default)]
    pub status: Option<PaymentStatus>,
    #[serde(default)]
    pub payment_method: Option<PaymentMethod>,
    #[serde(default = "first_page")]
    pub page: u32,
    #[serde(default = "default_limit")]
    pub limit: u32,
}

fn first_page() -> u32 {
    1
}

fn default_limit() -> u32 {
    DEFAULT_PAGE_SIZE
}

impl Default for PaymentFilter {
    fn default() -> Self {
        Self {
            status: None,
            payment_method: None,
            page: first_page(),
            limit: default_limit(),
        }
    }
}

impl PaymentFilter {
    fn validate(&self) -> Result<()> {
        let mut errors = FieldErrors::default();
        if self.page == 0 {
            errors.push("page", "must be at least 1");
        }
        if !(1..=MAX_PAGE_SIZE).contains(&self.limit) {
            errors.push("limit", format!("must be between 1 and {MAX_PAGE_SIZE}"));
        }
        errors.into_result()
    }

    fn matches(&self, session: &PaymentSession) -> bool {
        self.status.is_none_or(|s| s == session.status)
            && self.payment_method.is_none_or(|m| m == session.payment_method)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    pub items: Vec<T>,
    pub page: u32,
    pub limit: u32,
    pub total: usize,
    pub total_pages: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentStats {
    pub total: usize,
    pub by_status: BTreeMap<PaymentStatus, usize>,
    pub by_method: BTreeMap<PaymentMethod, usize>,
    /// Sum of final amounts over every session.
    pub total_amount: Money,
    /// Sum of final amounts over approved sessions.
    pub approved_amount: Money,
}

/// Operator-facing operations. Every call resolves the bearer token first.
pub struct AdminService {
    authenticator: AuthenticatorRef,
    coupons: CouponStoreRef,
    sessions: PaymentSessionStoreRef,
    machine: Arc<PaymentSessionStateMachine>,
}

impl AdminService {
    pub fn new(
        authenticator: AuthenticatorRef,
        coupons: CouponStoreRef,
        sessions: PaymentSessionStoreRef,
        machine: Arc<PaymentSessionStateMachine>,
    ) -> Self {
        Self {
            authenticator,
            coupons,
            sessions,
            machine,
        }
    }

    pub async fn login(&self, email: &str, password: &str) -> Result<String> {
        let token = self.authenticator.login(email, password).await?;
        tracing::info!(email, "operator logged in");
        Ok(token)
    }

    async fn authorize(&self, token: &str) -> Result<Operator> {
        self.authenticator
            .verify(token)
            .await
            .inspect_err(|_| tracing::debug!("bearer token rejected"))
    }

    pub async fn list_coupons(&self, token: &str) -> Result<Vec<Coupon>> {
        self.authorize(token).await?;
        let mut coupons = self.coupons.get_all().await?;
        coupons.sort_by(|a, b| a.code.cmp(&b.code));
        Ok(coupons)
    }

    pub async fn get_coupon(&self, token: &str, code: &str) -> Result<Coupon> {
        self.authorize(token).await?;
        self.coupons
            .get(code)
            .await?
            .ok_or_else(|| CheckoutError::not_found("coupon", normalize_code(code)))
    }

    pub async fn create_coupon(&self, token: &str, draft: CouponDraft) -> Result<Coupon> {
        let operator = self.authorize(token).await?;
        let coupon = Coupon::from_draft(draft, self.machine.clock().now())?;
        self.coupons.insert(coupon.clone()).await?;
        tracing::info!(operator = %operator.email, code = %coupon.code, "coupon created");
        Ok(coupon)
    }

    /// Replaces the definition of an existing coupon. Usage counts are kept,
    /// including redemptions landing mid-update, and so is the code: the
    /// draft's code must name the same coupon.
    pub async fn update_coupon(&self, token: &str, code: &str, draft: CouponDraft) -> Result<Coupon> {
        let operator = self.authorize(token).await?;
        let code = normalize_code(code);
        let existing = self
            .coupons
            .get(&code)
            .await?
            .ok_or_else(|| CheckoutError::not_found("coupon", &code))?;

        let coupon = Coupon::from_draft(draft, existing.valid_from)?;
        if coupon.code != code {
            let mut errors = FieldErrors::default();
            errors.push("code", "cannot be changed");
            return Err(CheckoutError::ValidationFailed(errors));
        }
        let coupon = self.coupons.replace_definition(coupon).await?;
        tracing::info!(operator = %operator.email, %code, "coupon updated");
        Ok(coupon)
    }

    pub async fn delete_coupon(&self, token: &str, code: &str) -> Result<()> {
        let operator = self.authorize(token).await?;
        if !self.coupons.remove(code).await? {
            return Err(CheckoutError::not_found("coupon", normalize_code(code)));
        }
        tracing::info!(operator = %operator.email, code = %normalize_code(code), "coupon deleted");
        Ok(())
    }

    /// Newest sessions first.
    pub async fn list_payments(
        &self,
        token: &str,
        filter: &PaymentFilter,
    ) -> Result<Page<PaymentSession>> {
        self.authorize(token).await?;
        filter.validate()?;

        let mut matching: Vec<PaymentSession> = self
            .sessions
            .get_all()
            .await?
            .into_iter()
            .filter(|s| filter.matches(s))
            .collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(a.id.cmp(&b.id)));
        let total = matching.len();
        let total_pages = total.div_ceil(filter.limit as usize) as u32;
        let skip = (filter.page as usize - 1) * filter.limit as usize;
        let items = matching
            .into_iter()
            .skip(skip)
            .take(filter.limit as usize)
            .collect();

        Ok(Page {
            items,
            page: filter.page,
            limit: filter.limit,
            total,
            total_pages,
        })
    }

    pub async fn get_payment(&self, token: &str, id: SessionId) -> Result<PaymentSession> {
        self.authorize(token).await?;
        self.machine.get(id).await
    }

    pub async fn payment_stats(&self, token: &str) -> Result<PaymentStats> {
        self.authorize(token).await?;
        let sessions = self.sessions.get_all().await?;

        let mut stats = PaymentStats {
            total: sessions.len(),
            by_status: BTreeMap::new(),
            by_method: BTreeMap::new(),
            total_amount: Money::ZERO,
            approved_amount: Money::ZERO,
        };
        for session in &sessions {
            *stats.by_status.entry(session.status).or_default() += 1;
            *stats.by_method.entry(session.payment_method).or_default() += 1;
            stats.total_amount = stats.total_amount + session.final_amount;
            if session.status == PaymentStatus::Approved {
                stats.approved_amount = stats.approved_amount + session.final_amount;
            }
        }
        Ok(stats)
    }

    /// Records a status on behalf of the processor, through the same
    /// transition rules as callbacks.
    pub async fn update_payment_status(
        &self,
        token: &str,
        id: SessionId,
        status: PaymentStatus,
    ) -> Result<PaymentSession> {
        let operator = self.authorize(token).await?;
        let event = match status {
            PaymentStatus::Cancelled => SessionEvent::Cancel,
            other => SessionEvent::Processor(other),
        };
        let session = self.machine.apply(id, event).await?;
        tracing::info!(operator = %operator.email, session = %id, %status, "status set by operator");
        Ok(session)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AdminCredentials;
    use crate::domain::clock::{Clock, ManualClock};
    use crate::domain::coupon::DiscountType;
    use crate::domain::customer::Customer;
    use crate::domain::ports::{CouponStore, PaymentSessionStore};
    use crate::domain::pricing::PricingEngine;
    use crate::infrastructure::auth::InMemoryAuthenticator;
    use crate::infrastructure::in_memory::{InMemoryCouponStore, InMemoryPaymentSessionStore};
    use async_trait::async_trait;
    use chrono::{Duration, TimeZone, Utc};
    use rust_decimal_macros::dec;

    /// Coupon store whose lookups stall after reading, widening any window
    /// between a read and a later write.
    struct SlowReads(InMemoryCouponStore);

    #[async_trait]
    impl CouponStore for SlowReads {
        async fn get(&self, code: &str) -> Result<Option<Coupon>> {
            let found = self.0.get(code).await;
            tokio::time::sleep(std::time::Duration::from_millis(50)).await;
            found
        }
        async fn store(&self, coupon: Coupon) -> Result<()> {
            self.0.store(coupon).await
        }
        async fn insert(&self, coupon: Coupon) -> Result<()> {
            self.0.insert(coupon).await
        }
        async fn replace_definition(&self, coupon: Coupon) -> Result<Coupon> {
            self.0.replace_definition(coupon).await
        }
        async fn remove(&self, code: &str) -> Result<bool> {
            self.0.remove(code).await
        }
        async fn get_all(&self) -> Result<Vec<Coupon>> {
            self.0.get_all().await
        }
        async fn redeem(&self, code: &str) -> Result<Coupon> {
            self.0.redeem(code).await
        }
    }

    struct Fixture {
        admin: AdminService,
        sessions: InMemoryPaymentSessionStore,
        clock: ManualClock,
    }

    fn fixture() -> Fixture {
        fixture_with(Arc::new(InMemoryCouponStore::new()))
    }

    fn fixture_with(coupons: CouponStoreRef) -> Fixture {
        let clock = ManualClock::new(Utc.with_ymd_and_hms(2025, 3, 10, 12, 0, 0).unwrap());
        let sessions = InMemoryPaymentSessionStore::new();
        let machine = Arc::new(PaymentSessionStateMachine::new(
            Arc::new(sessions.clone()),
            coupons.clone(),
            Arc::new(clock.clone()),
        ));
        let authenticator = InMemoryAuthenticator::new(AdminCredentials {
            email: "admin@example.com".to_string(),
            password: "s3cret".to_string(),
        });
        let admin = AdminService::new(
            Arc::new(authenticator),
            coupons,
            Arc::new(sessions.clone()),
            machine,
        );
        Fixture {
            admin,
            sessions,
            clock,
        }
    }

    async fn token(f: &Fixture) -> String {
        f.admin.login("admin@example.com", "s3cret").await.unwrap()
    }

    fn draft(code: &str) -> CouponDraft {
        CouponDraft {
            code: code.to_string(),
            description: Some("Launch week".to_string()),
            discount_type: DiscountType::Percentage,
            discount_value: dec!(20),
            min_amount: None,
            max_discount: Some(Money::new(dec!(25)).unwrap()),
            valid_from: None,
            valid_until: None,
            max_uses: Some(50),
            is_active: true,
        }
    }

    async fn seed_session(f: &Fixture, method: PaymentMethod, status: PaymentStatus, age_minutes: i64) {
        let pricing = PricingEngine::default()
            .price(Money::new(dec!(154.80)).unwrap(), method, 1, None)
            .unwrap();
        let customer = Customer {
            name: "Maria Silva".to_string(),
            email: "maria@example.com".to_string(),
            phone: "11987654321".to_string(),
            cpf: "12345678901".to_string(),
            birth_date: None,
        };
        let created = f.clock.now() - Duration::minutes(age_minutes);
        let mut session = PaymentSession::open(SessionId::new(), customer, &pricing, method, created);
        session.status = status;
        f.sessions.store(session).await.unwrap();
    }

    #[tokio::test]
    async fn test_every_operation_requires_a_token() {
        fn unauthenticated<T>(result: Result<T>) -> bool {
            matches!(result, Err(CheckoutError::Unauthenticated))
        }
        let f = fixture();

        assert!(unauthenticated(f.admin.list_coupons("").await));
        assert!(unauthenticated(f.admin.get_coupon("bogus", "X").await));
        assert!(unauthenticated(f.admin.create_coupon("bogus", draft("NEW")).await));
        assert!(unauthenticated(f.admin.delete_coupon("bogus", "NEW").await));
        assert!(unauthenticated(
            f.admin.list_payments("bogus", &PaymentFilter::default()).await
        ));
        assert!(unauthenticated(f.admin.payment_stats("Bearer bogus").await));
    }

    #[tokio::test]
    async fn test_wrong_password_is_distinct_from_missing_token() {
        let f = fixture();
        let err = f.admin.login("admin@example.com", "nope").await.unwrap_err();
        assert!(matches!(err, CheckoutError::InvalidCredentials));
        assert_eq!(err.status_code(), 401);
    }

    #[tokio::test]
    async fn test_coupon_lifecycle() {
        let f = fixture();
        let token = token(&f).await;

        let created = f.admin.create_coupon(&token, draft("launch20")).await.unwrap();
        assert_eq!(created.code, "LAUNCH20");
        assert_eq!(created.valid_from, f.clock.now());

        let duplicate = f.admin.create_coupon(&token, draft("LAUNCH20")).await;
        assert!(matches!(duplicate, Err(CheckoutError::DuplicateCoupon(_))));

        let mut changed = draft("LAUNCH20");
        changed.discount_value = dec!(30);
        let updated = f
            .admin
            .update_coupon(&format!("Bearer {token}"), "launch20", changed)
            .await
            .unwrap();
        assert_eq!(updated.discount_value, dec!(30));

        assert_eq!(f.admin.list_coupons(&token).await.unwrap().len(), 1);
        f.admin.delete_coupon(&token, "LAUNCH20").await.unwrap();
        assert!(matches!(
            f.admin.get_coupon(&token, "LAUNCH20").await,
            Err(CheckoutError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_update_cannot_rename() {
        let f = fixture();
        let token = token(&f).await;
        f.admin.create_coupon(&token, draft("FIRST")).await.unwrap();
        let err = f
            .admin
            .update_coupon(&token, "FIRST", draft("SECOND"))
            .await
            .unwrap_err();
        assert!(matches!(err, CheckoutError::ValidationFailed(e) if e.contains("code")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_update_keeps_redemption_landing_mid_update() {
        let coupons = InMemoryCouponStore::new();
        let f = fixture_with(Arc::new(SlowReads(coupons.clone())));
        let token = token(&f).await;
        f.admin.create_coupon(&token, draft("RACE")).await.unwrap();

        let mut changed = draft("RACE");
        changed.discount_value = dec!(30);
        let (updated, redeemed) = tokio::join!(
            f.admin.update_coupon(&token, "RACE", changed),
            coupons.redeem("RACE"),
        );

        assert_eq!(redeemed.unwrap().current_uses, 1);
        assert_eq!(updated.unwrap().current_uses, 1);
        let stored = coupons.get("RACE").await.unwrap().unwrap();
        assert_eq!(stored.current_uses, 1);
        assert_eq!(stored.discount_value, dec!(30));
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_creates_keep_one_definition() {
        let coupons = InMemoryCouponStore::new();
        let f = fixture_with(Arc::new(SlowReads(coupons.clone())));
        let token = token(&f).await;

        let mut rival = draft("TWIN");
        rival.discount_value = dec!(35);
        let (first, second) = tokio::join!(
            f.admin.create_coupon(&token, draft("TWIN")),
            f.admin.create_coupon(&token, rival),
        );

        let winner = match (&first, &second) {
            (Ok(winner), Err(CheckoutError::DuplicateCoupon(_)))
            | (Err(CheckoutError::DuplicateCoupon(_)), Ok(winner)) => winner.clone(),
            other => panic!("expected exactly one create to win, got {other:?}"),
        };
        let stored = coupons.get("TWIN").await.unwrap().unwrap();
        assert_eq!(stored.discount_value, winner.discount_value);
    }

    #[tokio::test]
    async fn test_list_payments_filters_and_paginates() {
        let f = fixture();
        let token = token(&f).await;
        for age in 0..5 {
            seed_session(&f, PaymentMethod::Pix, PaymentStatus::Pending, age).await;
        }
        seed_session(&f, PaymentMethod::CreditCard, PaymentStatus::Approved, 10).await;

        let filter = PaymentFilter {
            payment_method: Some(PaymentMethod::Pix),
            page: 2,
            limit: 2,
            ..PaymentFilter::default()
        };
        let page = f.admin.list_payments(&token, &filter).await.unwrap();
        assert_eq!(page.total, 5);
        assert_eq!(page.total_pages, 3);
        assert_eq!(page.items.len(), 2);
        assert!(page.items[0].created_at > page.items[1].created_at);

        let approved = PaymentFilter {
            status: Some(PaymentStatus::Approved),
            ..PaymentFilter::default()
        };
        let page = f.admin.list_payments(&token, &approved).await.unwrap();
        assert_eq!(page.total, 1);
        assert_eq!(page.items[0].payment_method, PaymentMethod::CreditCard);

        let bad = PaymentFilter {
            page: 0,
            ..PaymentFilter::default()
        };
        assert!(matches!(
            f.admin.list_payments(&token, &bad).await,
            Err(CheckoutError::ValidationFailed(_))
        ));
    }

    #[tokio::test]
    async fn test_stats() {
        let f = fixture();
        let token = token(&f).await;
        seed_session(&f, PaymentMethod::Pix, PaymentStatus::Approved, 1).await;
        seed_session(&f, PaymentMethod::CreditCard, PaymentStatus::Approved, 2).await;
        seed_session(&f, PaymentMethod::Pix, PaymentStatus::Expired, 3).await;

        let stats = f.admin.payment_stats(&token).await.unwrap();
        assert_eq!(stats.total, 3);
        assert_eq!(stats.by_status[&PaymentStatus::Approved], 2);
        assert_eq!(stats.by_method[&PaymentMethod::Pix], 2);
        // 131.58 + 154.80 + 131.58
        assert_eq!(stats.total_amount, Money::new(dec!(417.96)).unwrap());
        assert_eq!(stats.approved_amount, Money::new(dec!(286.38)).unwrap());
    }

    #[tokio::test]
    async fn test_operator_status_update_follows_transition_rules() {
        let f = fixture();
        let token = token(&f).await;
        seed_session(&f, PaymentMethod::CreditCard, PaymentStatus::Processing, 0).await;
        let id = f.sessions.get_all().await.unwrap()[0].id;

        let session = f
            .admin
            .update_payment_status(&token, id, PaymentStatus::Rejected)
            .await
            .unwrap();
        assert_eq!(session.status, PaymentStatus::Rejected);

        let err = f
            .admin
            .update_payment_status(&token, id, PaymentStatus::Approved)
            .await
            .unwrap_err();
        assert!(matches!(err, CheckoutError::InvalidTransition { .. }));
    }

    #[tokio::test]
    async fn test_operator_cannot_expire_card_payment() {
        let f = fixture();
        let token = token(&f).await;
        seed_session(&f, PaymentMethod::CreditCard, PaymentStatus::Pending, 0).await;
        let id = f.sessions.get_all().await.unwrap()[0].id;

        let err = f
            .admin
            .update_payment_status(&token, id, PaymentStatus::Expired)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            CheckoutError::InvalidTransition {
                to: PaymentStatus::Expired,
                ..
            }
        ));
        let stored = f.admin.get_payment(&token, id).await.unwrap();
        assert_eq!(stored.status, PaymentStatus::Pending);
    }
}
