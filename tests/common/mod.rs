#![allow(dead_code)]

use chrono::{DateTime, TimeZone, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::io::Write;
use std::sync::Arc;
use subscription_checkout::application::checkout::{CheckoutOrchestrator, CheckoutRequest};
use subscription_checkout::application::coupon_validator::CouponValidator;
use subscription_checkout::application::session::PaymentSessionStateMachine;
use subscription_checkout::application::tracker::SessionTracker;
use subscription_checkout::config::CheckoutConfig;
use subscription_checkout::domain::clock::{Clock, ClockRef};
use subscription_checkout::domain::coupon::{Coupon, DiscountType};
use subscription_checkout::domain::customer::Customer;
use subscription_checkout::domain::money::Money;
use subscription_checkout::domain::payment::{BillingAddress, CardDetails, PaymentMethod};
use subscription_checkout::infrastructure::in_memory::{InMemoryCouponStore, InMemoryPaymentSessionStore};
use subscription_checkout::infrastructure::simulated_processor::{SimulatedBehavior, SimulatedProcessor};
use tempfile::NamedTempFile;

/// Wall clock derived from tokio's (possibly paused) time, so auto-advancing
/// test time also moves checkout deadlines.
pub struct TokioClock {
    origin: tokio::time::Instant,
    start: DateTime<Utc>,
}

impl TokioClock {
    pub fn new() -> Self {
        Self {
            origin: tokio::time::Instant::now(),
            start: Utc.with_ymd_and_hms(2025, 3, 10, 12, 0, 0).unwrap(),
        }
    }
}

impl Clock for TokioClock {
    fn now(&self) -> DateTime<Utc> {
        self.start + chrono::Duration::from_std(self.origin.elapsed()).unwrap()
    }
}

/// Everything a checkout needs, wired over in-memory stores.
pub struct Harness {
    pub clock: ClockRef,
    pub coupons: InMemoryCouponStore,
    pub sessions: InMemoryPaymentSessionStore,
    pub processor: SimulatedProcessor,
    pub machine: Arc<PaymentSessionStateMachine>,
    pub orchestrator: CheckoutOrchestrator,
    pub tracker: SessionTracker,
}

impl Harness {
    pub fn new(behavior: SimulatedBehavior, clock: ClockRef) -> Self {
        let config = CheckoutConfig::default();
        let coupons = InMemoryCouponStore::new();
        let sessions = InMemoryPaymentSessionStore::new();
        let processor = SimulatedProcessor::new(behavior);
        let machine = Arc::new(PaymentSessionStateMachine::new(
            Arc::new(sessions.clone()),
            Arc::new(coupons.clone()),
            clock.clone(),
        ));
        let tracker = SessionTracker::new(machine.clone(), Arc::new(processor.clone()), config.tracker);
        let orchestrator = CheckoutOrchestrator::new(
            config,
            CouponValidator::new(Arc::new(coupons.clone())),
            Arc::new(processor.clone()),
            machine.clone(),
        );
        Self {
            clock,
            coupons,
            sessions,
            processor,
            machine,
            orchestrator,
            tracker,
        }
    }

    /// Harness on paused tokio time.
    pub fn paused(behavior: SimulatedBehavior) -> Self {
        Self::new(behavior, Arc::new(TokioClock::new()))
    }
}

pub fn money(value: Decimal) -> Money {
    Money::new(value).unwrap()
}

pub fn customer() -> Customer {
    Customer {
        name: "Maria Silva".to_string(),
        email: "maria@example.com".to_string(),
        phone: "11987654321".to_string(),
        cpf: "12345678901".to_string(),
        birth_date: None,
    }
}

pub fn card() -> CardDetails {
    CardDetails {
        payment_token: "tok_visa_4242".to_string(),
        billing_address: BillingAddress {
            street: "Av. Paulista".to_string(),
            number: "1000".to_string(),
            neighborhood: "Bela Vista".to_string(),
            zipcode: "01310100".to_string(),
            city: "São Paulo".to_string(),
            state: "SP".to_string(),
        },
    }
}

pub fn checkout(method: PaymentMethod) -> CheckoutRequest {
    CheckoutRequest {
        customer: customer(),
        amount: money(dec!(154.80)),
        method,
        installments: if method == PaymentMethod::Pix { 1 } else { 3 },
        coupon_code: None,
        card: (method == PaymentMethod::CreditCard).then(card),
    }
}

pub fn fixed_coupon(code: &str, value: Decimal, max_uses: Option<u32>) -> Coupon {
    Coupon {
        code: code.to_string(),
        description: None,
        discount_type: DiscountType::Fixed,
        discount_value: value,
        min_amount: None,
        max_discount: None,
        valid_from: Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap(),
        valid_until: None,
        max_uses,
        current_uses: 0,
        is_active: true,
    }
}

/// Writes `contents` to a temp file kept alive by the returned handle.
pub fn temp_file(contents: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file.flush().unwrap();
    file
}

pub fn checkout_json(method: &str, coupon: Option<&str>) -> String {
    let card = if method == "CREDIT_CARD" {
        r#","installments": 6,
        "creditCard": {
            "paymentToken": "tok_visa_4242",
            "billingAddress": {
                "street": "Av. Paulista", "number": "1000", "neighborhood": "Bela Vista",
                "zipcode": "01310100", "city": "Sao Paulo", "state": "SP"
            }
        }"#
    } else {
        ""
    };
    let coupon = coupon
        .map(|code| format!(r#","couponCode": "{code}""#))
        .unwrap_or_default();
    format!(
        r#"{{
        "customer": {{
            "name": "Maria Silva",
            "email": "maria@example.com",
            "phone": "11987654321",
            "cpf": "12345678901"
        }},
        "amount": "154.80",
        "paymentMethod": "{method}"{card}{coupon}
    }}"#
    )
}

pub const COUPONS_CSV: &str = "\
code, discount_type, discount_value, min_amount, max_discount, valid_from, valid_until, max_uses, active, description
HALF, PERCENTAGE, 50, , , 2020-01-01T00:00:00Z, , 10, true, Half price
FIVE, FIXED, 5, , , 2020-01-01T00:00:00Z, , , true, Five off
OLD, FIXED, 5, , , 2020-01-01T00:00:00Z, 2021-01-01T00:00:00Z, , true, Expired
";
