use crate::domain::money::Money;
use crate::domain::payment::{PaymentMethod, PaymentStatus, PixCharge, SessionId};
use crate::domain::ports::{IntentRequest, PaymentProcessor, ProcessorIntent};
use crate::error::{CheckoutError, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use tokio::sync::Mutex;

/// Receiving key printed into every simulated PIX charge.
const MERCHANT_KEY: &str = "pagamentos@assinatura.example";

/// Scripted behavior of the [`SimulatedProcessor`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SimulatedBehavior {
    /// Number of status polls after which a charge settles. `None` keeps
    /// charges pending until [`SimulatedProcessor::settle`] is called.
    pub settle_after_polls: Option<u32>,
    /// Outcome used when a charge settles on its own.
    pub settle_with: PaymentStatus,
    /// Status reported right after a credit-card intent is created.
    pub card_initial_status: PaymentStatus,
}

impl Default for SimulatedBehavior {
    fn default() -> Self {
        Self {
            settle_after_polls: None,
            settle_with: PaymentStatus::Approved,
            card_initial_status: PaymentStatus::Processing,
        }
    }
}

#[derive(Debug, Clone)]
struct SimulatedCharge {
    status: PaymentStatus,
    polls: u32,
}

/// An in-process payment processor.
///
/// Generates PIX payloads, answers status polls from its own ledger, and can
/// be scripted to settle charges, drop polls or alter charged amounts. The
/// CLI runs against it and so do the tests.
#[derive(Clone, Default)]
pub struct SimulatedProcessor {
    behavior: SimulatedBehavior,
    charges: Arc<Mutex<HashMap<SessionId, SimulatedCharge>>>,
    failing_polls: Arc<AtomicU32>,
    unavailable: Arc<AtomicBool>,
    amount_skew: Arc<Mutex<Option<Money>>>,
}

impl SimulatedProcessor {
    pub fn new(behavior: SimulatedBehavior) -> Self {
        Self {
            behavior,
            ..Self::default()
        }
    }

    /// Settles a charge, as the bank would after the customer pays.
    pub async fn settle(&self, id: SessionId, status: PaymentStatus) {
        let mut charges = self.charges.lock().await;
        if let Some(charge) = charges.get_mut(&id) {
            charge.status = status;
        }
    }

    /// Makes the next `count` status polls fail with a transport error.
    pub fn fail_next_polls(&self, count: u32) {
        self.failing_polls.store(count, Ordering::SeqCst);
    }

    /// Rejects every new intent as if the processor were down.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Echoes `amount` back instead of the requested amount on new intents.
    pub async fn charge_instead(&self, amount: Option<Money>) {
        *self.amount_skew.lock().await = amount;
    }

    pub async fn polls(&self, id: SessionId) -> u32 {
        self.charges.lock().await.get(&id).map_or(0, |c| c.polls)
    }

    fn pix_payload(request: &IntentRequest) -> (String, String) {
        let txid: String = request.session_id.to_string().replace('-', "");
        let amount = request.amount.to_string();
        let key = format!(
            "00020126{:02}0014br.gov.bcb.pix01{:02}{}52040000530398654{:02}{}5802BR62{:02}05{:02}{}6304",
            22 + MERCHANT_KEY.len(),
            MERCHANT_KEY.len(),
            MERCHANT_KEY,
            amount.len(),
            amount,
            4 + txid.len(),
            txid.len(),
            txid,
        );
        (key.clone(), key)
    }
}

#[async_trait]
impl PaymentProcessor for SimulatedProcessor {
    async fn create_intent(&self, request: IntentRequest) -> Result<ProcessorIntent> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(CheckoutError::ProcessorUnavailable(
                "simulated outage".to_string(),
            ));
        }

        let amount = self.amount_skew.lock().await.unwrap_or(request.amount);
        let (status, pix) = match request.method {
            PaymentMethod::Pix => {
                let expires_at = request.pix_expires_at.ok_or_else(|| {
                    CheckoutError::ProcessorProtocol("PIX charge without deadline".to_string())
                })?;
                let (qr_code, key) = Self::pix_payload(&request);
                (
                    PaymentStatus::Pending,
                    Some(PixCharge {
                        qr_code,
                        key,
                        expires_at,
                    }),
                )
            }
            PaymentMethod::CreditCard => (self.behavior.card_initial_status, None),
        };

        let mut charges = self.charges.lock().await;
        charges.insert(request.session_id, SimulatedCharge { status, polls: 0 });

        tracing::debug!(session = %request.session_id, %amount, "simulated intent created");
        Ok(ProcessorIntent {
            reference: format!("sim_{}", request.session_id.to_string().replace('-', "")),
            amount,
            status,
            pix,
        })
    }

    async fn fetch_status(&self, session_id: SessionId) -> Result<PaymentStatus> {
        let failing = self.failing_polls.load(Ordering::SeqCst);
        if failing > 0 {
            self.failing_polls.store(failing - 1, Ordering::SeqCst);
            return Err(CheckoutError::ProcessorUnavailable(
                "simulated network error".to_string(),
            ));
        }

        let mut charges = self.charges.lock().await;
        let charge = charges
            .get_mut(&session_id)
            .ok_or_else(|| CheckoutError::not_found("charge", session_id))?;
        charge.polls += 1;
        if let Some(after) = self.behavior.settle_after_polls
            && charge.polls >= after
            && !charge.status.is_terminal()
        {
            charge.status = self.behavior.settle_with;
        }
        Ok(charge.status)
    }
}
