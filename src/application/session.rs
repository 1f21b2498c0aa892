use crate::domain::clock::ClockRef;
use crate::domain::payment::{PaymentSession, PaymentStatus, SessionEvent, SessionId};
use crate::domain::ports::{CouponStoreRef, PaymentSessionStoreRef};
use crate::error::{CheckoutError, Result};
use tokio::sync::{Mutex, broadcast};

/// Capacity of the change feed. Slow subscribers skip ahead and reload.
const CHANGE_FEED_CAPACITY: usize = 64;

/// An effective status change of a session.
#[derive(Debug, Clone)]
pub struct SessionChange {
    pub from: PaymentStatus,
    pub session: PaymentSession,
}

/// Owns every status change of persisted payment sessions.
///
/// Processor callbacks, poll results, deadline ticks and cancellations all
/// funnel through [`apply`](Self::apply). Applications are serialized, so a
/// callback and a poll racing to deliver the same outcome apply it once and
/// the second delivery is a no-op.
pub struct PaymentSessionStateMachine {
    sessions: PaymentSessionStoreRef,
    coupons: CouponStoreRef,
    clock: ClockRef,
    serial: Mutex<()>,
    changes: broadcast::Sender<SessionChange>,
}

impl PaymentSessionStateMachine {
    pub fn new(sessions: PaymentSessionStoreRef, coupons: CouponStoreRef, clock: ClockRef) -> Self {
        let (changes, _) = broadcast::channel(CHANGE_FEED_CAPACITY);
        Self {
            sessions,
            coupons,
            clock,
            serial: Mutex::new(()),
            changes,
        }
    }

    pub fn clock(&self) -> &ClockRef {
        &self.clock
    }

    /// Feed of every effective transition, in application order.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionChange> {
        self.changes.subscribe()
    }

    /// Persists a freshly created session.
    pub async fn open(&self, session: PaymentSession) -> Result<PaymentSession> {
        let _serial = self.serial.lock().await;
        if session.status.is_terminal() {
            return Err(CheckoutError::InvalidTransition {
                id: session.id,
                from: PaymentStatus::Pending,
                to: session.status,
            });
        }
        self.sessions.store(session.clone()).await?;
        tracing::info!(
            session = %session.id,
            method = %session.payment_method,
            amount = %session.final_amount,
            status = %session.status,
            "payment session created"
        );
        Ok(session)
    }

    pub async fn get(&self, id: SessionId) -> Result<PaymentSession> {
        self.sessions
            .get(id)
            .await?
            .ok_or_else(|| CheckoutError::not_found("payment", id))
    }

    /// Applies an event to a stored session and returns its resulting state.
    ///
    /// A deadline found elapsed on the way in is persisted even when the event
    /// itself is rejected.
    pub async fn apply(&self, id: SessionId, event: SessionEvent) -> Result<PaymentSession> {
        let _serial = self.serial.lock().await;
        let mut session = self.get(id).await?;
        let before = session.status;
        let result = session.apply(event, self.clock.now());

        if session.status != before {
            self.sessions.store(session.clone()).await?;
            self.on_changed(before, &session).await;
        }

        match result {
            Ok(_) => Ok(session),
            Err(err) => {
                tracing::warn!(session = %id, ?event, error = %err, "transition refused");
                Err(err)
            }
        }
    }

    /// Records a status reported by the processor.
    pub async fn notify(&self, id: SessionId, status: PaymentStatus) -> Result<PaymentSession> {
        self.apply(id, SessionEvent::Processor(status)).await
    }

    pub async fn cancel(&self, id: SessionId) -> Result<PaymentSession> {
        self.apply(id, SessionEvent::Cancel).await
    }

    /// Re-evaluates the PIX deadline against the current time.
    pub async fn evaluate(&self, id: SessionId) -> Result<PaymentSession> {
        self.apply(id, SessionEvent::Tick).await
    }

    async fn on_changed(&self, from: PaymentStatus, session: &PaymentSession) {
        tracing::info!(
            session = %session.id,
            %from,
            to = %session.status,
            "payment session transitioned"
        );

        if session.status == PaymentStatus::Approved
            && let Some(code) = &session.coupon_code
        {
            match self.coupons.redeem(code).await {
                Ok(coupon) => tracing::info!(
                    session = %session.id,
                    code = %coupon.code,
                    uses = coupon.current_uses,
                    "coupon redeemed"
                ),
                // The payment went through; the quota overrun is for an operator.
                Err(err) => tracing::warn!(
                    session = %session.id,
                    %code,
                    error = %err,
                    "coupon redemption failed after approval"
                ),
            }
        }

        let _ = self.changes.send(SessionChange {
            from,
            session: session.clone(),
        });
    }
}
