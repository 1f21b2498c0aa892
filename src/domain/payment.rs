use super::customer::Customer;
use super::money::Money;
use super::pricing::PricingResult;
use crate::error::{CheckoutError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_bytes(&self) -> &[u8; 16] {
        self.0.as_bytes()
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for SessionId {
    type Err = CheckoutError;

    fn from_str(s: &str) -> Result<Self> {
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|_| CheckoutError::not_found("payment", s))
    }
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash, Clone, Copy)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentMethod {
    CreditCard,
    /// Instant transfer paid through a QR code within a time window.
    Pix,
}

impl fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::CreditCard => "CREDIT_CARD",
            Self::Pix => "PIX",
        })
    }
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash, Clone, Copy)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    Pending,
    Processing,
    Approved,
    Rejected,
    /// The PIX window elapsed before settlement. Not a decline.
    Expired,
    Cancelled,
}

impl PaymentStatus {
    pub const ALL: [Self; 6] = [
        Self::Pending,
        Self::Processing,
        Self::Approved,
        Self::Rejected,
        Self::Expired,
        Self::Cancelled,
    ];

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Approved | Self::Rejected | Self::Expired | Self::Cancelled
        )
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Pending => "PENDING",
            Self::Processing => "PROCESSING",
            Self::Approved => "APPROVED",
            Self::Rejected => "REJECTED",
            Self::Expired => "EXPIRED",
            Self::Cancelled => "CANCELLED",
        })
    }
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone)]
#[serde(rename_all = "camelCase")]
pub struct BillingAddress {
    pub street: String,
    pub number: String,
    pub neighborhood: String,
    pub zipcode: String,
    pub city: String,
    pub state: String,
}

/// Tokenized card reference. Raw card data never reaches this crate.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone)]
#[serde(rename_all = "camelCase")]
pub struct CardDetails {
    pub payment_token: String,
    pub billing_address: BillingAddress,
}

/// QR payload, copy-paste key and the authoritative payment deadline.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone)]
#[serde(rename_all = "camelCase")]
pub struct PixCharge {
    pub qr_code: String,
    pub key: String,
    pub expires_at: DateTime<Utc>,
}

/// Something that can move a session forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    /// Status reported by the processor, through a callback or a poll.
    Processor(PaymentStatus),
    /// User- or operator-initiated cancellation.
    Cancel,
    /// Re-evaluation of the PIX deadline.
    Tick,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Changed {
        from: PaymentStatus,
        to: PaymentStatus,
    },
    Unchanged,
}

/// One checkout's payment attempt.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
#[serde(rename_all = "camelCase")]
pub struct PaymentSession {
    pub id: SessionId,
    pub customer: Customer,
    pub amount: Money,
    pub discount_amount: Money,
    pub final_amount: Money,
    pub payment_method: PaymentMethod,
    pub installments: u32,
    pub status: PaymentStatus,
    /// Set only when the coupon discount is the one applied to the price.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coupon_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub processor_reference: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pix: Option<PixCharge>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PaymentSession {
    pub fn open(
        id: SessionId,
        customer: Customer,
        pricing: &PricingResult,
        method: PaymentMethod,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            customer,
            amount: pricing.base_amount,
            discount_amount: pricing.discount_amount,
            final_amount: pricing.final_amount,
            payment_method: method,
            installments: pricing.installments.count,
            status: PaymentStatus::Pending,
            coupon_code: None,
            processor_reference: None,
            pix: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.pix.as_ref().map(|pix| pix.expires_at)
    }

    /// Whether the PIX window has elapsed at `now`. Always re-derived from
    /// `expires_at`; credit-card sessions never expire.
    pub fn is_past_deadline(&self, now: DateTime<Utc>) -> bool {
        self.expires_at().is_some_and(|deadline| now >= deadline)
    }

    /// Time left to pay, clamped at zero. `None` when the session has no deadline.
    pub fn remaining(&self, now: DateTime<Utc>) -> Option<chrono::Duration> {
        self.expires_at()
            .map(|deadline| (deadline - now).max(chrono::Duration::zero()))
    }

    /// Applies an event and returns what changed.
    ///
    /// The deadline is evaluated before anything else, so an outcome arriving
    /// after `expires_at` finds the session already expired. Re-delivering the
    /// status a terminal session already has is a no-op; anything else that
    /// tries to leave a terminal status is an error. An expiry detected on the
    /// way in stays applied even when the event itself is rejected.
    pub fn apply(&mut self, event: SessionEvent, now: DateTime<Utc>) -> Result<Transition> {
        let from = self.status;
        if !from.is_terminal() && self.is_past_deadline(now) {
            self.move_to(PaymentStatus::Expired, now);
        }

        let target = match event {
            SessionEvent::Tick => None,
            SessionEvent::Cancel => Some(PaymentStatus::Cancelled),
            SessionEvent::Processor(status) => Some(status),
        };

        match target {
            None => {}
            Some(to) if to == self.status => {}
            Some(to) if self.status.is_terminal() => {
                return Err(CheckoutError::InvalidTransition {
                    id: self.id,
                    from: self.status,
                    to,
                });
            }
            // Only sessions with a payment window can expire.
            Some(PaymentStatus::Expired) if self.pix.is_none() => {
                return Err(CheckoutError::InvalidTransition {
                    id: self.id,
                    from: self.status,
                    to: PaymentStatus::Expired,
                });
            }
            // A stale PENDING report never moves a session backwards.
            Some(PaymentStatus::Pending) => {}
            Some(to) => self.move_to(to, now),
        }

        if self.status == from {
            Ok(Transition::Unchanged)
        } else {
            Ok(Transition::Changed {
                from,
                to: self.status,
            })
        }
    }

    fn move_to(&mut self, status: PaymentStatus, now: DateTime<Utc>) {
        self.status = status;
        self.updated_at = now;
    }
}
