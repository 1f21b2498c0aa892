use crate::domain::coupon::RejectionReason;
use crate::domain::money::Money;
use crate::domain::payment::{PaymentStatus, SessionId};
use rust_decimal::Decimal;
use std::fmt;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, CheckoutError>;

/// A single rejected input field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldError {
    pub field: &'static str,
    pub message: String,
}

impl FieldError {
    pub fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

/// Field-level validation failures, reported together.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldErrors(pub Vec<FieldError>);

impl FieldErrors {
    pub fn push(&mut self, field: &'static str, message: impl Into<String>) {
        self.0.push(FieldError::new(field, message));
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn contains(&self, field: &str) -> bool {
        self.0.iter().any(|e| e.field == field)
    }

    /// Turns the collected failures into an error, or `Ok` when there are none.
    pub fn into_result(self) -> Result<()> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(CheckoutError::ValidationFailed(self))
        }
    }
}

impl fmt::Display for FieldErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, err) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str("; ")?;
            }
            write!(f, "{}: {}", err.field, err.message)?;
        }
        Ok(())
    }
}

/// Broad category of a failure, deciding how a caller should react.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed input. Never retried; the caller corrects it.
    Validation,
    /// Inapplicable coupon, amount mismatch, invalid transition.
    BusinessRule,
    /// Processor or network unavailability.
    Transient,
    /// Missing or rejected credential; triggers re-authentication.
    Authentication,
    NotFound,
    Internal,
}

#[derive(Error, Debug)]
pub enum CheckoutError {
    #[error("Invalid amount: {0}")]
    InvalidAmount(Decimal),
    #[error("Invalid installments: {requested} (expected 1 to {max})")]
    InvalidInstallments { requested: u32, max: u32 },
    #[error("Validation failed: {0}")]
    ValidationFailed(FieldErrors),
    #[error("Coupon rejected: {0}")]
    CouponRejected(RejectionReason),
    #[error("Processor charged {charged} but checkout computed {expected}")]
    AmountMismatch { expected: Money, charged: Money },
    #[error("Cannot move payment {id} from {from} to {to}")]
    InvalidTransition {
        id: SessionId,
        from: PaymentStatus,
        to: PaymentStatus,
    },
    #[error("Payment processor unavailable: {0}")]
    ProcessorUnavailable(String),
    #[error("Payment processor returned an incomplete response: {0}")]
    ProcessorProtocol(String),
    #[error("Authentication required")]
    Unauthenticated,
    #[error("Invalid credentials")]
    InvalidCredentials,
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },
    #[error("Coupon already exists: {0}")]
    DuplicateCoupon(String),
    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Internal error: {0}")]
    InternalError(Box<dyn std::error::Error + Send + Sync>),
}

#[cfg(feature = "storage-rocksdb")]
impl From<rocksdb::Error> for CheckoutError {
    fn from(err: rocksdb::Error) -> Self {
        Self::InternalError(Box::new(err))
    }
}

impl CheckoutError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidAmount(_)
            | Self::InvalidInstallments { .. }
            | Self::ValidationFailed(_)
            | Self::CsvError(_)
            | Self::Serialization(_) => ErrorKind::Validation,
            Self::CouponRejected(_)
            | Self::AmountMismatch { .. }
            | Self::InvalidTransition { .. }
            | Self::DuplicateCoupon(_) => ErrorKind::BusinessRule,
            Self::ProcessorUnavailable(_) => ErrorKind::Transient,
            Self::Unauthenticated | Self::InvalidCredentials => ErrorKind::Authentication,
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::ProcessorProtocol(_) | Self::IoError(_) | Self::InternalError(_) => {
                ErrorKind::Internal
            }
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::Transient
    }

    /// HTTP-style status code for the error category.
    pub fn status_code(&self) -> u16 {
        match self.kind() {
            ErrorKind::Validation | ErrorKind::BusinessRule => 400,
            ErrorKind::Authentication => 401,
            ErrorKind::NotFound => 404,
            ErrorKind::Transient => 503,
            ErrorKind::Internal => 500,
        }
    }

    pub(crate) fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }
}
