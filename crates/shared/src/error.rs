//! Service-wide error taxonomy.
//!
//! Every error that crosses the engine boundary is a `ServiceError`: a stable
//! `{kind, message, details}` triple. Module-level errors (ledger, accounts,
//! rates, ...) convert into this type at the boundary; presentation concerns
//! such as localisation live in the external layer.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias using `ServiceError`.
pub type ServiceResult<T> = Result<T, ServiceError>;

/// Stable error kinds surfaced by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Schema/range/format violation detected before any state change.
    InvalidInput,
    /// A reference would cross tenant boundaries. Fatal; must alert.
    TenantIsolationViolation,
    /// Transaction, account, or rate not found.
    NotFound,
    /// The state machine forbids this move.
    InvalidTransition,
    /// Account available balance is below the required amount.
    InsufficientFunds,
    /// Amounts in different currencies were combined.
    CurrencyMismatch,
    /// No applicable exchange rate for this tenant/branch/pair.
    RateUnavailable,
    /// Duplicate transaction id or optimistic-lock collision.
    Conflict,
    /// Transient store failure; retried internally before surfacing.
    Unavailable,
    /// Ledger integrity hash mismatch detected during a read.
    IntegrityFailure,
    /// Deadline expired before the commit point.
    Timeout,
}

impl ErrorKind {
    /// Returns the stable error code for API responses.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::InvalidInput => "INVALID_INPUT",
            Self::TenantIsolationViolation => "TENANT_ISOLATION_VIOLATION",
            Self::NotFound => "NOT_FOUND",
            Self::InvalidTransition => "INVALID_TRANSITION",
            Self::InsufficientFunds => "INSUFFICIENT_FUNDS",
            Self::CurrencyMismatch => "CURRENCY_MISMATCH",
            Self::RateUnavailable => "RATE_UNAVAILABLE",
            Self::Conflict => "CONFLICT",
            Self::Unavailable => "UNAVAILABLE",
            Self::IntegrityFailure => "INTEGRITY_FAILURE",
            Self::Timeout => "TIMEOUT",
        }
    }

    /// Returns true if the caller may retry the operation with backoff.
    #[must_use]
    pub const fn is_retryable(self) -> bool {
        matches!(self, Self::Conflict | Self::Unavailable)
    }

    /// Returns true if the error must raise an operational alert.
    #[must_use]
    pub const fn must_alert(self) -> bool {
        matches!(self, Self::TenantIsolationViolation | Self::IntegrityFailure)
    }
}

/// A service error: stable kind, human-readable message, opaque details.
#[derive(Debug, Clone, Error, Serialize, Deserialize)]
#[error("{}: {message}", .kind.code())]
pub struct ServiceError {
    /// The stable error kind.
    pub kind: ErrorKind,
    /// Human-readable message (localisation is a presentation concern).
    pub message: String,
    /// Structured context for the caller, e.g. the offending ids.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ServiceError {
    /// Creates an error of the given kind with a message.
    #[must_use]
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            details: None,
        }
    }

    /// Attaches structured details to the error.
    #[must_use]
    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    /// Shorthand for an `InvalidInput` error.
    #[must_use]
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidInput, message)
    }

    /// Shorthand for a `NotFound` error.
    #[must_use]
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, message)
    }

    /// Shorthand for a `Conflict` error.
    #[must_use]
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Conflict, message)
    }

    /// Returns true if the caller may retry with backoff.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        self.kind.is_retryable()
    }
}

impl From<crate::types::money::MoneyError> for ServiceError {
    fn from(err: crate::types::money::MoneyError) -> Self {
        use crate::types::money::MoneyError;
        let kind = match err {
            MoneyError::CurrencyMismatch { .. } => ErrorKind::CurrencyMismatch,
            MoneyError::Overflow | MoneyError::NegativeNotAllowed => ErrorKind::InvalidInput,
        };
        Self::new(kind, err.to_string())
    }
}
