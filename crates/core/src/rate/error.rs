//! Rate error types.

use chrono::{DateTime, Utc};
use sarraf_shared::types::{Currency, Money, MoneyError, RateId, TenantId};
use thiserror::Error;

/// Errors that can occur during rate lookup and conversion.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RateError {
    /// No applicable rate for the tenant/branch/pair at the given instant.
    #[error("No exchange rate for {from}/{to} under tenant {tenant} at {at}")]
    NotFound {
        /// Requesting tenant.
        tenant: TenantId,
        /// Source currency.
        from: Currency,
        /// Target currency.
        to: Currency,
        /// Lookup instant.
        at: DateTime<Utc>,
    },

    /// The amount's currency is not part of the rate's pair.
    #[error("Currency {0} is not part of this rate's pair")]
    CurrencyNotInPair(Currency),

    /// The amount is outside the rate's allowed range.
    #[error("Amount {amount} outside allowed range [{min}, {max}]")]
    AmountOutOfRange {
        /// The offending amount.
        amount: Money,
        /// Minimum allowed amount.
        min: Money,
        /// Maximum allowed amount.
        max: Money,
    },

    /// No rate row with this id.
    #[error("Exchange rate row not found: {0}")]
    RowNotFound(RateId),

    /// Rates must be strictly positive.
    #[error("Exchange rate must be positive")]
    NonPositiveRate,

    /// The rate source is transiently unavailable; safe to retry.
    #[error("Rate source unavailable: {0}")]
    Unavailable(String),

    /// Monetary arithmetic failed while applying the rate.
    #[error(transparent)]
    Money(#[from] MoneyError),
}

impl From<RateError> for sarraf_shared::ServiceError {
    fn from(err: RateError) -> Self {
        use sarraf_shared::ErrorKind;
        let kind = match &err {
            RateError::NotFound { .. } => ErrorKind::RateUnavailable,
            RateError::CurrencyNotInPair(_) => ErrorKind::CurrencyMismatch,
            RateError::RowNotFound(_) => ErrorKind::NotFound,
            RateError::AmountOutOfRange { .. } | RateError::NonPositiveRate => {
                ErrorKind::InvalidInput
            }
            RateError::Unavailable(_) => ErrorKind::Unavailable,
            RateError::Money(inner) => return Self::from(*inner),
        };
        Self::new(kind, err.to_string())
    }
}
