//! Ledger error types.

use sarraf_shared::types::{LedgerEntryId, MoneyError};
use thiserror::Error;

/// Errors that can occur during ledger operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
    /// A batch must have at least 2 entries.
    #[error("Ledger batch must have at least 2 entries")]
    InsufficientEntries,

    /// Entry amount cannot be zero.
    #[error("Entry amount cannot be zero")]
    ZeroAmount,

    /// Entry amount cannot be negative.
    #[error("Entry amount cannot be negative")]
    NegativeAmount,

    /// Embedded exchange rate must be positive.
    #[error("Entry exchange rate must be positive")]
    NonPositiveRate,

    /// The batch does not balance in the tenant base currency.
    #[error(
        "Batch is not balanced. Debit: {debit}, credit: {credit} base minor units (tolerance {tolerance})"
    )]
    UnbalancedBatch {
        /// Total debits in base minor units.
        debit: i64,
        /// Total credits in base minor units.
        credit: i64,
        /// Allowed residual in base minor units.
        tolerance: i64,
    },

    /// Entry not found.
    #[error("Ledger entry not found: {0}")]
    EntryNotFound(LedgerEntryId),

    /// The entry has already been reversed (or was never posted).
    #[error("Ledger entry already reversed: {0}")]
    AlreadyReversed(LedgerEntryId),

    /// The entry belongs to a different tenant.
    #[error("Ledger entry {0} belongs to a different tenant")]
    TenantMismatch(LedgerEntryId),

    /// Stored integrity hash does not match the recomputed one.
    #[error("Integrity hash mismatch for ledger entry {0}")]
    HashMismatch(LedgerEntryId),

    /// Monetary arithmetic failed.
    #[error(transparent)]
    Money(#[from] MoneyError),
}

impl From<LedgerError> for sarraf_shared::ServiceError {
    fn from(err: LedgerError) -> Self {
        use sarraf_shared::ErrorKind;
        let kind = match &err {
            LedgerError::InsufficientEntries
            | LedgerError::ZeroAmount
            | LedgerError::NegativeAmount
            | LedgerError::NonPositiveRate
            | LedgerError::UnbalancedBatch { .. } => ErrorKind::InvalidInput,
            LedgerError::EntryNotFound(_) => ErrorKind::NotFound,
            LedgerError::AlreadyReversed(_) => ErrorKind::InvalidTransition,
            LedgerError::TenantMismatch(_) => ErrorKind::TenantIsolationViolation,
            LedgerError::HashMismatch(_) => ErrorKind::IntegrityFailure,
            LedgerError::Money(inner) => return Self::from(*inner),
        };
        Self::new(kind, err.to_string())
    }
}
