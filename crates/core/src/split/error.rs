//! Payment split error types.

use sarraf_shared::types::{Money, MoneyError};
use thiserror::Error;

use super::types::SlotStatus;

/// Errors that can occur while tracking a payment split.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SplitError {
    /// A split must contain at least one slot.
    #[error("Payment split must contain at least one slot")]
    EmptySplit,

    /// Slot index out of range.
    #[error("Payment slot {index} out of range (split has {len} slots)")]
    SlotOutOfRange {
        /// The requested index.
        index: usize,
        /// Number of slots in the split.
        len: usize,
    },

    /// Each slot's expected amount must be strictly positive.
    #[error("Payment slot {0} must expect a positive amount")]
    NonPositiveSlot(usize),

    /// All slots must share the owed currency.
    #[error("Payment slots must all be denominated in the owed currency")]
    CurrencyMixed,

    /// Slot expected amounts must sum to the total owed.
    #[error("Payment slots sum to {slot_sum}, but the transaction owes {total_owed}")]
    SumMismatch {
        /// What the slots add up to.
        slot_sum: Money,
        /// What the transaction owes.
        total_owed: Money,
    },

    /// Receipts attach only to pending slots.
    #[error("Cannot attach receipt to slot {index} in status {status:?}")]
    ReceiptRequiresPendingSlot {
        /// The slot index.
        index: usize,
        /// Its current status.
        status: SlotStatus,
    },

    /// Verification decisions apply only to paid slots.
    #[error("Cannot verify slot {index} in status {status:?}")]
    VerifyRequiresPaidSlot {
        /// The slot index.
        index: usize,
        /// Its current status.
        status: SlotStatus,
    },

    /// Monetary arithmetic failed.
    #[error(transparent)]
    Money(#[from] MoneyError),
}

impl From<SplitError> for sarraf_shared::ServiceError {
    fn from(err: SplitError) -> Self {
        use sarraf_shared::ErrorKind;
        let kind = match &err {
            SplitError::EmptySplit
            | SplitError::SlotOutOfRange { .. }
            | SplitError::NonPositiveSlot(_)
            | SplitError::CurrencyMixed
            | SplitError::SumMismatch { .. } => ErrorKind::InvalidInput,
            SplitError::ReceiptRequiresPendingSlot { .. }
            | SplitError::VerifyRequiresPaidSlot { .. } => ErrorKind::InvalidTransition,
            SplitError::Money(inner) => return Self::from(*inner),
        };
        Self::new(kind, err.to_string())
    }
}
