//! Transaction state errors.

use thiserror::Error;

use super::types::TransactionStatus;

/// Errors from the transaction state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum StateError {
    /// The state machine forbids this move.
    #[error("Invalid transition from {from:?} to {to:?}")]
    InvalidTransition {
        /// Current status.
        from: TransactionStatus,
        /// Requested status.
        to: TransactionStatus,
    },

    /// Only completed transactions can be reversed.
    #[error("Cannot reverse a transaction in status {0:?}")]
    ReverseRequiresCompleted(TransactionStatus),

    /// The transaction has already been reversed.
    #[error("Transaction already reversed")]
    AlreadyReversed,

    /// Financial fields are immutable after settlement.
    #[error("Financial fields are immutable after settlement; only notes, tags, and metadata may change")]
    FinancialFieldsImmutable,
}

impl From<StateError> for sarraf_shared::ServiceError {
    fn from(err: StateError) -> Self {
        use sarraf_shared::ErrorKind;
        let kind = match err {
            StateError::InvalidTransition { .. }
            | StateError::ReverseRequiresCompleted(_)
            | StateError::AlreadyReversed => ErrorKind::InvalidTransition,
            StateError::FinancialFieldsImmutable => ErrorKind::InvalidInput,
        };
        Self::new(kind, err.to_string())
    }
}
