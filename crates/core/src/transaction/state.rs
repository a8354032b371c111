//! The transaction state machine.
//!
//! Allowed transitions:
//!
//! | From | To | Trigger |
//! |---|---|---|
//! | `pending_payment` | `partial_paid` | first slot verified, progress < 100% |
//! | `partial_paid` | `payment_complete` | progress reaches 100% |
//! | `pending_payment` | `payment_complete` | single-slot transaction verified |
//! | `payment_complete` | `processing` | operator starts processing |
//! | `processing` | `completed` | settlement commits |
//! | any non-terminal | `cancelled` | operator command with reason |
//! | `processing` | `failed` | settlement aborts |
//!
//! Everything else is rejected.

use chrono::{DateTime, Utc};
use sarraf_shared::types::ActorId;

use super::error::StateError;
use super::types::{StatusChange, Transaction, TransactionStatus};

/// Returns true if the state machine allows `from -> to`.
#[must_use]
pub fn is_allowed(from: TransactionStatus, to: TransactionStatus) -> bool {
    use TransactionStatus as S;
    match (from, to) {
        (S::PendingPayment, S::PartialPaid | S::PaymentComplete)
        | (S::PartialPaid, S::PaymentComplete)
        | (S::PaymentComplete, S::Processing)
        | (S::Processing, S::Completed | S::Failed) => true,
        (from, S::Cancelled) => from.is_cancellable(),
        _ => false,
    }
}

impl Transaction {
    /// Moves the transaction to `to`, appending to the status history.
    ///
    /// # Errors
    ///
    /// `InvalidTransition` if the state machine forbids the move.
    pub fn transition(
        &mut self,
        to: TransactionStatus,
        actor: ActorId,
        reason: Option<String>,
        at: DateTime<Utc>,
    ) -> Result<(), StateError> {
        if !is_allowed(self.status, to) {
            return Err(StateError::InvalidTransition {
                from: self.status,
                to,
            });
        }

        self.status = to;
        self.status_history.push(StatusChange {
            status: to,
            at,
            actor,
            reason,
        });
        Ok(())
    }

    /// Validates that the transaction can be reversed now.
    ///
    /// # Errors
    ///
    /// `ReverseRequiresCompleted` before settlement, `AlreadyReversed` after
    /// a prior reversal.
    pub fn check_reversible(&self) -> Result<(), StateError> {
        if self.status != TransactionStatus::Completed {
            return Err(StateError::ReverseRequiresCompleted(self.status));
        }
        if self.reversed {
            return Err(StateError::AlreadyReversed);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    use TransactionStatus as S;

    #[rstest]
    #[case(S::PendingPayment, S::PartialPaid)]
    #[case(S::PendingPayment, S::PaymentComplete)]
    #[case(S::PartialPaid, S::PaymentComplete)]
    #[case(S::PaymentComplete, S::Processing)]
    #[case(S::Processing, S::Completed)]
    #[case(S::Processing, S::Failed)]
    #[case(S::PendingPayment, S::Cancelled)]
    #[case(S::PartialPaid, S::Cancelled)]
    #[case(S::PaymentComplete, S::Cancelled)]
    #[case(S::Processing, S::Cancelled)]
    fn test_allowed_transitions(#[case] from: S, #[case] to: S) {
        assert!(is_allowed(from, to));
    }

    #[rstest]
    #[case(S::PendingPayment, S::Completed)]
    #[case(S::PendingPayment, S::Processing)]
    #[case(S::PartialPaid, S::Completed)]
    #[case(S::PaymentComplete, S::Completed)]
    #[case(S::Completed, S::Processing)]
    #[case(S::Completed, S::Cancelled)]
    #[case(S::Cancelled, S::PendingPayment)]
    #[case(S::Failed, S::Processing)]
    #[case(S::PartialPaid, S::PendingPayment)]
    fn test_rejected_transitions(#[case] from: S, #[case] to: S) {
        assert!(!is_allowed(from, to));
    }
}
