//! The remittance seam.
//!
//! For `remittance` transactions the counterparty leg is delegated to an
//! external service; the engine records only the local leg. Tests inject
//! the recording fake.

use std::sync::Mutex;

use sarraf_core::transaction::Transaction;
use sarraf_shared::types::TransactionId;
use sarraf_shared::ServiceError;

/// External service handling the counterparty leg of a remittance.
pub trait RemittanceService: Send + Sync {
    /// Dispatches the counterparty leg during settlement.
    ///
    /// A failure aborts the settlement atomically.
    fn dispatch(&self, transaction: &Transaction) -> Result<(), ServiceError>;
}

/// Default implementation: accepts every dispatch without side effects.
#[derive(Debug, Default)]
pub struct NullRemittance;

impl RemittanceService for NullRemittance {
    fn dispatch(&self, _transaction: &Transaction) -> Result<(), ServiceError> {
        Ok(())
    }
}

/// Test double that records dispatched transaction ids.
#[derive(Debug, Default)]
pub struct RecordingRemittance {
    dispatched: Mutex<Vec<TransactionId>>,
    fail_with: Mutex<Option<ServiceError>>,
}

impl RecordingRemittance {
    /// Creates an accepting recorder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next dispatches fail with the given error.
    pub fn fail_with(&self, err: ServiceError) {
        *self.fail_with.lock().expect("remittance lock poisoned") = Some(err);
    }

    /// Ids dispatched so far.
    #[must_use]
    pub fn dispatched(&self) -> Vec<TransactionId> {
        self.dispatched
            .lock()
            .expect("remittance lock poisoned")
            .clone()
    }
}

impl RemittanceService for RecordingRemittance {
    fn dispatch(&self, transaction: &Transaction) -> Result<(), ServiceError> {
        if let Some(err) = self.fail_with.lock().expect("remittance lock poisoned").clone() {
            return Err(err);
        }
        self.dispatched
            .lock()
            .expect("remittance lock poisoned")
            .push(transaction.id.clone());
        Ok(())
    }
}
