//! Transaction domain types.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sarraf_shared::types::{
    ActorId, BranchId, CustomerId, HoldId, Money, ReferenceNumber, TenantId, TransactionId,
};
use serde::{Deserialize, Serialize};

use crate::rate::RateKind;
use crate::split::PaymentSplit;

/// Kind of customer transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionType {
    /// Customer buys foreign currency with rial.
    CurrencyBuy,
    /// Customer sells foreign currency for rial.
    CurrencySell,
    /// Direct exchange between two foreign currencies.
    Exchange,
    /// Outbound remittance; the counterparty leg is external.
    Remittance,
    /// Earmarks customer funds without a conversion leg.
    Hold,
}

/// Lifecycle status of a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionStatus {
    /// Created; waiting for the first verified payment slot.
    PendingPayment,
    /// Some but not all slots verified.
    PartialPaid,
    /// Every slot verified; awaiting the operator.
    PaymentComplete,
    /// Settlement in flight.
    Processing,
    /// Settled; account and ledger effects committed.
    Completed,
    /// Cancelled before settlement. Terminal.
    Cancelled,
    /// Settlement aborted. Terminal.
    Failed,
}

impl TransactionStatus {
    /// Returns true for terminal statuses.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled | Self::Failed)
    }

    /// Returns true while cancellation is still legal (before settlement).
    #[must_use]
    pub const fn is_cancellable(self) -> bool {
        !self.is_terminal()
    }
}

/// One step in a transaction's status history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusChange {
    /// The status entered.
    pub status: TransactionStatus,
    /// When it was entered.
    pub at: DateTime<Utc>,
    /// Who drove the change.
    pub actor: ActorId,
    /// Operator-supplied reason, where one applies.
    pub reason: Option<String>,
}

/// A tagged note on a transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "text")]
pub enum Note {
    /// Written by the customer.
    Customer(String),
    /// Written by tenant staff.
    Staff(String),
    /// Emitted by the system.
    System(String),
}

/// A multi-currency customer transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    /// Human-readable id, unique per tenant.
    pub id: TransactionId,
    /// Globally unique reference number.
    pub reference: ReferenceNumber,
    /// Owning tenant.
    pub tenant_id: TenantId,
    /// The customer transacting.
    pub customer_id: CustomerId,
    /// Branch the transaction was created at, if any.
    pub branch_id: Option<BranchId>,
    /// Kind of transaction.
    pub tx_type: TransactionType,
    /// What the customer pays.
    pub amount_from: Money,
    /// What the customer receives.
    pub amount_to: Money,
    /// The rate value captured at creation.
    pub rate: Decimal,
    /// Which side of the quote applied.
    pub rate_kind: RateKind,
    /// Commission charged, in the paid currency.
    pub commission: Money,
    /// Total owed: paid amount plus commission.
    pub total_owed: Money,
    /// Current lifecycle status.
    pub status: TransactionStatus,
    /// The payment split this transaction owns.
    pub split: PaymentSplit,
    /// Hold placed at creation (sell/hold types), until consumed or released.
    pub hold_id: Option<HoldId>,
    /// Advisory risk score; never used for decisions in the core.
    pub risk_score: Option<u8>,
    /// Tagged notes.
    pub notes: Vec<Note>,
    /// Free-form tags.
    pub tags: Vec<String>,
    /// Opaque metadata blob; the core never inspects it.
    pub metadata: serde_json::Value,
    /// Actor that created the transaction.
    pub created_by: ActorId,
    /// Creation instant.
    pub created_at: DateTime<Utc>,
    /// Every status entered, in order.
    pub status_history: Vec<StatusChange>,
    /// Set once the transaction has been reversed.
    pub reversed: bool,
    /// When the reversal happened.
    pub reversed_at: Option<DateTime<Utc>>,
    /// Set when a ledger read for this transaction hit a hash mismatch.
    pub integrity_flagged: bool,
}

impl Transaction {
    /// Returns true if this transaction ever passed through `status`.
    #[must_use]
    pub fn ever_reached(&self, status: TransactionStatus) -> bool {
        self.status_history.iter().any(|c| c.status == status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_statuses() {
        assert!(TransactionStatus::Completed.is_terminal());
        assert!(TransactionStatus::Cancelled.is_terminal());
        assert!(TransactionStatus::Failed.is_terminal());
        assert!(!TransactionStatus::PendingPayment.is_terminal());
        assert!(!TransactionStatus::PartialPaid.is_terminal());
        assert!(!TransactionStatus::PaymentComplete.is_terminal());
        assert!(!TransactionStatus::Processing.is_terminal());
    }

    #[test]
    fn test_cancellable_statuses() {
        assert!(TransactionStatus::PendingPayment.is_cancellable());
        assert!(TransactionStatus::Processing.is_cancellable());
        assert!(!TransactionStatus::Completed.is_cancellable());
        assert!(!TransactionStatus::Failed.is_cancellable());
    }

    #[test]
    fn test_note_serialization() {
        let note = Note::Staff("verified by branch 3".to_string());
        let json = serde_json::to_value(&note).unwrap();
        assert_eq!(json["kind"], "staff");
        assert_eq!(json["text"], "verified by branch 3");
    }
}
