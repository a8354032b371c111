//! Payment split domain types.

use chrono::{DateTime, Utc};
use sarraf_shared::types::{AccountCode, ActorId, Money};
use serde::{Deserialize, Serialize};

/// Status of a single payment slot.
///
/// Transitions form the DAG `pending → paid → verified`; `paid → pending`
/// happens only through a reject decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SlotStatus {
    /// Waiting for a receipt.
    Pending,
    /// Receipt attached, awaiting verification.
    Paid,
    /// Receipt approved.
    Verified,
}

/// Metadata for an uploaded receipt.
///
/// The file itself lives in external object storage; the core keeps only
/// the reference and provenance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceiptMeta {
    /// Opaque reference into the upload store.
    pub file_ref: String,
    /// Who uploaded the receipt.
    pub uploaded_by: ActorId,
    /// Upload instant.
    pub uploaded_at: DateTime<Utc>,
    /// Free-form note from the uploader.
    pub note: Option<String>,
}

/// Specification for one slot when building a split.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotSpec {
    /// Named payment sub-account receiving this portion.
    pub account_ref: AccountCode,
    /// Expected amount for this slot.
    pub expected: Money,
}

/// One of the sub-accounts a transaction's payment is split into.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentSlot {
    /// Named payment sub-account receiving this portion.
    pub account_ref: AccountCode,
    /// Expected amount for this slot.
    pub expected: Money,
    /// Current status.
    pub status: SlotStatus,
    /// The attached receipt, while one is present.
    pub receipt: Option<ReceiptMeta>,
}

/// Verification decision for a paid slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerifyDecision {
    /// Accept the receipt; the slot becomes verified.
    Approve,
    /// Refuse the receipt; the slot returns to pending and the receipt is cleared.
    Reject,
    /// Keep the slot paid and ask the customer for clarification.
    RequestClarification,
}

/// What a verification decision did to the slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotOutcome {
    /// The slot is now verified.
    Verified,
    /// The slot returned to pending.
    Rejected,
    /// The slot stayed paid pending clarification.
    ClarificationRequested,
}

/// Progress of a split's verification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SplitProgress {
    /// Number of verified slots.
    pub completed: usize,
    /// Total number of slots.
    pub total: usize,
    /// Whole-number percentage of verified slots.
    pub percentage: u8,
}
