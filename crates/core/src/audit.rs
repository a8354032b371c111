//! Uniform append-only audit entries.
//!
//! Every aggregate (account, transaction, rate) gets one audit trail with
//! the same shape. Entries are appended, never rewritten; `before`/`after`
//! snapshots are opaque JSON the core never interprets.

use chrono::{DateTime, Utc};
use sarraf_shared::types::{ActorId, TenantId};
use serde::{Deserialize, Serialize};

/// What happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    /// A transaction was created.
    TransactionCreated,
    /// A receipt was attached to a payment slot.
    ReceiptAttached,
    /// A payment slot was approved.
    SlotVerified,
    /// A payment slot was rejected back to pending.
    SlotRejected,
    /// Clarification was requested on a paid slot.
    ClarificationRequested,
    /// The transaction changed status.
    StatusChanged,
    /// Funds moved from available to held.
    HoldPlaced,
    /// A hold was returned to available.
    HoldReleased,
    /// A hold was debited.
    HoldConsumed,
    /// An account balance mutation was applied.
    BalanceApplied,
    /// An account was frozen, closed, or reactivated.
    AccountStatusChanged,
    /// A ledger batch was posted.
    BatchPosted,
    /// A ledger entry was reversed.
    EntryReversed,
    /// A completed transaction was reversed.
    TransactionReversed,
    /// Notes, tags, or metadata changed.
    MetadataUpdated,
    /// A cross-tenant reference was attempted and refused.
    IsolationViolationAttempt,
    /// An exchange rate row was written.
    RateUpserted,
    /// An exchange rate row was deactivated.
    RateDeactivated,
    /// A ledger read hit a hash mismatch.
    IntegrityFlagged,
}

/// One appended audit record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEntry {
    /// Tenant whose trail this belongs to.
    pub tenant_id: TenantId,
    /// Who acted.
    pub actor: ActorId,
    /// When.
    pub timestamp: DateTime<Utc>,
    /// What happened.
    pub action: AuditAction,
    /// Aggregate key, e.g. `transaction:TEH12345678042` or `account:<uuid>`.
    pub aggregate: String,
    /// Opaque snapshot before the change.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub before: Option<serde_json::Value>,
    /// Opaque snapshot after the change.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub after: Option<serde_json::Value>,
    /// Operator-supplied reason, where one applies.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl AuditEntry {
    /// Creates a minimal entry; snapshots and reason attach via builders.
    #[must_use]
    pub fn new(
        tenant_id: TenantId,
        actor: ActorId,
        action: AuditAction,
        aggregate: impl Into<String>,
    ) -> Self {
        Self {
            tenant_id,
            actor,
            timestamp: Utc::now(),
            action,
            aggregate: aggregate.into(),
            before: None,
            after: None,
            reason: None,
        }
    }

    /// Attaches the before snapshot.
    #[must_use]
    pub fn with_before(mut self, before: serde_json::Value) -> Self {
        self.before = Some(before);
        self
    }

    /// Attaches the after snapshot.
    #[must_use]
    pub fn with_after(mut self, after: serde_json::Value) -> Self {
        self.after = Some(after);
        self
    }

    /// Attaches a reason.
    #[must_use]
    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }
}
