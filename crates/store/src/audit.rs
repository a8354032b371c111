//! Append-only audit log.
//!
//! One uniform trail per tenant; entries are appended and never rewritten.

use std::sync::RwLock;

use sarraf_core::audit::{AuditAction, AuditEntry};
use sarraf_shared::types::TenantId;

/// Thread-safe in-memory audit log.
#[derive(Debug, Default)]
pub struct InMemoryAuditLog {
    entries: RwLock<Vec<AuditEntry>>,
}

impl InMemoryAuditLog {
    /// Creates an empty log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an entry.
    pub fn append(&self, entry: AuditEntry) {
        self.entries
            .write()
            .expect("audit log lock poisoned")
            .push(entry);
    }

    /// All entries for a tenant, in append order.
    #[must_use]
    pub fn for_tenant(&self, tenant_id: TenantId) -> Vec<AuditEntry> {
        self.entries
            .read()
            .expect("audit log lock poisoned")
            .iter()
            .filter(|e| e.tenant_id == tenant_id)
            .cloned()
            .collect()
    }

    /// A tenant's entries for one aggregate, in append order.
    #[must_use]
    pub fn for_aggregate(&self, tenant_id: TenantId, aggregate: &str) -> Vec<AuditEntry> {
        self.entries
            .read()
            .expect("audit log lock poisoned")
            .iter()
            .filter(|e| e.tenant_id == tenant_id && e.aggregate == aggregate)
            .cloned()
            .collect()
    }

    /// A tenant's entries with a given action, in append order.
    #[must_use]
    pub fn for_action(&self, tenant_id: TenantId, action: AuditAction) -> Vec<AuditEntry> {
        self.entries
            .read()
            .expect("audit log lock poisoned")
            .iter()
            .filter(|e| e.tenant_id == tenant_id && e.action == action)
            .cloned()
            .collect()
    }
}
