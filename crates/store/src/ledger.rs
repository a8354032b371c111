//! The ledger store: atomic batch commits, reversal, balances, integrity.
//!
//! `post_batch` is the only insertion path. A batch commits all-or-nothing
//! under the store's write lock, holding the per-account locks of every
//! referenced account for the duration, acquired in sorted order so
//! concurrent batches cannot deadlock.

use std::sync::{Arc, Mutex, RwLock};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use sarraf_core::audit::{AuditAction, AuditEntry};
use sarraf_core::ledger::{
    check_balance, mirror_entry, residual_entry, EntryStatus, LedgerEntry, LedgerError, NewEntry,
};
use sarraf_shared::types::{
    AccountCode, AccountId, ActorId, Currency, LedgerEntryId, TenantId, TransactionId,
};
use serde::{Deserialize, Serialize};

use crate::audit::InMemoryAuditLog;

/// Outcome of a tenant-wide integrity validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntegrityReport {
    /// Committed entries whose hashes verify.
    pub valid: usize,
    /// Committed entries whose hashes do not verify.
    pub invalid: usize,
    /// Ids of the offending entries.
    pub mismatched: Vec<LedgerEntryId>,
}

impl IntegrityReport {
    /// Returns true when no entry failed verification.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.invalid == 0
    }
}

/// Thread-safe in-memory double-entry ledger.
pub struct InMemoryLedger {
    entries: RwLock<Vec<LedgerEntry>>,
    account_locks: DashMap<AccountId, Arc<Mutex<()>>>,
    audit: Arc<InMemoryAuditLog>,
}

impl InMemoryLedger {
    /// Creates an empty ledger appending to the given audit log.
    #[must_use]
    pub fn new(audit: Arc<InMemoryAuditLog>) -> Self {
        Self {
            entries: RwLock::new(Vec::new()),
            account_locks: DashMap::new(),
            audit,
        }
    }

    /// Posts a balanced batch of entries for one transaction.
    ///
    /// The batch is validated against the balance law in the tenant base
    /// currency; a rounding residual within tolerance is posted to
    /// `residual_account`. All entries commit with `posted` status or none
    /// do.
    pub fn post_batch(
        &self,
        tenant_id: TenantId,
        transaction_id: &TransactionId,
        mut inputs: Vec<NewEntry>,
        actor: ActorId,
        base: Currency,
        residual_account: &AccountCode,
    ) -> Result<Vec<LedgerEntry>, LedgerError> {
        let check = check_balance(&inputs, base)?;
        if let Some(residual) = residual_entry(&check, residual_account, base) {
            inputs.push(residual);
        }

        // Lock every referenced account, sorted by id to avoid deadlock.
        let mut account_ids: Vec<AccountId> =
            inputs.iter().filter_map(|e| e.account_id).collect();
        account_ids.sort_unstable();
        account_ids.dedup();
        let locks: Vec<Arc<Mutex<()>>> = account_ids
            .iter()
            .map(|id| self.account_locks.entry(*id).or_default().clone())
            .collect();
        let _guards: Vec<_> = locks
            .iter()
            .map(|m| m.lock().expect("ledger account lock poisoned"))
            .collect();

        let now = Utc::now();
        let mut batch = Vec::with_capacity(inputs.len());
        for input in &inputs {
            let mut entry =
                LedgerEntry::from_input(tenant_id, transaction_id.clone(), input, actor, now)?;
            entry.status = EntryStatus::Posted;
            batch.push(entry);
        }

        self.entries
            .write()
            .expect("ledger lock poisoned")
            .extend(batch.iter().cloned());

        tracing::info!(
            tenant = %tenant_id,
            transaction = %transaction_id,
            entries = batch.len(),
            "posted ledger batch"
        );
        self.audit.append(
            AuditEntry::new(
                tenant_id,
                actor,
                AuditAction::BatchPosted,
                format!("transaction:{transaction_id}"),
            )
            .with_after(serde_json::json!({ "entries": batch.len() })),
        );

        Ok(batch)
    }

    /// Reverses a posted entry: commits a posted mirror and marks the
    /// original `reversed`, atomically.
    pub fn reverse(
        &self,
        tenant_id: TenantId,
        entry_id: LedgerEntryId,
        reason: &str,
        actor: ActorId,
    ) -> Result<LedgerEntry, LedgerError> {
        let mirror = {
            let mut entries = self.entries.write().expect("ledger lock poisoned");
            let position = entries
                .iter()
                .position(|e| e.id == entry_id)
                .ok_or(LedgerError::EntryNotFound(entry_id))?;
            if entries[position].tenant_id != tenant_id {
                return Err(LedgerError::TenantMismatch(entry_id));
            }

            let mirror = mirror_entry(&entries[position], actor, Utc::now())?;
            entries[position].status = EntryStatus::Reversed;
            entries.push(mirror.clone());
            mirror
        };

        self.audit.append(
            AuditEntry::new(
                tenant_id,
                actor,
                AuditAction::EntryReversed,
                format!("ledger_entry:{entry_id}"),
            )
            .with_after(serde_json::json!({ "mirror": mirror.id }))
            .with_reason(reason),
        );

        Ok(mirror)
    }

    /// Signed sum (debit − credit) of committed entries for a balance
    /// account, in entry minor units, up to `as_of`.
    ///
    /// Reversed entries still count; their posted mirrors cancel them.
    #[must_use]
    pub fn balance(
        &self,
        tenant_id: TenantId,
        account_id: AccountId,
        as_of: Option<DateTime<Utc>>,
    ) -> i64 {
        self.sum_committed(tenant_id, as_of, |e| e.account_id == Some(account_id))
    }

    /// Signed sum of committed entries for a chart code, up to `as_of`.
    #[must_use]
    pub fn balance_by_code(
        &self,
        tenant_id: TenantId,
        account_code: &AccountCode,
        as_of: Option<DateTime<Utc>>,
    ) -> i64 {
        self.sum_committed(tenant_id, as_of, |e| &e.account_code == account_code)
    }

    /// All entries for a transaction, with a hash-verification verdict.
    ///
    /// Reads never fail on a hash mismatch; the caller annotates the
    /// transaction and degrades it to read-only.
    #[must_use]
    pub fn entries_for_transaction(
        &self,
        tenant_id: TenantId,
        transaction_id: &TransactionId,
    ) -> (Vec<LedgerEntry>, bool) {
        let entries: Vec<LedgerEntry> = self
            .entries
            .read()
            .expect("ledger lock poisoned")
            .iter()
            .filter(|e| e.tenant_id == tenant_id && &e.transaction_id == transaction_id)
            .cloned()
            .collect();

        let all_valid = entries.iter().all(LedgerEntry::verify);
        (entries, all_valid)
    }

    /// Verifies every committed entry of a tenant.
    #[must_use]
    pub fn validate_integrity(&self, tenant_id: TenantId) -> IntegrityReport {
        let entries = self.entries.read().expect("ledger lock poisoned");
        let mut report = IntegrityReport {
            valid: 0,
            invalid: 0,
            mismatched: Vec::new(),
        };

        for entry in entries
            .iter()
            .filter(|e| e.tenant_id == tenant_id && e.is_committed())
        {
            if entry.verify() {
                report.valid += 1;
            } else {
                report.invalid += 1;
                report.mismatched.push(entry.id);
            }
        }

        if !report.is_clean() {
            tracing::error!(
                tenant = %tenant_id,
                invalid = report.invalid,
                "ledger integrity validation found mismatched entries"
            );
        }
        report
    }

    /// Mutates a stored entry in place, bypassing all validation.
    ///
    /// This simulates out-of-band store mutation for integrity drills; the
    /// stored hash is left untouched so `validate_integrity` can catch the
    /// change. Not part of the service surface.
    #[doc(hidden)]
    pub fn apply_raw_mutation(
        &self,
        entry_id: LedgerEntryId,
        mutate: impl FnOnce(&mut LedgerEntry),
    ) -> bool {
        let mut entries = self.entries.write().expect("ledger lock poisoned");
        match entries.iter_mut().find(|e| e.id == entry_id) {
            Some(entry) => {
                mutate(entry);
                true
            }
            None => false,
        }
    }

    fn sum_committed(
        &self,
        tenant_id: TenantId,
        as_of: Option<DateTime<Utc>>,
        select: impl Fn(&LedgerEntry) -> bool,
    ) -> i64 {
        self.entries
            .read()
            .expect("ledger lock poisoned")
            .iter()
            .filter(|e| e.tenant_id == tenant_id && e.is_committed() && select(e))
            .filter(|e| as_of.is_none_or(|cutoff| e.created_at <= cutoff))
            .map(LedgerEntry::signed_minor)
            .sum()
    }
}

impl std::fmt::Debug for InMemoryLedger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let entries = self.entries.read().expect("ledger lock poisoned");
        f.debug_struct("InMemoryLedger")
            .field("entries", &entries.len())
            .finish()
    }
}
