//! The rate store: the `RateProvider` implementation.
//!
//! Rate rows are tenant-sharded and cached. The cache is invalidated on
//! every write, as the provider contract requires. At most one active row
//! exists per (tenant, branch, pair); an upsert expires the previous one.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use moka::sync::Cache;
use sarraf_core::audit::{AuditAction, AuditEntry};
use sarraf_core::rate::{pick_applicable, ExchangeRate, RateError, RateProvider, RateStatus};
use sarraf_shared::types::{ActorId, BranchId, Currency, RateId, TenantId};

use crate::audit::InMemoryAuditLog;

type LookupKey = (TenantId, Option<BranchId>, Currency, Currency);

/// Cache capacity; lookups are hot on the transaction-create path.
const CACHE_CAPACITY: u64 = 4_096;

/// Thread-safe in-memory rate store with a read cache.
pub struct InMemoryRates {
    rows: DashMap<TenantId, Vec<ExchangeRate>>,
    cache: Cache<LookupKey, ExchangeRate>,
    audit: Arc<InMemoryAuditLog>,
}

impl InMemoryRates {
    /// Creates an empty store appending to the given audit log.
    #[must_use]
    pub fn new(audit: Arc<InMemoryAuditLog>) -> Self {
        Self {
            rows: DashMap::new(),
            cache: Cache::new(CACHE_CAPACITY),
            audit,
        }
    }

    /// Writes a rate row, expiring the previously active row for the same
    /// (branch, pair) scope. Invalidates the read cache.
    pub fn upsert(&self, rate: ExchangeRate, actor: ActorId) -> Result<RateId, RateError> {
        if rate.buy_rate <= rust_decimal::Decimal::ZERO
            || rate.sell_rate <= rust_decimal::Decimal::ZERO
        {
            return Err(RateError::NonPositiveRate);
        }

        let rate_id = rate.id;
        let tenant_id = rate.tenant_id;
        {
            let mut rows = self.rows.entry(tenant_id).or_default();
            for row in rows.iter_mut() {
                let same_scope = row.branch_id == rate.branch_id
                    && row.from_currency == rate.from_currency
                    && row.to_currency == rate.to_currency;
                if same_scope && row.status == RateStatus::Active {
                    row.status = RateStatus::Expired;
                }
            }
            rows.push(rate);
        }
        self.cache.invalidate_all();

        self.audit.append(AuditEntry::new(
            tenant_id,
            actor,
            AuditAction::RateUpserted,
            format!("rate:{rate_id}"),
        ));
        Ok(rate_id)
    }

    /// Administratively disables a rate row. Invalidates the read cache.
    pub fn deactivate(
        &self,
        tenant_id: TenantId,
        rate_id: RateId,
        actor: ActorId,
    ) -> Result<(), RateError> {
        let mut rows = self
            .rows
            .get_mut(&tenant_id)
            .ok_or(RateError::RowNotFound(rate_id))?;

        let row = rows
            .iter_mut()
            .find(|r| r.id == rate_id)
            .ok_or(RateError::RowNotFound(rate_id))?;
        row.status = RateStatus::Inactive;
        drop(rows);

        self.cache.invalidate_all();
        self.audit.append(AuditEntry::new(
            tenant_id,
            actor,
            AuditAction::RateDeactivated,
            format!("rate:{rate_id}"),
        ));
        Ok(())
    }

    fn not_found(
        &self,
        tenant: TenantId,
        from: Currency,
        to: Currency,
        at: DateTime<Utc>,
    ) -> RateError {
        RateError::NotFound {
            tenant,
            from,
            to,
            at,
        }
    }

    fn lookup_key(
        tenant_id: TenantId,
        branch_id: Option<BranchId>,
        from: Currency,
        to: Currency,
    ) -> LookupKey {
        // A USD/IRR row serves both lookup directions; normalize the pair.
        let (a, b) = if from <= to { (from, to) } else { (to, from) };
        (tenant_id, branch_id, a, b)
    }
}

impl RateProvider for InMemoryRates {
    fn current(
        &self,
        tenant_id: TenantId,
        from: Currency,
        to: Currency,
        branch_id: Option<BranchId>,
        at: DateTime<Utc>,
    ) -> Result<ExchangeRate, RateError> {
        let key = Self::lookup_key(tenant_id, branch_id, from, to);
        if let Some(hit) = self.cache.get(&key) {
            return Ok(hit);
        }

        let rows = self
            .rows
            .get(&tenant_id)
            .ok_or_else(|| self.not_found(tenant_id, from, to, at))?;
        let candidates: Vec<ExchangeRate> = rows
            .iter()
            .filter(|r| r.covers(from, to))
            .cloned()
            .collect();
        drop(rows);

        let picked = pick_applicable(&candidates, branch_id, at)
            .cloned()
            .ok_or_else(|| self.not_found(tenant_id, from, to, at))?;

        self.cache.insert(key, picked.clone());
        Ok(picked)
    }
}

impl std::fmt::Debug for InMemoryRates {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryRates")
            .field("tenants", &self.rows.len())
            .finish()
    }
}
