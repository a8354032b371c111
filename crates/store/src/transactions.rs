//! The transaction store.
//!
//! Each transaction record carries its own mutex: state-machine transitions
//! and payment-split updates for one transaction are totally ordered, while
//! different transactions proceed in parallel. Reference numbers are
//! globally unique across tenants.

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use sarraf_core::transaction::{Transaction, TransactionStatus, TransactionType};
use sarraf_shared::types::{
    CustomerId, PageRequest, PageResponse, ReferenceNumber, TenantId, TransactionId,
};
use thiserror::Error;

/// Errors from the transaction store.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransactionStoreError {
    /// No transaction with this id under the tenant.
    #[error("Transaction not found: {0}")]
    NotFound(TransactionId),

    /// The tenant already has a transaction with this id.
    #[error("Duplicate transaction id: {0}")]
    DuplicateId(TransactionId),

    /// The reference number is already taken (globally).
    #[error("Duplicate reference number: {0}")]
    DuplicateReference(ReferenceNumber),
}

impl From<TransactionStoreError> for sarraf_shared::ServiceError {
    fn from(err: TransactionStoreError) -> Self {
        use sarraf_shared::ErrorKind;
        let kind = match &err {
            TransactionStoreError::NotFound(_) => ErrorKind::NotFound,
            TransactionStoreError::DuplicateId(_)
            | TransactionStoreError::DuplicateReference(_) => ErrorKind::Conflict,
        };
        Self::new(kind, err.to_string())
    }
}

/// Filter options for listing transactions.
#[derive(Debug, Clone, Default)]
pub struct TransactionFilter {
    /// Filter by transaction type.
    pub tx_type: Option<TransactionType>,
    /// Filter by status.
    pub status: Option<TransactionStatus>,
    /// Filter by customer.
    pub customer_id: Option<CustomerId>,
    /// Only transactions created at or after this instant.
    pub from: Option<DateTime<Utc>>,
    /// Only transactions created at or before this instant.
    pub to: Option<DateTime<Utc>>,
}

impl TransactionFilter {
    fn matches(&self, tx: &Transaction) -> bool {
        self.tx_type.is_none_or(|t| tx.tx_type == t)
            && self.status.is_none_or(|s| tx.status == s)
            && self.customer_id.is_none_or(|c| tx.customer_id == c)
            && self.from.is_none_or(|from| tx.created_at >= from)
            && self.to.is_none_or(|to| tx.created_at <= to)
    }
}

/// Thread-safe in-memory transaction store.
pub struct InMemoryTransactions {
    records: DashMap<(TenantId, TransactionId), Arc<Mutex<Transaction>>>,
    order: Mutex<Vec<(TenantId, TransactionId)>>,
    references: DashMap<ReferenceNumber, TransactionId>,
}

impl InMemoryTransactions {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self {
            records: DashMap::new(),
            order: Mutex::new(Vec::new()),
            references: DashMap::new(),
        }
    }

    /// Inserts a new transaction.
    ///
    /// # Errors
    ///
    /// `DuplicateId` if the tenant already has this id, `DuplicateReference`
    /// if the reference number exists anywhere.
    pub fn insert(&self, tx: Transaction) -> Result<Transaction, TransactionStoreError> {
        let key = (tx.tenant_id, tx.id.clone());

        if self.references.contains_key(&tx.reference) {
            return Err(TransactionStoreError::DuplicateReference(tx.reference));
        }

        match self.records.entry(key.clone()) {
            dashmap::mapref::entry::Entry::Occupied(_) => {
                Err(TransactionStoreError::DuplicateId(tx.id))
            }
            dashmap::mapref::entry::Entry::Vacant(vacant) => {
                self.references.insert(tx.reference.clone(), tx.id.clone());
                vacant.insert(Arc::new(Mutex::new(tx.clone())));
                self.order.lock().expect("order lock poisoned").push(key);
                Ok(tx)
            }
        }
    }

    /// Returns true if the tenant has a transaction with this id.
    #[must_use]
    pub fn contains(&self, tenant_id: TenantId, id: &TransactionId) -> bool {
        self.records.contains_key(&(tenant_id, id.clone()))
    }

    /// Reads a transaction by id, tenant-scoped.
    pub fn get(
        &self,
        tenant_id: TenantId,
        id: &TransactionId,
    ) -> Result<Transaction, TransactionStoreError> {
        let record = self
            .records
            .get(&(tenant_id, id.clone()))
            .ok_or_else(|| TransactionStoreError::NotFound(id.clone()))?;
        let guard = record.lock().expect("transaction lock poisoned");
        Ok(guard.clone())
    }

    /// Runs a closure under the transaction's mutex.
    ///
    /// All state transitions and split updates go through here, so
    /// concurrent operations on one transaction serialize.
    pub fn with_mut<R, E>(
        &self,
        tenant_id: TenantId,
        id: &TransactionId,
        f: impl FnOnce(&mut Transaction) -> Result<R, E>,
    ) -> Result<Result<R, E>, TransactionStoreError> {
        let record = self
            .records
            .get(&(tenant_id, id.clone()))
            .ok_or_else(|| TransactionStoreError::NotFound(id.clone()))?
            .clone();
        let mut guard = record.lock().expect("transaction lock poisoned");
        Ok(f(&mut guard))
    }

    /// Lists a tenant's transactions, filtered and paginated, newest first.
    #[must_use]
    pub fn list(
        &self,
        tenant_id: TenantId,
        filter: &TransactionFilter,
        page: PageRequest,
    ) -> PageResponse<Transaction> {
        let keys: Vec<(TenantId, TransactionId)> = {
            let order = self.order.lock().expect("order lock poisoned");
            order
                .iter()
                .rev()
                .filter(|(tenant, _)| *tenant == tenant_id)
                .cloned()
                .collect()
        };

        let matching: Vec<Transaction> = keys
            .iter()
            .filter_map(|key| {
                let record = self.records.get(key)?;
                let guard = record.lock().expect("transaction lock poisoned");
                filter.matches(&guard).then(|| guard.clone())
            })
            .collect();

        let total = matching.len() as u64;
        let rows: Vec<Transaction> = matching
            .into_iter()
            .skip(page.offset())
            .take(page.limit())
            .collect();

        PageResponse::new(rows, page.page, page.per_page, total)
    }
}

impl Default for InMemoryTransactions {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for InMemoryTransactions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryTransactions")
            .field("transactions", &self.records.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use sarraf_core::rate::RateKind;
    use sarraf_core::split::PaymentSplit;
    use sarraf_shared::types::{AccountCode, ActorId, Currency, Money};

    fn sample(tenant_id: TenantId, id: &str, reference: &str) -> Transaction {
        let total = Money::new(Currency::Irr, 420_000_000).unwrap();
        Transaction {
            id: TransactionId::from(id),
            reference: ReferenceNumber::from(reference),
            tenant_id,
            customer_id: CustomerId::new(),
            branch_id: None,
            tx_type: TransactionType::CurrencyBuy,
            amount_from: total,
            amount_to: Money::new(Currency::Usd, 1_000_000).unwrap(),
            rate: dec!(42000),
            rate_kind: RateKind::Buy,
            commission: Money::zero(Currency::Irr),
            total_owed: total,
            status: TransactionStatus::PendingPayment,
            split: PaymentSplit::single(AccountCode::from("PAY-MAIN"), total).unwrap(),
            hold_id: None,
            risk_score: None,
            notes: Vec::new(),
            tags: Vec::new(),
            metadata: serde_json::Value::Null,
            created_by: ActorId::new(),
            created_at: Utc::now(),
            status_history: Vec::new(),
            reversed: false,
            reversed_at: None,
            integrity_flagged: false,
        }
    }

    #[test]
    fn test_insert_and_get() {
        let store = InMemoryTransactions::new();
        let tenant = TenantId::new();
        store.insert(sample(tenant, "TEH1", "REF1")).unwrap();

        let tx = store.get(tenant, &TransactionId::from("TEH1")).unwrap();
        assert_eq!(tx.id.as_str(), "TEH1");
    }

    #[test]
    fn test_duplicate_id_rejected_per_tenant() {
        let store = InMemoryTransactions::new();
        let tenant = TenantId::new();
        store.insert(sample(tenant, "TEH1", "REF1")).unwrap();

        assert_eq!(
            store.insert(sample(tenant, "TEH1", "REF2")),
            Err(TransactionStoreError::DuplicateId(TransactionId::from(
                "TEH1"
            )))
        );

        // The same id under another tenant is fine.
        store.insert(sample(TenantId::new(), "TEH1", "REF3")).unwrap();
    }

    #[test]
    fn test_duplicate_reference_rejected_globally() {
        let store = InMemoryTransactions::new();
        store
            .insert(sample(TenantId::new(), "TEH1", "REFX"))
            .unwrap();

        assert_eq!(
            store.insert(sample(TenantId::new(), "ISF1", "REFX")),
            Err(TransactionStoreError::DuplicateReference(
                ReferenceNumber::from("REFX")
            ))
        );
    }

    #[test]
    fn test_get_is_tenant_scoped() {
        let store = InMemoryTransactions::new();
        let tenant = TenantId::new();
        store.insert(sample(tenant, "TEH1", "REF1")).unwrap();

        assert_eq!(
            store.get(TenantId::new(), &TransactionId::from("TEH1")),
            Err(TransactionStoreError::NotFound(TransactionId::from("TEH1")))
        );
    }

    #[test]
    fn test_with_mut_persists_changes() {
        let store = InMemoryTransactions::new();
        let tenant = TenantId::new();
        store.insert(sample(tenant, "TEH1", "REF1")).unwrap();

        store
            .with_mut(tenant, &TransactionId::from("TEH1"), |tx| {
                tx.tags.push("vip".to_string());
                Ok::<(), ()>(())
            })
            .unwrap()
            .unwrap();

        let tx = store.get(tenant, &TransactionId::from("TEH1")).unwrap();
        assert_eq!(tx.tags, vec!["vip".to_string()]);
    }

    #[test]
    fn test_list_filters_and_paginates() {
        let store = InMemoryTransactions::new();
        let tenant = TenantId::new();

        for i in 0..5 {
            let mut tx = sample(tenant, &format!("TEH{i}"), &format!("REF{i}"));
            if i % 2 == 0 {
                tx.status = TransactionStatus::Completed;
            }
            store.insert(tx).unwrap();
        }
        // Another tenant's rows never appear.
        store.insert(sample(TenantId::new(), "ISF9", "REF9")).unwrap();

        let all = store.list(tenant, &TransactionFilter::default(), PageRequest::default());
        assert_eq!(all.meta.total, 5);

        let completed = store.list(
            tenant,
            &TransactionFilter {
                status: Some(TransactionStatus::Completed),
                ..TransactionFilter::default()
            },
            PageRequest::default(),
        );
        assert_eq!(completed.meta.total, 3);

        let page = store.list(
            tenant,
            &TransactionFilter::default(),
            PageRequest { page: 2, per_page: 2 },
        );
        assert_eq!(page.rows.len(), 2);
        assert_eq!(page.meta.total, 5);
        assert_eq!(page.meta.total_pages, 3);
    }

    #[test]
    fn test_list_newest_first() {
        let store = InMemoryTransactions::new();
        let tenant = TenantId::new();
        store.insert(sample(tenant, "TEH-old", "REF-a")).unwrap();
        store.insert(sample(tenant, "TEH-new", "REF-b")).unwrap();

        let page = store.list(tenant, &TransactionFilter::default(), PageRequest::default());
        assert_eq!(page.rows[0].id.as_str(), "TEH-new");
        assert_eq!(page.rows[1].id.as_str(), "TEH-old");
    }
}
