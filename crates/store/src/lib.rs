//! In-memory tenant-sharded stores for Sarraf.
//!
//! This crate plays the persistence role behind the engine: accounts with
//! hold sub-ledgers, the append-only double-entry ledger, transactions with
//! their embedded payment splits, exchange rates, and the audit log. Every
//! row carries its tenant and every read or write is tenant-checked first;
//! no cross-tenant reference is permitted.
//!
//! Locking follows the shared-resource policy of the engine: one mutex per
//! account record, one per transaction record, and sorted multi-account
//! lock acquisition for ledger batches.

pub mod accounts;
pub mod audit;
pub mod ledger;
pub mod rates;
pub mod transactions;

pub use accounts::{
    Account, AccountError, AccountStatus, ApplyContext, BalanceKind, InMemoryAccounts,
};
pub use audit::InMemoryAuditLog;
pub use ledger::{InMemoryLedger, IntegrityReport};
pub use rates::InMemoryRates;
pub use transactions::{InMemoryTransactions, TransactionFilter, TransactionStoreError};
