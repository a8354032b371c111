//! The Sarraf transaction engine.
//!
//! Orchestrates the currency transaction lifecycle end to end: pricing
//! against the rate provider, payment-split tracking, settlement against
//! the account store and double-entry ledger, cancellation, and reversal —
//! all tenant-isolated and event-publishing.
//!
//! # Modules
//!
//! - `service` - The `Engine` and its operations
//! - `tenants` - Tenant registry and per-tenant settings
//! - `ids` - Transaction id and reference number generation
//! - `deadline` - Operation deadlines and timeout semantics
//! - `retry` - Bounded internal retry for transient failures
//! - `remittance` - The external remittance seam

pub mod deadline;
pub mod ids;
pub mod remittance;
pub mod retry;
pub mod service;
pub mod tenants;

pub use deadline::Deadline;
pub use remittance::{NullRemittance, RecordingRemittance, RemittanceService};
pub use service::{CreateTransactionInput, Engine, EngineBuilder, MetadataPatch, ReceiptInput};
pub use tenants::{TenantConfig, TenantRegistry};
