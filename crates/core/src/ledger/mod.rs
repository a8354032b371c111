//! Double-entry ledger logic.
//!
//! This module implements the pure side of the ledger:
//! - Entry types (debits and credits with embedded base-currency rates)
//! - Per-row integrity hashing
//! - Batch balance validation with rounding residuals
//! - Reversing entry construction
//! - Balance sign conventions

pub mod balance;
pub mod batch;
pub mod entry;
pub mod error;
pub mod integrity;
pub mod reversal;

#[cfg(test)]
mod batch_props;

pub use balance::{AccountKind, LedgerBalance};
pub use batch::{check_balance, residual_entry, BatchCheck};
pub use entry::{EntrySide, EntryStatus, LedgerEntry, NewEntry};
pub use error::LedgerError;
pub use integrity::entry_hash;
pub use reversal::mirror_entry;
