//! Reversing entry construction.
//!
//! Reversal never mutates amounts: the original entry is marked `reversed`
//! and a posted mirror entry with debit and credit swapped cancels it.

use chrono::{DateTime, Utc};
use sarraf_shared::types::{ActorId, LedgerEntryId};

use super::entry::{EntryStatus, LedgerEntry};
use super::error::LedgerError;

/// Builds the posted mirror for an entry being reversed.
///
/// The mirror swaps debit and credit, references the original via
/// `reversal_of`, and prefixes the description with `REVERSAL:`. The caller
/// commits the mirror and flips the original to `reversed` in one atomic
/// batch.
///
/// # Errors
///
/// `AlreadyReversed` if the original is not in `posted` status.
pub fn mirror_entry(
    original: &LedgerEntry,
    actor: ActorId,
    at: DateTime<Utc>,
) -> Result<LedgerEntry, LedgerError> {
    if original.status != EntryStatus::Posted {
        return Err(LedgerError::AlreadyReversed(original.id));
    }

    let mut mirror = LedgerEntry {
        id: LedgerEntryId::new(),
        tenant_id: original.tenant_id,
        transaction_id: original.transaction_id.clone(),
        account_code: original.account_code.clone(),
        account_id: original.account_id,
        debit: original.credit,
        credit: original.debit,
        currency: original.currency,
        exchange_rate: original.exchange_rate,
        status: EntryStatus::Posted,
        reversal_of: Some(original.id),
        description: format!("REVERSAL: {}", original.description),
        integrity_hash: String::new(),
        created_by: actor,
        created_at: at,
    };
    mirror.integrity_hash = mirror.compute_hash();

    Ok(mirror)
}
