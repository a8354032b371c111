//! Per-row integrity hashing.
//!
//! Each entry carries a SHA-256 over its financially significant fields.
//! The hash is a per-row tamper detector for out-of-band mutation; it is
//! deliberately not chained across rows.

use rust_decimal::Decimal;
use sarraf_shared::types::{AccountCode, Currency, TenantId, TransactionId};
use sha2::{Digest, Sha256};

/// Computes the canonical integrity hash for an entry's fields.
///
/// Preimage: `tenantId|transactionId|accountCode|debit|credit|currency|rate|description`
/// with amounts as minor-unit integers and the rate normalized (no trailing
/// zeros), so equal values always hash equally.
#[must_use]
#[allow(clippy::too_many_arguments)]
pub fn entry_hash(
    tenant_id: TenantId,
    transaction_id: &TransactionId,
    account_code: &AccountCode,
    debit: i64,
    credit: i64,
    currency: Currency,
    exchange_rate: Decimal,
    description: &str,
) -> String {
    let rate = exchange_rate.normalize();
    let preimage = format!(
        "{tenant_id}|{transaction_id}|{account_code}|{debit}|{credit}|{currency}|{rate}|{description}"
    );
    hex::encode(Sha256::digest(preimage.as_bytes()))
}
