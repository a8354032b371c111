//! Identifier generation.
//!
//! Transaction ids are human-readable and unique per tenant:
//! `<tenantCode><timestamp-suffix-8><random-3>`. Reference numbers are
//! globally unique: `REF<timestamp-10><random-4>`. Callers may supply their
//! own transaction id to achieve idempotency.

use chrono::{DateTime, Utc};
use rand::Rng;
use sarraf_shared::types::{ReferenceNumber, TransactionId};

/// Generates a transaction id for a tenant.
#[must_use]
pub fn transaction_id(tenant_code: &str, at: DateTime<Utc>) -> TransactionId {
    let suffix = at.timestamp_millis().unsigned_abs() % 100_000_000;
    let tail: u32 = rand::rng().random_range(0..1_000);
    TransactionId::new(format!("{tenant_code}{suffix:08}{tail:03}"))
}

/// Generates a globally unique reference number.
#[must_use]
pub fn reference_number(at: DateTime<Utc>) -> ReferenceNumber {
    let stamp = at.timestamp().unsigned_abs() % 10_000_000_000;
    let tail: u32 = rand::rng().random_range(0..10_000);
    ReferenceNumber::new(format!("REF{stamp:010}{tail:04}"))
}
