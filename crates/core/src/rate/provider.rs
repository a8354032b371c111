//! The rate provider contract.

use chrono::{DateTime, Utc};
use sarraf_shared::types::{BranchId, Currency, TenantId};

use super::error::RateError;
use super::exchange::ExchangeRate;

/// Source of applicable exchange rates.
///
/// Implementations may cache, but must invalidate on any write. Lookups are
/// tenant-scoped and optionally branch-overridden; inactive and expired
/// rows are never returned.
pub trait RateProvider: Send + Sync {
    /// Returns the applicable rate for the pair at `at`.
    ///
    /// The pair is matched in either quote direction: a USD/IRR row serves
    /// both IRR-to-USD and USD-to-IRR lookups.
    ///
    /// # Errors
    ///
    /// `RateError::NotFound` if no active, effective rate covers the pair.
    fn current(
        &self,
        tenant_id: TenantId,
        from: Currency,
        to: Currency,
        branch_id: Option<BranchId>,
        at: DateTime<Utc>,
    ) -> Result<ExchangeRate, RateError>;
}
