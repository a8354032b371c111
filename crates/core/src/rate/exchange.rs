//! Exchange rate rows and applicable-rate selection.
//!
//! Rates are quoted the way exchange offices publish them: one row per
//! (tenant, optional branch, currency pair) with separate buy and sell
//! values meaning "quote-currency units per one unit of the base currency"
//! (e.g. 42,000 IRR per USD). Conversion handles both directions.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sarraf_shared::types::{BranchId, Currency, Money, RateId, TenantId};
use serde::{Deserialize, Serialize};

use super::error::RateError;

/// Lifecycle status of a rate row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RateStatus {
    /// The rate participates in lookups.
    Active,
    /// Administratively disabled; never returned.
    Inactive,
    /// Superseded or past its window; never returned.
    Expired,
}

/// Which side of the quote applies.
///
/// `Buy` means the tenant buys the base currency from the customer;
/// `Sell` means the tenant sells it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RateKind {
    /// Tenant buys the base currency.
    Buy,
    /// Tenant sells the base currency.
    Sell,
}

/// An exchange rate row owned by the rate provider.
///
/// Transactions capture the rate value they used at creation and never
/// depend on the row afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExchangeRate {
    /// Unique identifier for this row.
    pub id: RateId,
    /// Owning tenant.
    pub tenant_id: TenantId,
    /// Branch override; `None` means tenant-wide.
    pub branch_id: Option<BranchId>,
    /// Base currency of the quote (the currency being priced).
    pub from_currency: Currency,
    /// Quote currency (what one base unit costs).
    pub to_currency: Currency,
    /// Quote-units per base unit when the tenant buys.
    pub buy_rate: Decimal,
    /// Quote-units per base unit when the tenant sells.
    pub sell_rate: Decimal,
    /// Minimum transactable amount, in the base currency.
    pub min_amount: Money,
    /// Maximum transactable amount, in the base currency.
    pub max_amount: Money,
    /// Instant from which this rate applies.
    pub effective_from: DateTime<Utc>,
    /// Lifecycle status.
    pub status: RateStatus,
}

impl ExchangeRate {
    /// Returns the quoted value for the given side.
    #[must_use]
    pub fn quoted(&self, kind: RateKind) -> Decimal {
        match kind {
            RateKind::Buy => self.buy_rate,
            RateKind::Sell => self.sell_rate,
        }
    }

    /// Returns true if this row may serve lookups at `at`.
    #[must_use]
    pub fn is_effective_at(&self, at: DateTime<Utc>) -> bool {
        self.status == RateStatus::Active && self.effective_from <= at
    }

    /// Returns true if this row quotes the given pair in either direction.
    #[must_use]
    pub fn covers(&self, a: Currency, b: Currency) -> bool {
        (self.from_currency == a && self.to_currency == b)
            || (self.from_currency == b && self.to_currency == a)
    }

    /// Range-checks an amount denominated in the base currency.
    pub fn validate_amount(&self, amount: Money) -> Result<(), RateError> {
        if amount.currency != self.from_currency {
            return Err(RateError::CurrencyNotInPair(amount.currency));
        }
        if amount.minor < self.min_amount.minor || amount.minor > self.max_amount.minor {
            return Err(RateError::AmountOutOfRange {
                amount,
                min: self.min_amount,
                max: self.max_amount,
            });
        }
        Ok(())
    }

    /// Applies the quote to an amount in either currency of the pair.
    ///
    /// Base-currency amounts are multiplied by the quote; quote-currency
    /// amounts are divided. Rounding is banker's rounding at the target
    /// currency's precision.
    pub fn convert(&self, amount: Money, kind: RateKind) -> Result<Money, RateError> {
        let quoted = self.quoted(kind);
        if quoted <= Decimal::ZERO {
            return Err(RateError::NonPositiveRate);
        }

        if amount.currency == self.from_currency {
            Ok(amount.mul_rate(quoted, self.to_currency)?.amount)
        } else if amount.currency == self.to_currency {
            let exact = amount
                .to_decimal()
                .checked_div(quoted)
                .ok_or(RateError::NonPositiveRate)?;
            Ok(Money::from_decimal(self.from_currency, exact)?)
        } else {
            Err(RateError::CurrencyNotInPair(amount.currency))
        }
    }
}

/// Picks the applicable rate among candidates for a lookup.
///
/// Tie-break: a branch-scoped rate beats a tenant-scoped rate; otherwise
/// the latest `effective_from` wins. Inactive and expired rows never match.
#[must_use]
pub fn pick_applicable<'a>(
    candidates: &'a [ExchangeRate],
    branch_id: Option<BranchId>,
    at: DateTime<Utc>,
) -> Option<&'a ExchangeRate> {
    let effective = candidates.iter().filter(|r| r.is_effective_at(at));

    // Branch-scoped rates only match a lookup for that branch.
    let eligible =
        effective.filter(|r| r.branch_id.is_none() || r.branch_id == branch_id);

    eligible.max_by_key(|r| (r.branch_id.is_some() && r.branch_id == branch_id, r.effective_from))
}
