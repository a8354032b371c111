//! Conversion quotes.
//!
//! A quote captures everything the engine needs to persist on the
//! transaction: the converted amount, the commission, the total the
//! customer owes, and the rate value that was applied.

use sarraf_shared::types::Money;
use serde::{Deserialize, Serialize};

use super::error::RateError;
use super::exchange::{ExchangeRate, RateKind};
use super::fees::FeePolicy;
use rust_decimal::Decimal;

/// The priced outcome of applying a rate and fee policy to an amount.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversionQuote {
    /// Amount the customer receives, in the target currency.
    pub converted_amount: Money,
    /// Commission charged, in the paid currency.
    pub commission: Money,
    /// Total the customer owes: paid amount plus commission.
    pub total_cost: Money,
    /// The quoted rate value that was applied.
    pub rate_used: Decimal,
    /// Which side of the quote applied.
    pub kind: RateKind,
}

/// Prices an amount against a rate row.
///
/// `amount` is what the customer pays; it may be in either currency of the
/// pair (base amounts multiply by the quote, quote amounts divide).
/// Commission is charged on the paid amount in its own currency.
pub fn calculate_conversion(
    rate: &ExchangeRate,
    amount: Money,
    kind: RateKind,
    fees: &FeePolicy,
) -> Result<ConversionQuote, RateError> {
    let converted_amount = rate.convert(amount, kind)?;
    let commission = fees.commission_for(amount)?;
    let total_cost = amount.add(commission)?;

    Ok(ConversionQuote {
        converted_amount,
        commission,
        total_cost,
        rate_used: rate.quoted(kind),
        kind,
    })
}
