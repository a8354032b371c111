//! Property-based tests for rate conversion.

use chrono::{TimeZone, Utc};
use proptest::prelude::*;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use sarraf_shared::types::{Currency, Money, RateId, TenantId};

use super::conversion::calculate_conversion;
use super::exchange::{ExchangeRate, RateKind, RateStatus};
use super::fees::FeePolicy;

/// Strategy to generate positive USD minor amounts (0.01 to 1,000,000.00).
fn usd_minor() -> impl Strategy<Value = i64> {
    1i64..100_000_000
}

/// Strategy to generate positive quotes (0.0001 to 100,000.0000).
fn positive_quote() -> impl Strategy<Value = Decimal> {
    (1i64..1_000_000_000i64).prop_map(|v| Decimal::new(v, 4))
}

/// Strategy to generate commission percentages (0% to 5%).
fn fee_percent() -> impl Strategy<Value = Decimal> {
    (0i64..500i64).prop_map(|v| Decimal::new(v, 2))
}

fn rate_with(buy: Decimal, sell: Decimal) -> ExchangeRate {
    ExchangeRate {
        id: RateId::new(),
        tenant_id: TenantId::new(),
        branch_id: None,
        from_currency: Currency::Usd,
        to_currency: Currency::Irr,
        buy_rate: buy,
        sell_rate: sell,
        min_amount: Money::zero(Currency::Usd),
        max_amount: Money::new(Currency::Usd, i64::MAX).unwrap(),
        effective_from: Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap(),
        status: RateStatus::Active,
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    /// *For any* amount and quote, the converted amount lands at the target
    /// currency's own precision: re-rounding changes nothing.
    #[test]
    fn prop_converted_amount_is_at_target_precision(
        minor in usd_minor(),
        quote in positive_quote(),
    ) {
        let rate = rate_with(quote, quote);
        let paid = Money::new(Currency::Usd, minor).unwrap();
        let result = rate.convert(paid, RateKind::Buy).unwrap();

        let reround = Money::from_decimal(Currency::Irr, result.to_decimal()).unwrap();
        prop_assert_eq!(result, reround);
    }

    /// *For any* amount and quote, conversion is deterministic.
    #[test]
    fn prop_conversion_is_deterministic(
        minor in usd_minor(),
        quote in positive_quote(),
    ) {
        let rate = rate_with(quote, quote);
        let paid = Money::new(Currency::Usd, minor).unwrap();
        let a = rate.convert(paid, RateKind::Sell).unwrap();
        let b = rate.convert(paid, RateKind::Sell).unwrap();
        prop_assert_eq!(a, b);
    }

    /// *For any* amount, converting base-to-quote and back returns to the
    /// original amount within the rounding slack of the two legs.
    #[test]
    fn prop_round_trip_within_rounding(
        minor in usd_minor(),
        quote in positive_quote(),
    ) {
        // Quotes below 1 lose sub-minor information on the IRR leg; keep the
        // round trip meaningful.
        prop_assume!(quote >= Decimal::ONE);

        let rate = rate_with(quote, quote);
        let paid = Money::new(Currency::Usd, minor).unwrap();
        let there = rate.convert(paid, RateKind::Buy).unwrap();
        let back = rate.convert(there, RateKind::Buy).unwrap();

        // Half an IRR of rounding maps to 50/quote USD cents, plus half a
        // cent on the return leg.
        let drift = (back.minor - paid.minor).abs();
        let allowed = (Decimal::ONE_HUNDRED / quote)
            .ceil()
            .to_i64()
            .unwrap_or(i64::MAX)
            .saturating_add(1);
        prop_assert!(
            drift <= allowed,
            "round trip drifted {drift} minor units (allowed {allowed})"
        );
    }

    /// *For any* non-negative fee percent, the quote's total cost is the paid
    /// amount plus a non-negative commission in the paid currency.
    #[test]
    fn prop_total_cost_decomposes(
        minor in usd_minor(),
        quote in positive_quote(),
        percent in fee_percent(),
    ) {
        let rate = rate_with(quote, quote);
        let paid = Money::new(Currency::Usd, minor).unwrap();
        let fees = FeePolicy::Percentage { percent };

        let q = calculate_conversion(&rate, paid, RateKind::Buy, &fees).unwrap();
        prop_assert!(!q.commission.is_negative());
        prop_assert_eq!(q.commission.currency, Currency::Usd);
        prop_assert_eq!(q.total_cost, paid.add(q.commission).unwrap());
    }
}
