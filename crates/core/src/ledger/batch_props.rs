//! Property-based tests for batch balancing and integrity hashing.

use chrono::Utc;
use proptest::prelude::*;
use rust_decimal::Decimal;
use sarraf_shared::types::{AccountCode, ActorId, Currency, Money, TenantId, TransactionId};

use super::batch::{check_balance, residual_entry};
use super::entry::{EntrySide, LedgerEntry, NewEntry};

fn new_entry(side: EntrySide, currency: Currency, minor: i64, rate: Decimal) -> NewEntry {
    NewEntry {
        account_code: AccountCode::from("1010"),
        account_id: None,
        side,
        amount: Money::signed(currency, minor),
        exchange_rate: rate,
        description: "prop leg".to_string(),
    }
}

/// Strategy for positive minor amounts.
fn positive_minor() -> impl Strategy<Value = i64> {
    1i64..1_000_000_000
}

/// Strategy for positive rates with 4 decimal places.
fn positive_rate() -> impl Strategy<Value = Decimal> {
    (1i64..1_000_000_000i64).prop_map(|v| Decimal::new(v, 4))
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    /// *For any* set of mirrored same-currency legs, the batch balances
    /// with zero residual and no rounding entry is produced.
    #[test]
    fn prop_mirrored_legs_balance_exactly(
        amounts in prop::collection::vec(positive_minor(), 1..8),
    ) {
        let mut entries = Vec::new();
        for minor in &amounts {
            entries.push(new_entry(EntrySide::Debit, Currency::Irr, *minor, Decimal::ONE));
            entries.push(new_entry(EntrySide::Credit, Currency::Irr, *minor, Decimal::ONE));
        }

        let check = check_balance(&entries, Currency::Irr).unwrap();
        prop_assert_eq!(check.residual, 0);
        prop_assert!(residual_entry(&check, &AccountCode::from("9990"), Currency::Irr).is_none());
    }

    /// *For any* accepted cross-currency batch, appending the residual entry
    /// restores exact balance in the base currency.
    #[test]
    fn prop_residual_entry_restores_exact_balance(
        minor in positive_minor(),
        rate in positive_rate(),
    ) {
        // One foreign debit leg against its base-converted credit leg.
        let foreign = Money::signed(Currency::Usd, minor);
        let base_minor = foreign.mul_rate(rate, Currency::Irr).unwrap().amount.minor;
        prop_assume!(base_minor > 0);

        let mut entries = vec![
            new_entry(EntrySide::Debit, Currency::Usd, minor, rate),
            new_entry(EntrySide::Credit, Currency::Irr, base_minor, Decimal::ONE),
        ];

        let check = check_balance(&entries, Currency::Irr).unwrap();
        if let Some(residual) = residual_entry(&check, &AccountCode::from("9990"), Currency::Irr) {
            entries.push(residual);
        }

        let rebalanced = check_balance(&entries, Currency::Irr).unwrap();
        prop_assert_eq!(rebalanced.base_debit, rebalanced.base_credit);
    }

    /// *For any* posted entry, altering any hashed field is detected.
    #[test]
    fn prop_tampering_any_hashed_field_is_detected(
        minor in positive_minor(),
        rate in positive_rate(),
        delta in 1i64..1_000,
        field in 0usize..4,
    ) {
        let entry = LedgerEntry::from_input(
            TenantId::new(),
            TransactionId::from("TEH00000003001"),
            &new_entry(EntrySide::Debit, Currency::Usd, minor, rate),
            ActorId::new(),
            Utc::now(),
        ).unwrap();
        prop_assert!(entry.verify());

        let mut tampered = entry;
        match field {
            0 => tampered.debit += delta,
            1 => tampered.credit += delta,
            2 => tampered.exchange_rate += Decimal::new(delta, 4),
            _ => tampered.description.push('x'),
        }
        prop_assert!(!tampered.verify(), "tampered field {} went undetected", field);
    }

    /// *For any* committed entry, its mirror cancels it in balance sums.
    #[test]
    fn prop_mirror_cancels_original(
        minor in positive_minor(),
        rate in positive_rate(),
        side_is_debit in any::<bool>(),
    ) {
        let side = if side_is_debit { EntrySide::Debit } else { EntrySide::Credit };
        let mut original = LedgerEntry::from_input(
            TenantId::new(),
            TransactionId::from("TEH00000003002"),
            &new_entry(side, Currency::Usd, minor, rate),
            ActorId::new(),
            Utc::now(),
        ).unwrap();
        original.status = super::entry::EntryStatus::Posted;

        let mirror = super::reversal::mirror_entry(&original, ActorId::new(), Utc::now()).unwrap();
        prop_assert_eq!(original.signed_minor() + mirror.signed_minor(), 0);
    }
}
