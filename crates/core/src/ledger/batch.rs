//! Batch balance validation.
//!
//! A journal batch is accepted only if, after converting every entry into
//! the tenant base currency with its embedded rate, debits equal credits
//! within one base minor unit per distinct entry currency. The residual is
//! posted to the configured rounding account so the stored ledger always
//! balances exactly.

use rust_decimal::Decimal;
use sarraf_shared::types::{AccountCode, Currency, Money};
use std::collections::BTreeSet;

use super::entry::{EntrySide, NewEntry};
use super::error::LedgerError;

/// Outcome of validating a batch against the balance law.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchCheck {
    /// Total debits in base minor units.
    pub base_debit: i64,
    /// Total credits in base minor units.
    pub base_credit: i64,
    /// Debits minus credits in base minor units.
    pub residual: i64,
    /// Number of distinct entry currencies in the batch.
    pub distinct_currencies: usize,
}

/// Validates entry shapes and the batch balance law.
///
/// # Errors
///
/// Per-entry validation errors, or `UnbalancedBatch` when the residual
/// exceeds the rounding tolerance.
pub fn check_balance(entries: &[NewEntry], base: Currency) -> Result<BatchCheck, LedgerError> {
    if entries.len() < 2 {
        return Err(LedgerError::InsufficientEntries);
    }

    let mut base_debit: i64 = 0;
    let mut base_credit: i64 = 0;
    let mut currencies = BTreeSet::new();

    for entry in entries {
        entry.validate()?;
        currencies.insert(entry.amount.currency);

        let in_base = if entry.amount.currency == base {
            entry.amount.minor
        } else {
            entry
                .amount
                .mul_rate(entry.exchange_rate, base)?
                .amount
                .minor
        };

        match entry.side {
            EntrySide::Debit => {
                base_debit = base_debit.checked_add(in_base).ok_or(LedgerError::Money(
                    sarraf_shared::types::MoneyError::Overflow,
                ))?;
            }
            EntrySide::Credit => {
                base_credit = base_credit.checked_add(in_base).ok_or(LedgerError::Money(
                    sarraf_shared::types::MoneyError::Overflow,
                ))?;
            }
        }
    }

    let residual = base_debit - base_credit;
    let tolerance = i64::try_from(currencies.len()).unwrap_or(i64::MAX);
    if residual.abs() > tolerance {
        return Err(LedgerError::UnbalancedBatch {
            debit: base_debit,
            credit: base_credit,
            tolerance,
        });
    }

    Ok(BatchCheck {
        base_debit,
        base_credit,
        residual,
        distinct_currencies: currencies.len(),
    })
}

/// Builds the rounding entry that restores exact balance, if one is needed.
#[must_use]
pub fn residual_entry(
    check: &BatchCheck,
    residual_account: &AccountCode,
    base: Currency,
) -> Option<NewEntry> {
    if check.residual == 0 {
        return None;
    }

    // Debits exceeded credits: credit the residual account, and vice versa.
    let side = if check.residual > 0 {
        EntrySide::Credit
    } else {
        EntrySide::Debit
    };

    Some(NewEntry {
        account_code: residual_account.clone(),
        account_id: None,
        side,
        amount: Money::signed(base, check.residual.abs()),
        exchange_rate: Decimal::ONE,
        description: "rounding residual".to_string(),
    })
}
