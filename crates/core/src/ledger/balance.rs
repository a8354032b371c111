//! Balance sign conventions and summaries.
//!
//! The ledger stores only raw debit and credit amounts. Rendering a
//! natural-sign balance is the consumer's job, driven by the account kind
//! from the chart-of-accounts map.

use sarraf_shared::types::{AccountCode, Currency};
use serde::{Deserialize, Serialize};

/// Account kinds with their balance sign conventions.
///
/// Asset and expense balances grow on debits; liability, equity, and income
/// balances grow on credits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccountKind {
    /// Debit-normal: cash, customer currency balances.
    Asset,
    /// Credit-normal: customer payables, held funds.
    Liability,
    /// Credit-normal: owner capital.
    Equity,
    /// Credit-normal: commission income.
    Income,
    /// Debit-normal: operating costs.
    Expense,
}

impl AccountKind {
    /// Returns true if balances grow on debits.
    #[must_use]
    pub const fn is_debit_normal(self) -> bool {
        matches!(self, Self::Asset | Self::Expense)
    }

    /// Renders the natural-sign balance from raw totals.
    #[must_use]
    pub const fn natural_balance(self, debit_total: i64, credit_total: i64) -> i64 {
        if self.is_debit_normal() {
            debit_total - credit_total
        } else {
            credit_total - debit_total
        }
    }
}

/// Raw balance summary for one posting target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerBalance {
    /// The chart code the totals belong to.
    pub account_code: AccountCode,
    /// Currency of the minor-unit totals.
    pub currency: Currency,
    /// Total committed debits in minor units.
    pub debit_total: i64,
    /// Total committed credits in minor units.
    pub credit_total: i64,
}

impl LedgerBalance {
    /// The signed sum (debit − credit) in minor units.
    #[must_use]
    pub const fn signed(&self) -> i64 {
        self.debit_total - self.credit_total
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debit_normal_kinds() {
        assert!(AccountKind::Asset.is_debit_normal());
        assert!(AccountKind::Expense.is_debit_normal());
        assert!(!AccountKind::Liability.is_debit_normal());
        assert!(!AccountKind::Equity.is_debit_normal());
        assert!(!AccountKind::Income.is_debit_normal());
    }

    #[test]
    fn test_natural_balance_signs() {
        // An asset debited 100 and credited 30 holds 70.
        assert_eq!(AccountKind::Asset.natural_balance(100, 30), 70);
        // Income credited 100 and debited 30 has earned 70.
        assert_eq!(AccountKind::Income.natural_balance(30, 100), 70);
    }

    #[test]
    fn test_signed_sum() {
        let balance = LedgerBalance {
            account_code: AccountCode::from("1010"),
            currency: Currency::Usd,
            debit_total: 500,
            credit_total: 200,
        };
        assert_eq!(balance.signed(), 300);
    }
}
