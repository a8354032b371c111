//! Money type on integer minor units with currency.
//!
//! CRITICAL: Never use floating-point for money calculations.
//! Amounts are signed 64-bit integers in the currency's smallest unit;
//! rate math goes through `rust_decimal::Decimal` with banker's rounding
//! and converts back to minor units.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// ISO 4217-style currency codes supported by the system.
///
/// The set is fixed; currencies are not user-editable at runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Currency {
    /// Iranian Rial (no minor unit in practice).
    Irr,
    /// US Dollar
    Usd,
    /// Euro
    Eur,
    /// British Pound
    Gbp,
    /// UAE Dirham
    Aed,
    /// Canadian Dollar
    Cad,
    /// Bitcoin (tracked to satoshi precision).
    Btc,
}

impl Currency {
    /// All supported currencies.
    pub const ALL: [Self; 7] = [
        Self::Irr,
        Self::Usd,
        Self::Eur,
        Self::Gbp,
        Self::Aed,
        Self::Cad,
        Self::Btc,
    ];

    /// Number of decimal places in the minor unit.
    #[must_use]
    pub const fn decimal_places(self) -> u32 {
        match self {
            Self::Irr => 0,
            Self::Usd | Self::Eur | Self::Gbp | Self::Aed | Self::Cad => 2,
            Self::Btc => 8,
        }
    }

    /// The minor-unit scale factor (10^decimal_places).
    #[must_use]
    pub const fn minor_per_major(self) -> i64 {
        match self {
            Self::Irr => 1,
            Self::Usd | Self::Eur | Self::Gbp | Self::Aed | Self::Cad => 100,
            Self::Btc => 100_000_000,
        }
    }
}

impl std::fmt::Display for Currency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Irr => write!(f, "IRR"),
            Self::Usd => write!(f, "USD"),
            Self::Eur => write!(f, "EUR"),
            Self::Gbp => write!(f, "GBP"),
            Self::Aed => write!(f, "AED"),
            Self::Cad => write!(f, "CAD"),
            Self::Btc => write!(f, "BTC"),
        }
    }
}

impl std::str::FromStr for Currency {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "IRR" => Ok(Self::Irr),
            "USD" => Ok(Self::Usd),
            "EUR" => Ok(Self::Eur),
            "GBP" => Ok(Self::Gbp),
            "AED" => Ok(Self::Aed),
            "CAD" => Ok(Self::Cad),
            "BTC" => Ok(Self::Btc),
            _ => Err(format!("Unknown currency: {s}")),
        }
    }
}

/// Errors from monetary arithmetic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum MoneyError {
    /// Amounts in two different currencies were combined.
    #[error("Currency mismatch: {left} vs {right}")]
    CurrencyMismatch {
        /// Currency of the left operand.
        left: Currency,
        /// Currency of the right operand.
        right: Currency,
    },

    /// The result exceeds 64-bit minor units.
    #[error("Monetary amount overflows 64-bit minor units")]
    Overflow,

    /// A non-negative amount was required.
    #[error("Amount must be non-negative")]
    NegativeNotAllowed,
}

/// A monetary amount: currency plus signed integer minor units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Money {
    /// The currency of the amount.
    pub currency: Currency,
    /// The amount in minor units (e.g. cents, satoshi, whole rial).
    pub minor: i64,
}

impl Money {
    /// Creates a non-negative amount. Use [`Money::signed`] for signed values.
    pub fn new(currency: Currency, minor: i64) -> Result<Self, MoneyError> {
        if minor < 0 {
            return Err(MoneyError::NegativeNotAllowed);
        }
        Ok(Self { currency, minor })
    }

    /// Creates an explicitly signed amount.
    #[must_use]
    pub const fn signed(currency: Currency, minor: i64) -> Self {
        Self { currency, minor }
    }

    /// Creates a zero amount in the specified currency.
    #[must_use]
    pub const fn zero(currency: Currency) -> Self {
        Self { currency, minor: 0 }
    }

    /// Returns true if the amount is zero.
    #[must_use]
    pub const fn is_zero(&self) -> bool {
        self.minor == 0
    }

    /// Returns true if the amount is negative.
    #[must_use]
    pub const fn is_negative(&self) -> bool {
        self.minor < 0
    }

    /// Checked addition; both operands must share a currency.
    pub fn add(self, other: Self) -> Result<Self, MoneyError> {
        self.require_same_currency(other)?;
        let minor = self.minor.checked_add(other.minor).ok_or(MoneyError::Overflow)?;
        Ok(Self { currency: self.currency, minor })
    }

    /// Checked subtraction; both operands must share a currency.
    pub fn sub(self, other: Self) -> Result<Self, MoneyError> {
        self.require_same_currency(other)?;
        let minor = self.minor.checked_sub(other.minor).ok_or(MoneyError::Overflow)?;
        Ok(Self { currency: self.currency, minor })
    }

    /// Checked negation.
    pub fn neg(self) -> Result<Self, MoneyError> {
        let minor = self.minor.checked_neg().ok_or(MoneyError::Overflow)?;
        Ok(Self { currency: self.currency, minor })
    }

    /// Compares two amounts of the same currency.
    pub fn compare(self, other: Self) -> Result<std::cmp::Ordering, MoneyError> {
        self.require_same_currency(other)?;
        Ok(self.minor.cmp(&other.minor))
    }

    /// The amount as a decimal in major units (e.g. 1050 cents -> 10.50).
    #[must_use]
    pub fn to_decimal(self) -> Decimal {
        Decimal::new(self.minor, self.currency.decimal_places())
    }

    /// Builds an amount from a decimal in major units.
    ///
    /// The value is rounded to the currency's precision with banker's
    /// rounding (round half to even) before conversion to minor units.
    pub fn from_decimal(currency: Currency, value: Decimal) -> Result<Self, MoneyError> {
        let rounded = value.round_dp_with_strategy(
            currency.decimal_places(),
            RoundingStrategy::MidpointNearestEven,
        );
        let scaled = rounded
            .checked_mul(Decimal::from(currency.minor_per_major()))
            .ok_or(MoneyError::Overflow)?;
        let minor = scaled.to_i64().ok_or(MoneyError::Overflow)?;
        Ok(Self { currency, minor })
    }

    /// Multiplies by an exchange rate into the target currency.
    ///
    /// The product is rounded at the target currency's precision with
    /// banker's rounding; the rate used and the rounding residual are
    /// recorded alongside the result.
    pub fn mul_rate(self, rate: Decimal, target: Currency) -> Result<Converted, MoneyError> {
        let exact = self
            .to_decimal()
            .checked_mul(rate)
            .ok_or(MoneyError::Overflow)?;
        let amount = Self::from_decimal(target, exact)?;
        Ok(Converted {
            amount,
            rate_used: rate,
            rounding_residual: exact - amount.to_decimal(),
        })
    }

    fn require_same_currency(self, other: Self) -> Result<(), MoneyError> {
        if self.currency == other.currency {
            Ok(())
        } else {
            Err(MoneyError::CurrencyMismatch {
                left: self.currency,
                right: other.currency,
            })
        }
    }
}

impl std::fmt::Display for Money {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.to_decimal(), self.currency)
    }
}

/// The result of a rate multiplication.
///
/// Every rate application records the rate value and the rounding it
/// applied, so postings can be audited back to the quote.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Converted {
    /// The rounded amount in the target currency.
    pub amount: Money,
    /// The exchange rate that was applied.
    pub rate_used: Decimal,
    /// Exact product minus rounded result, in target major units.
    pub rounding_residual: Decimal,
}
