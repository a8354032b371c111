//! Commission fee policies.
//!
//! A tenant charges commission in one of three modes (`percentage`, `flat`,
//! `tiered`). Commission is always denominated in the currency the customer
//! pays with, rounded with banker's rounding at that currency's precision.

use rust_decimal::Decimal;
use sarraf_shared::types::{Money, MoneyError};
use serde::{Deserialize, Serialize};

/// One tier of a tiered fee schedule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeTier {
    /// Upper bound of the tier in major units; `None` means unbounded.
    pub up_to: Option<Decimal>,
    /// Percentage charged within this tier.
    pub percent: Decimal,
}

/// Commission schedule applied at quote time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "mode")]
pub enum FeePolicy {
    /// A percentage of the paid amount.
    Percentage {
        /// Percent charged, e.g. `0.5` for half a percent.
        percent: Decimal,
    },
    /// A fixed amount in the paid currency's major units.
    Flat {
        /// Major-unit amount charged per transaction.
        amount: Decimal,
    },
    /// Percentage by amount tier; the first matching tier applies.
    Tiered {
        /// Tiers ordered by ascending `up_to`.
        tiers: Vec<FeeTier>,
    },
}

impl FeePolicy {
    /// A zero-commission policy.
    #[must_use]
    pub fn free() -> Self {
        Self::Percentage {
            percent: Decimal::ZERO,
        }
    }

    /// Computes the commission for a paid amount, in the same currency.
    pub fn commission_for(&self, paid: Money) -> Result<Money, MoneyError> {
        let hundred = Decimal::ONE_HUNDRED;
        match self {
            Self::Percentage { percent } => {
                Money::from_decimal(paid.currency, paid.to_decimal() * *percent / hundred)
            }
            Self::Flat { amount } => Money::from_decimal(paid.currency, *amount),
            Self::Tiered { tiers } => {
                let paid_major = paid.to_decimal();
                let percent = tiers
                    .iter()
                    .find(|t| t.up_to.is_none_or(|cap| paid_major <= cap))
                    .map_or(Decimal::ZERO, |t| t.percent);
                Money::from_decimal(paid.currency, paid_major * percent / hundred)
            }
        }
    }
}
