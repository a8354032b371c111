//! Ledger entry domain types.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sarraf_shared::types::{
    AccountCode, AccountId, ActorId, Currency, LedgerEntryId, Money, MoneyError, TenantId,
    TransactionId,
};
use serde::{Deserialize, Serialize};

use super::error::LedgerError;
use super::integrity;

/// Side of a double-entry posting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntrySide {
    /// Debit entry (grows asset/expense balances).
    Debit,
    /// Credit entry (grows liability/equity/income balances).
    Credit,
}

/// Lifecycle status of a ledger entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryStatus {
    /// Written but not yet committed with its batch.
    Pending,
    /// Committed; immutable from here on.
    Posted,
    /// Posted and later reversed by a posted mirror entry.
    ///
    /// A reversed entry still participates in balance sums; its mirror
    /// cancels it.
    Reversed,
}

/// Input for a single posting inside a batch.
#[derive(Debug, Clone)]
pub struct NewEntry {
    /// Chart-of-accounts code to post to.
    pub account_code: AccountCode,
    /// Balance account affected, if any (operational codes post without one).
    pub account_id: Option<AccountId>,
    /// Debit or credit.
    pub side: EntrySide,
    /// Posted amount; must be strictly positive.
    pub amount: Money,
    /// Rate from the entry currency into the tenant base currency.
    pub exchange_rate: Decimal,
    /// Line description; hashed, immutable once posted.
    pub description: String,
}

impl NewEntry {
    /// Validates amount sign and rate positivity.
    pub fn validate(&self) -> Result<(), LedgerError> {
        if self.amount.is_negative() {
            return Err(LedgerError::NegativeAmount);
        }
        if self.amount.is_zero() {
            return Err(LedgerError::ZeroAmount);
        }
        if self.exchange_rate <= Decimal::ZERO {
            return Err(LedgerError::NonPositiveRate);
        }
        Ok(())
    }
}

/// A single immutable posting in the tenant's ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    /// Unique identifier for this entry.
    pub id: LedgerEntryId,
    /// Owning tenant.
    pub tenant_id: TenantId,
    /// The transaction this entry belongs to.
    pub transaction_id: TransactionId,
    /// Chart-of-accounts code.
    pub account_code: AccountCode,
    /// Balance account affected, if any.
    pub account_id: Option<AccountId>,
    /// Debit amount in minor units of `currency` (0 if credit).
    pub debit: i64,
    /// Credit amount in minor units of `currency` (0 if debit).
    pub credit: i64,
    /// Currency of the posted amounts.
    pub currency: Currency,
    /// Rate from `currency` into the tenant base currency.
    pub exchange_rate: Decimal,
    /// Lifecycle status.
    pub status: EntryStatus,
    /// The original entry this one reverses, if any.
    pub reversal_of: Option<LedgerEntryId>,
    /// Line description.
    pub description: String,
    /// Per-row SHA-256 tamper detector over the financial fields.
    pub integrity_hash: String,
    /// Actor that created the entry.
    pub created_by: ActorId,
    /// Creation instant.
    pub created_at: DateTime<Utc>,
}

impl LedgerEntry {
    /// Builds a pending entry from batch input, computing its hash.
    pub fn from_input(
        tenant_id: TenantId,
        transaction_id: TransactionId,
        input: &NewEntry,
        created_by: ActorId,
        created_at: DateTime<Utc>,
    ) -> Result<Self, LedgerError> {
        input.validate()?;

        let (debit, credit) = match input.side {
            EntrySide::Debit => (input.amount.minor, 0),
            EntrySide::Credit => (0, input.amount.minor),
        };

        let integrity_hash = integrity::entry_hash(
            tenant_id,
            &transaction_id,
            &input.account_code,
            debit,
            credit,
            input.amount.currency,
            input.exchange_rate,
            &input.description,
        );

        Ok(Self {
            id: LedgerEntryId::new(),
            tenant_id,
            transaction_id,
            account_code: input.account_code.clone(),
            account_id: input.account_id,
            debit,
            credit,
            currency: input.amount.currency,
            exchange_rate: input.exchange_rate,
            status: EntryStatus::Pending,
            reversal_of: None,
            description: input.description.clone(),
            integrity_hash,
            created_by,
            created_at,
        })
    }

    /// Returns the signed amount in minor units (debit positive).
    #[must_use]
    pub const fn signed_minor(&self) -> i64 {
        self.debit - self.credit
    }

    /// Returns true if this entry participates in balance sums.
    ///
    /// Pending entries do not; posted and reversed entries do (a reversed
    /// entry is cancelled by its posted mirror, not excluded).
    #[must_use]
    pub const fn is_committed(&self) -> bool {
        matches!(self.status, EntryStatus::Posted | EntryStatus::Reversed)
    }

    /// Converts the debit amount into base-currency minor units.
    pub fn base_debit(&self, base: Currency) -> Result<i64, MoneyError> {
        self.to_base(self.debit, base)
    }

    /// Converts the credit amount into base-currency minor units.
    pub fn base_credit(&self, base: Currency) -> Result<i64, MoneyError> {
        self.to_base(self.credit, base)
    }

    fn to_base(&self, minor: i64, base: Currency) -> Result<i64, MoneyError> {
        if self.currency == base {
            return Ok(minor);
        }
        let converted = Money::signed(self.currency, minor).mul_rate(self.exchange_rate, base)?;
        Ok(converted.amount.minor)
    }

    /// Recomputes the integrity hash from the current field values.
    #[must_use]
    pub fn compute_hash(&self) -> String {
        integrity::entry_hash(
            self.tenant_id,
            &self.transaction_id,
            &self.account_code,
            self.debit,
            self.credit,
            self.currency,
            self.exchange_rate,
            &self.description,
        )
    }

    /// Returns true if the stored hash matches the recomputed one.
    #[must_use]
    pub fn verify(&self) -> bool {
        self.integrity_hash == self.compute_hash()
    }
}
