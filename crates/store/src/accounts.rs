//! The account store: per-(tenant, customer, currency) balances.
//!
//! Balances are split into `available` and `held`. Accounts are created
//! automatically on first use in a currency and are closed, never deleted.
//! Every mutation runs under that account's mutex, so credit/debit
//! operations are linearizable per account; different accounts proceed in
//! parallel.

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use sarraf_core::audit::{AuditAction, AuditEntry};
use sarraf_shared::types::{
    AccountId, ActorId, Currency, CustomerId, HoldId, Money, TenantId,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::audit::InMemoryAuditLog;

/// Lifecycle status of an account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccountStatus {
    /// Open for mutations.
    Active,
    /// Temporarily blocked; no mutations.
    Frozen,
    /// Permanently closed; no mutations. Accounts are never deleted.
    Closed,
}

/// A customer balance account in one currency.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    /// Unique identifier.
    pub id: AccountId,
    /// Owning tenant.
    pub tenant_id: TenantId,
    /// Owning customer.
    pub customer_id: CustomerId,
    /// Currency of the balances.
    pub currency: Currency,
    /// Spendable balance in minor units.
    pub available: i64,
    /// Earmarked balance in minor units.
    pub held: i64,
    /// Lifecycle status.
    pub status: AccountStatus,
    /// Creation instant.
    pub created_at: DateTime<Utc>,
    /// Last mutation instant.
    pub updated_at: DateTime<Utc>,
}

impl Account {
    /// Total balance: available plus held.
    #[must_use]
    pub const fn total(&self) -> i64 {
        self.available + self.held
    }
}

/// Which balance an `apply` targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BalanceKind {
    /// The spendable balance.
    Available,
    /// The earmarked balance.
    Held,
}

/// Context for a balance mutation.
#[derive(Debug, Clone)]
pub struct ApplyContext {
    /// Who drove the mutation.
    pub actor: ActorId,
    /// Permit the available balance to go negative (tenant operational
    /// accounts only; the engine enforces the allow-list).
    pub allow_overdraft: bool,
    /// What the mutation belongs to, e.g. a transaction id.
    pub reference: String,
}

/// Lifecycle status of a hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
enum HoldStatus {
    Active,
    Released,
    Consumed,
}

/// An earmark moving funds from available to held.
#[derive(Debug, Clone)]
struct Hold {
    tenant_id: TenantId,
    account_id: AccountId,
    amount: Money,
    status: HoldStatus,
}

/// One step of an account's balance journal, for as-of queries.
#[derive(Debug, Clone, Copy)]
struct BalanceChange {
    at: DateTime<Utc>,
    delta_available: i64,
    delta_held: i64,
}

#[derive(Debug)]
struct AccountRecord {
    account: Account,
    journal: Vec<BalanceChange>,
}

/// Errors from account operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AccountError {
    /// Account not found.
    #[error("Account not found: {0}")]
    NotFound(AccountId),

    /// The account belongs to a different tenant.
    #[error("Account {0} belongs to a different tenant")]
    TenantMismatch(AccountId),

    /// The mutation currency does not match the account currency.
    #[error("Account is denominated in {account}, not {requested}")]
    CurrencyMismatch {
        /// The account's currency.
        account: Currency,
        /// The mutation's currency.
        requested: Currency,
    },

    /// Available balance would go negative.
    #[error("Insufficient funds on account {account_id}: available {available}, required {required}")]
    InsufficientAvailable {
        /// The account.
        account_id: AccountId,
        /// Current available minor units.
        available: i64,
        /// Required minor units.
        required: i64,
    },

    /// The account status forbids mutations.
    #[error("Account {account_id} is {status:?} and cannot be mutated")]
    NotActive {
        /// The account.
        account_id: AccountId,
        /// Its status.
        status: AccountStatus,
    },

    /// Hold not found.
    #[error("Hold not found: {0}")]
    HoldNotFound(HoldId),

    /// The hold was already released or consumed.
    #[error("Hold {0} is no longer active")]
    HoldNotActive(HoldId),

    /// Balance arithmetic overflowed 64-bit minor units.
    #[error("Balance arithmetic overflow on account {0}")]
    Overflow(AccountId),
}

impl From<AccountError> for sarraf_shared::ServiceError {
    fn from(err: AccountError) -> Self {
        use sarraf_shared::ErrorKind;
        let kind = match &err {
            AccountError::NotFound(_) | AccountError::HoldNotFound(_) => ErrorKind::NotFound,
            AccountError::TenantMismatch(_) => ErrorKind::TenantIsolationViolation,
            AccountError::CurrencyMismatch { .. } => ErrorKind::CurrencyMismatch,
            AccountError::InsufficientAvailable { .. } => ErrorKind::InsufficientFunds,
            AccountError::NotActive { .. } | AccountError::Overflow(_) => ErrorKind::InvalidInput,
            AccountError::HoldNotActive(_) => ErrorKind::Conflict,
        };
        Self::new(kind, err.to_string())
    }
}

/// Thread-safe in-memory account store.
pub struct InMemoryAccounts {
    records: DashMap<AccountId, Arc<Mutex<AccountRecord>>>,
    index: DashMap<(TenantId, CustomerId, Currency), AccountId>,
    holds: DashMap<HoldId, Hold>,
    audit: Arc<InMemoryAuditLog>,
}

impl InMemoryAccounts {
    /// Creates an empty store appending to the given audit log.
    #[must_use]
    pub fn new(audit: Arc<InMemoryAuditLog>) -> Self {
        Self {
            records: DashMap::new(),
            index: DashMap::new(),
            holds: DashMap::new(),
            audit,
        }
    }

    /// Returns the account for (customer, currency), creating it with zero
    /// balances if absent. Idempotent.
    pub fn ensure_account(
        &self,
        tenant_id: TenantId,
        customer_id: CustomerId,
        currency: Currency,
    ) -> Account {
        let key = (tenant_id, customer_id, currency);
        let account_id = *self.index.entry(key).or_insert_with(|| {
            let now = Utc::now();
            let account = Account {
                id: AccountId::new(),
                tenant_id,
                customer_id,
                currency,
                available: 0,
                held: 0,
                status: AccountStatus::Active,
                created_at: now,
                updated_at: now,
            };
            let id = account.id;
            self.records.insert(
                id,
                Arc::new(Mutex::new(AccountRecord {
                    account,
                    journal: Vec::new(),
                })),
            );
            id
        });

        self.get(tenant_id, account_id)
            .expect("indexed account must exist")
    }

    /// Reads an account, tenant-checked.
    pub fn get(&self, tenant_id: TenantId, account_id: AccountId) -> Result<Account, AccountError> {
        let record = self
            .records
            .get(&account_id)
            .ok_or(AccountError::NotFound(account_id))?;
        let guard = record.lock().expect("account lock poisoned");
        if guard.account.tenant_id != tenant_id {
            return Err(AccountError::TenantMismatch(account_id));
        }
        Ok(guard.account.clone())
    }

    /// Atomically credits or debits one balance of an account.
    ///
    /// The mutation is rejected unless the account is active, the currency
    /// matches, and the resulting available balance is non-negative (or the
    /// context allows overdraft).
    pub fn apply(
        &self,
        tenant_id: TenantId,
        account_id: AccountId,
        delta: Money,
        kind: BalanceKind,
        ctx: &ApplyContext,
    ) -> Result<Account, AccountError> {
        self.mutate(tenant_id, account_id, |account| {
            if account.currency != delta.currency {
                return Err(AccountError::CurrencyMismatch {
                    account: account.currency,
                    requested: delta.currency,
                });
            }

            let (delta_available, delta_held) = match kind {
                BalanceKind::Available => (delta.minor, 0),
                BalanceKind::Held => (0, delta.minor),
            };

            let available = account
                .available
                .checked_add(delta_available)
                .ok_or(AccountError::Overflow(account_id))?;
            let held = account
                .held
                .checked_add(delta_held)
                .ok_or(AccountError::Overflow(account_id))?;

            if available < 0 && !ctx.allow_overdraft {
                return Err(AccountError::InsufficientAvailable {
                    account_id,
                    available: account.available,
                    required: -delta.minor,
                });
            }
            if held < 0 {
                return Err(AccountError::Overflow(account_id));
            }

            account.available = available;
            account.held = held;
            Ok(((delta_available, delta_held), ()))
        })
        .map(|(account, _)| {
            self.audit.append(
                AuditEntry::new(
                    tenant_id,
                    ctx.actor,
                    AuditAction::BalanceApplied,
                    format!("account:{account_id}"),
                )
                .with_after(serde_json::json!({
                    "delta": delta.minor,
                    "kind": format!("{kind:?}"),
                    "reference": ctx.reference,
                })),
            );
            account
        })
    }

    /// Moves `amount` from available to held, returning the hold id.
    pub fn hold(
        &self,
        tenant_id: TenantId,
        account_id: AccountId,
        amount: Money,
        actor: ActorId,
    ) -> Result<HoldId, AccountError> {
        let (_, hold_id) = self.mutate(tenant_id, account_id, |account| {
            if account.currency != amount.currency {
                return Err(AccountError::CurrencyMismatch {
                    account: account.currency,
                    requested: amount.currency,
                });
            }
            if account.available < amount.minor {
                return Err(AccountError::InsufficientAvailable {
                    account_id,
                    available: account.available,
                    required: amount.minor,
                });
            }

            account.available -= amount.minor;
            account.held += amount.minor;

            let hold_id = HoldId::new();
            self.holds.insert(
                hold_id,
                Hold {
                    tenant_id,
                    account_id,
                    amount,
                    status: HoldStatus::Active,
                },
            );
            Ok(((-amount.minor, amount.minor), hold_id))
        })?;

        self.audit.append(
            AuditEntry::new(
                tenant_id,
                actor,
                AuditAction::HoldPlaced,
                format!("account:{account_id}"),
            )
            .with_after(serde_json::json!({ "hold_id": hold_id, "amount": amount.minor })),
        );
        Ok(hold_id)
    }

    /// Returns a hold's amount to the available balance.
    pub fn release(
        &self,
        tenant_id: TenantId,
        hold_id: HoldId,
        actor: ActorId,
    ) -> Result<(), AccountError> {
        self.finish_hold(tenant_id, hold_id, actor, HoldStatus::Released)
    }

    /// Debits a hold's amount from the held balance.
    pub fn consume(
        &self,
        tenant_id: TenantId,
        hold_id: HoldId,
        actor: ActorId,
    ) -> Result<(), AccountError> {
        self.finish_hold(tenant_id, hold_id, actor, HoldStatus::Consumed)
    }

    /// Changes an account's lifecycle status.
    ///
    /// Accounts are never deleted; they are frozen or closed. Reopening a
    /// closed account is allowed only by setting it active again through
    /// this same administrative surface.
    pub fn set_status(
        &self,
        tenant_id: TenantId,
        account_id: AccountId,
        status: AccountStatus,
        actor: ActorId,
    ) -> Result<Account, AccountError> {
        let record = self
            .records
            .get(&account_id)
            .ok_or(AccountError::NotFound(account_id))?
            .clone();
        let mut guard = record.lock().expect("account lock poisoned");
        if guard.account.tenant_id != tenant_id {
            return Err(AccountError::TenantMismatch(account_id));
        }

        let before = guard.account.status;
        guard.account.status = status;
        guard.account.updated_at = Utc::now();
        let after = guard.account.clone();
        drop(guard);

        self.audit.append(
            AuditEntry::new(
                tenant_id,
                actor,
                AuditAction::AccountStatusChanged,
                format!("account:{account_id}"),
            )
            .with_before(serde_json::json!({ "status": before }))
            .with_after(serde_json::json!({ "status": status })),
        );
        Ok(after)
    }

    /// Current available balance as `Money`.
    pub fn balance(
        &self,
        tenant_id: TenantId,
        account_id: AccountId,
    ) -> Result<Money, AccountError> {
        let account = self.get(tenant_id, account_id)?;
        Ok(Money::signed(account.currency, account.available))
    }

    /// Available balance as of an instant, reconstructed from the journal.
    pub fn balance_as_of(
        &self,
        tenant_id: TenantId,
        account_id: AccountId,
        as_of: DateTime<Utc>,
    ) -> Result<Money, AccountError> {
        let record = self
            .records
            .get(&account_id)
            .ok_or(AccountError::NotFound(account_id))?;
        let guard = record.lock().expect("account lock poisoned");
        if guard.account.tenant_id != tenant_id {
            return Err(AccountError::TenantMismatch(account_id));
        }

        let available = guard
            .journal
            .iter()
            .filter(|c| c.at <= as_of)
            .map(|c| c.delta_available)
            .sum();
        Ok(Money::signed(guard.account.currency, available))
    }

    fn finish_hold(
        &self,
        tenant_id: TenantId,
        hold_id: HoldId,
        actor: ActorId,
        target: HoldStatus,
    ) -> Result<(), AccountError> {
        // Snapshot the hold first; the per-account mutex is the write gate.
        let (account_id, amount) = {
            let hold = self
                .holds
                .get(&hold_id)
                .ok_or(AccountError::HoldNotFound(hold_id))?;
            if hold.tenant_id != tenant_id {
                return Err(AccountError::HoldNotFound(hold_id));
            }
            (hold.account_id, hold.amount)
        };

        self.mutate(tenant_id, account_id, |account| {
            let mut hold = self
                .holds
                .get_mut(&hold_id)
                .ok_or(AccountError::HoldNotFound(hold_id))?;
            if hold.status != HoldStatus::Active {
                return Err(AccountError::HoldNotActive(hold_id));
            }
            hold.status = target;

            account.held -= amount.minor;
            let delta_available = match target {
                HoldStatus::Released => {
                    account.available += amount.minor;
                    amount.minor
                }
                HoldStatus::Consumed | HoldStatus::Active => 0,
            };
            Ok(((delta_available, -amount.minor), ()))
        })?;

        let action = match target {
            HoldStatus::Released => AuditAction::HoldReleased,
            _ => AuditAction::HoldConsumed,
        };
        self.audit.append(
            AuditEntry::new(tenant_id, actor, action, format!("account:{account_id}"))
                .with_after(serde_json::json!({ "hold_id": hold_id, "amount": amount.minor })),
        );
        Ok(())
    }

    /// Runs a closure under the account mutex and journals its deltas.
    fn mutate<R>(
        &self,
        tenant_id: TenantId,
        account_id: AccountId,
        f: impl FnOnce(&mut Account) -> Result<((i64, i64), R), AccountError>,
    ) -> Result<(Account, R), AccountError> {
        let record = self
            .records
            .get(&account_id)
            .ok_or(AccountError::NotFound(account_id))?
            .clone();
        let mut guard = record.lock().expect("account lock poisoned");

        if guard.account.tenant_id != tenant_id {
            return Err(AccountError::TenantMismatch(account_id));
        }
        match guard.account.status {
            AccountStatus::Active => {}
            status => {
                return Err(AccountError::NotActive { account_id, status });
            }
        }

        let ((delta_available, delta_held), out) = f(&mut guard.account)?;
        let now = Utc::now();
        guard.account.updated_at = now;
        guard.journal.push(BalanceChange {
            at: now,
            delta_available,
            delta_held,
        });
        Ok((guard.account.clone(), out))
    }
}

impl std::fmt::Debug for InMemoryAccounts {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryAccounts")
            .field("accounts", &self.records.len())
            .field("holds", &self.holds.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> InMemoryAccounts {
        InMemoryAccounts::new(Arc::new(InMemoryAuditLog::new()))
    }

    fn ctx() -> ApplyContext {
        ApplyContext {
            actor: ActorId::new(),
            allow_overdraft: false,
            reference: "TEH00000005001".to_string(),
        }
    }

    fn usd(minor: i64) -> Money {
        Money::signed(Currency::Usd, minor)
    }

    #[test]
    fn test_ensure_account_is_idempotent() {
        let store = store();
        let tenant = TenantId::new();
        let customer = CustomerId::new();

        let first = store.ensure_account(tenant, customer, Currency::Usd);
        let second = store.ensure_account(tenant, customer, Currency::Usd);
        assert_eq!(first.id, second.id);
        assert_eq!(first.available, 0);

        // A different currency opens a separate account.
        let eur = store.ensure_account(tenant, customer, Currency::Eur);
        assert_ne!(eur.id, first.id);
    }

    #[test]
    fn test_apply_credit_and_debit() {
        let store = store();
        let tenant = TenantId::new();
        let account = store.ensure_account(tenant, CustomerId::new(), Currency::Usd);

        let after = store
            .apply(tenant, account.id, usd(500_000), BalanceKind::Available, &ctx())
            .unwrap();
        assert_eq!(after.available, 500_000);

        let after = store
            .apply(tenant, account.id, usd(-200_000), BalanceKind::Available, &ctx())
            .unwrap();
        assert_eq!(after.available, 300_000);
    }

    #[test]
    fn test_apply_rejects_overdraft() {
        let store = store();
        let tenant = TenantId::new();
        let account = store.ensure_account(tenant, CustomerId::new(), Currency::Usd);

        let result = store.apply(tenant, account.id, usd(-1), BalanceKind::Available, &ctx());
        assert!(matches!(
            result,
            Err(AccountError::InsufficientAvailable { .. })
        ));

        // Designated operational accounts may overdraft.
        let mut overdraft_ctx = ctx();
        overdraft_ctx.allow_overdraft = true;
        let after = store
            .apply(
                tenant,
                account.id,
                usd(-750),
                BalanceKind::Available,
                &overdraft_ctx,
            )
            .unwrap();
        assert_eq!(after.available, -750);
    }

    #[test]
    fn test_apply_rejects_currency_mismatch() {
        let store = store();
        let tenant = TenantId::new();
        let account = store.ensure_account(tenant, CustomerId::new(), Currency::Usd);

        let result = store.apply(
            tenant,
            account.id,
            Money::signed(Currency::Eur, 100),
            BalanceKind::Available,
            &ctx(),
        );
        assert!(matches!(result, Err(AccountError::CurrencyMismatch { .. })));
    }

    #[test]
    fn test_cross_tenant_access_is_refused() {
        let store = store();
        let tenant_a = TenantId::new();
        let tenant_b = TenantId::new();
        let account = store.ensure_account(tenant_a, CustomerId::new(), Currency::Usd);

        assert_eq!(
            store.get(tenant_b, account.id),
            Err(AccountError::TenantMismatch(account.id))
        );
        assert!(matches!(
            store.apply(tenant_b, account.id, usd(100), BalanceKind::Available, &ctx()),
            Err(AccountError::TenantMismatch(_))
        ));
    }

    #[test]
    fn test_hold_moves_available_to_held() {
        let store = store();
        let tenant = TenantId::new();
        let account = store.ensure_account(tenant, CustomerId::new(), Currency::Usd);
        store
            .apply(tenant, account.id, usd(500_000), BalanceKind::Available, &ctx())
            .unwrap();

        let hold_id = store
            .hold(tenant, account.id, usd(200_000), ActorId::new())
            .unwrap();

        let account = store.get(tenant, account.id).unwrap();
        assert_eq!(account.available, 300_000);
        assert_eq!(account.held, 200_000);
        assert_eq!(account.total(), 500_000);

        // Releasing returns the funds.
        store.release(tenant, hold_id, ActorId::new()).unwrap();
        let account = store.get(tenant, account.id).unwrap();
        assert_eq!(account.available, 500_000);
        assert_eq!(account.held, 0);
    }

    #[test]
    fn test_consume_debits_held() {
        let store = store();
        let tenant = TenantId::new();
        let account = store.ensure_account(tenant, CustomerId::new(), Currency::Usd);
        store
            .apply(tenant, account.id, usd(500_000), BalanceKind::Available, &ctx())
            .unwrap();

        let hold_id = store
            .hold(tenant, account.id, usd(200_000), ActorId::new())
            .unwrap();
        store.consume(tenant, hold_id, ActorId::new()).unwrap();

        let account = store.get(tenant, account.id).unwrap();
        assert_eq!(account.available, 300_000);
        assert_eq!(account.held, 0);

        // A hold finishes exactly once.
        assert_eq!(
            store.consume(tenant, hold_id, ActorId::new()),
            Err(AccountError::HoldNotActive(hold_id))
        );
        assert_eq!(
            store.release(tenant, hold_id, ActorId::new()),
            Err(AccountError::HoldNotActive(hold_id))
        );
    }

    #[test]
    fn test_hold_requires_available() {
        let store = store();
        let tenant = TenantId::new();
        let account = store.ensure_account(tenant, CustomerId::new(), Currency::Usd);
        store
            .apply(tenant, account.id, usd(100_000), BalanceKind::Available, &ctx())
            .unwrap();

        let result = store.hold(tenant, account.id, usd(100_001), ActorId::new());
        assert!(matches!(
            result,
            Err(AccountError::InsufficientAvailable { .. })
        ));
    }

    #[test]
    fn test_balance_as_of() {
        let store = store();
        let tenant = TenantId::new();
        let account = store.ensure_account(tenant, CustomerId::new(), Currency::Usd);

        let pause = || std::thread::sleep(std::time::Duration::from_millis(2));

        let before_any = Utc::now();
        pause();
        store
            .apply(tenant, account.id, usd(100), BalanceKind::Available, &ctx())
            .unwrap();
        pause();
        let after_first = Utc::now();
        pause();
        store
            .apply(tenant, account.id, usd(50), BalanceKind::Available, &ctx())
            .unwrap();

        assert_eq!(
            store.balance_as_of(tenant, account.id, before_any).unwrap().minor,
            0
        );
        assert_eq!(
            store.balance_as_of(tenant, account.id, after_first).unwrap().minor,
            100
        );
        assert_eq!(
            store.balance_as_of(tenant, account.id, Utc::now()).unwrap().minor,
            150
        );
        assert_eq!(store.balance(tenant, account.id).unwrap().minor, 150);
    }

    #[test]
    fn test_frozen_account_rejects_mutations() {
        let store = store();
        let tenant = TenantId::new();
        let account = store.ensure_account(tenant, CustomerId::new(), Currency::Usd);

        store
            .set_status(tenant, account.id, AccountStatus::Frozen, ActorId::new())
            .unwrap();
        assert!(matches!(
            store.apply(tenant, account.id, usd(100), BalanceKind::Available, &ctx()),
            Err(AccountError::NotActive { .. })
        ));

        // Reactivation restores the mutation surface.
        store
            .set_status(tenant, account.id, AccountStatus::Active, ActorId::new())
            .unwrap();
        assert!(store
            .apply(tenant, account.id, usd(100), BalanceKind::Available, &ctx())
            .is_ok());
    }

    #[test]
    fn test_closed_account_is_kept_not_deleted() {
        let store = store();
        let tenant = TenantId::new();
        let account = store.ensure_account(tenant, CustomerId::new(), Currency::Usd);

        store
            .set_status(tenant, account.id, AccountStatus::Closed, ActorId::new())
            .unwrap();

        // The row survives and still reads; only mutations are refused.
        let closed = store.get(tenant, account.id).unwrap();
        assert_eq!(closed.status, AccountStatus::Closed);
        assert!(matches!(
            store.apply(tenant, account.id, usd(1), BalanceKind::Available, &ctx()),
            Err(AccountError::NotActive { .. })
        ));
    }
}
