//! The tenant registry.
//!
//! Tenants are registered with the settings the engine needs at transaction
//! time: the short code prefixed onto transaction ids, the base currency
//! used for ledger balancing, the commission policy, the overdraft
//! allow-list, and the operational account codes. Per-tenant settings
//! override the application defaults.

use std::collections::HashSet;
use std::str::FromStr;

use dashmap::DashMap;
use sarraf_core::rate::FeePolicy;
use sarraf_shared::config::AppConfig;
use sarraf_shared::types::{AccountCode, AccountId, Currency, TenantId};
use sarraf_shared::{ErrorKind, ServiceError};

/// Per-tenant engine settings.
#[derive(Debug, Clone)]
pub struct TenantConfig {
    /// The tenant.
    pub id: TenantId,
    /// Short code prefixed onto transaction ids (e.g. `TEH`).
    pub code: String,
    /// Currency used for ledger balancing.
    pub base_currency: Currency,
    /// Commission schedule applied at quote time.
    pub fee_policy: FeePolicy,
    /// Account ids permitted to go negative (operational accounts).
    pub allow_overdraft_accounts: HashSet<AccountId>,
    /// Chart code receiving per-batch rounding residuals.
    pub residual_account_code: AccountCode,
    /// Chart code receiving commission income.
    pub commission_account_code: AccountCode,
}

impl TenantConfig {
    /// Builds a tenant config from the application defaults.
    pub fn from_defaults(
        id: TenantId,
        code: impl Into<String>,
        config: &AppConfig,
    ) -> Result<Self, ServiceError> {
        let base_currency = Currency::from_str(&config.tenant.base_currency)
            .map_err(ServiceError::invalid_input)?;

        Ok(Self {
            id,
            code: code.into(),
            base_currency,
            fee_policy: FeePolicy::free(),
            allow_overdraft_accounts: config
                .tenant
                .allow_overdraft_accounts
                .iter()
                .map(|uuid| AccountId::from_uuid(*uuid))
                .collect(),
            residual_account_code: AccountCode::new(config.ledger.residual_account_code.clone()),
            commission_account_code: AccountCode::new(
                config.ledger.commission_account_code.clone(),
            ),
        })
    }

    /// Sets the commission policy.
    #[must_use]
    pub fn with_fee_policy(mut self, fee_policy: FeePolicy) -> Self {
        self.fee_policy = fee_policy;
        self
    }
}

/// Thread-safe registry of tenant configs.
#[derive(Debug, Default)]
pub struct TenantRegistry {
    tenants: DashMap<TenantId, TenantConfig>,
}

impl TenantRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers (or replaces) a tenant.
    pub fn register(&self, config: TenantConfig) {
        self.tenants.insert(config.id, config);
    }

    /// Looks up a tenant, erroring if unregistered.
    pub fn get(&self, tenant_id: TenantId) -> Result<TenantConfig, ServiceError> {
        self.tenants.get(&tenant_id).map(|t| t.clone()).ok_or_else(|| {
            ServiceError::new(ErrorKind::NotFound, format!("tenant not registered: {tenant_id}"))
        })
    }

    /// Marks an account as allowed to overdraft for its tenant.
    pub fn allow_overdraft(&self, tenant_id: TenantId, account_id: AccountId) {
        if let Some(mut tenant) = self.tenants.get_mut(&tenant_id) {
            tenant.allow_overdraft_accounts.insert(account_id);
        }
    }

    /// Returns true if the account may go negative under this tenant.
    #[must_use]
    pub fn may_overdraft(&self, tenant_id: TenantId, account_id: AccountId) -> bool {
        self.tenants
            .get(&tenant_id)
            .is_some_and(|t| t.allow_overdraft_accounts.contains(&account_id))
    }
}
