//! Application configuration management.
//!
//! Layered loading: `config/default` then `config/{RUN_MODE}` files,
//! overridden by `SARRAF__`-prefixed environment variables. Per-tenant
//! settings registered at runtime override these defaults.

use serde::Deserialize;
use uuid::Uuid;

/// Application configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    /// Tenant-level defaults.
    #[serde(default)]
    pub tenant: TenantDefaults,
    /// Engine behaviour.
    #[serde(default)]
    pub engine: EngineConfig,
    /// Ledger behaviour.
    #[serde(default)]
    pub ledger: LedgerConfig,
}

/// Defaults applied to tenants that do not override them.
#[derive(Debug, Clone, Deserialize)]
pub struct TenantDefaults {
    /// Three-letter code used for ledger balancing.
    #[serde(default = "default_base_currency")]
    pub base_currency: String,
    /// Commission calculation mode.
    #[serde(default)]
    pub fee_mode: FeeMode,
    /// Account ids permitted to go negative (tenant operational accounts).
    #[serde(default)]
    pub allow_overdraft_accounts: Vec<Uuid>,
}

fn default_base_currency() -> String {
    "IRR".to_string()
}

impl Default for TenantDefaults {
    fn default() -> Self {
        Self {
            base_currency: default_base_currency(),
            fee_mode: FeeMode::default(),
            allow_overdraft_accounts: Vec::new(),
        }
    }
}

/// Commission calculation mode.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeeMode {
    /// Commission is a percentage of the source amount.
    #[default]
    Percentage,
    /// Commission is a flat amount per transaction.
    Flat,
    /// Commission follows amount tiers.
    Tiered,
}

/// Engine behaviour configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    /// Default operation deadline in milliseconds.
    #[serde(default = "default_deadline_ms")]
    pub default_deadline_ms: u64,
    /// What to do when a caller supplies an existing transaction id.
    #[serde(default)]
    pub duplicate_transaction_id_policy: DuplicateIdPolicy,
    /// Maximum internal retries for transient store failures.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Base delay between internal retries in milliseconds.
    #[serde(default = "default_retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,
}

fn default_deadline_ms() -> u64 {
    5_000
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_base_delay_ms() -> u64 {
    25
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_deadline_ms: default_deadline_ms(),
            duplicate_transaction_id_policy: DuplicateIdPolicy::default(),
            max_retries: default_max_retries(),
            retry_base_delay_ms: default_retry_base_delay_ms(),
        }
    }
}

/// Policy for duplicate caller-supplied transaction ids.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DuplicateIdPolicy {
    /// Reject the creation with a conflict error.
    #[default]
    Reject,
    /// Return the existing transaction unchanged (idempotent create).
    ReturnExisting,
}

/// Ledger behaviour configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LedgerConfig {
    /// Account code receiving per-batch rounding residuals.
    #[serde(default = "default_residual_account_code")]
    pub residual_account_code: String,
    /// Account code receiving commission income.
    #[serde(default = "default_commission_account_code")]
    pub commission_account_code: String,
}

fn default_residual_account_code() -> String {
    "9990-ROUNDING".to_string()
}

fn default_commission_account_code() -> String {
    "4100-COMMISSION".to_string()
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            residual_account_code: default_residual_account_code(),
            commission_account_code: default_commission_account_code(),
        }
    }
}

impl AppConfig {
    /// Loads configuration from environment and config files.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration cannot be loaded.
    pub fn load() -> Result<Self, config::ConfigError> {
        let run_mode = std::env::var("RUN_MODE").unwrap_or_else(|_| "development".to_string());

        let config = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name(&format!("config/{run_mode}")).required(false))
            .add_source(config::Environment::with_prefix("SARRAF").separator("__"))
            .build()?;

        config.try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.tenant.base_currency, "IRR");
        assert_eq!(cfg.tenant.fee_mode, FeeMode::Percentage);
        assert!(cfg.tenant.allow_overdraft_accounts.is_empty());
        assert_eq!(cfg.engine.default_deadline_ms, 5_000);
        assert_eq!(
            cfg.engine.duplicate_transaction_id_policy,
            DuplicateIdPolicy::Reject
        );
        assert_eq!(cfg.engine.max_retries, 3);
        assert_eq!(cfg.ledger.residual_account_code, "9990-ROUNDING");
    }

    #[test]
    fn test_deserialize_from_toml() {
        let cfg: AppConfig = config::Config::builder()
            .add_source(config::File::from_str(
                r#"
                [tenant]
                base_currency = "USD"
                fee_mode = "flat"

                [engine]
                default_deadline_ms = 250
                duplicate_transaction_id_policy = "return_existing"

                [ledger]
                residual_account_code = "9999"
                "#,
                config::FileFormat::Toml,
            ))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();

        assert_eq!(cfg.tenant.base_currency, "USD");
        assert_eq!(cfg.tenant.fee_mode, FeeMode::Flat);
        assert_eq!(cfg.engine.default_deadline_ms, 250);
        assert_eq!(
            cfg.engine.duplicate_transaction_id_policy,
            DuplicateIdPolicy::ReturnExisting
        );
        assert_eq!(cfg.ledger.residual_account_code, "9999");
    }
}
