//! Shared setup for engine integration tests.
#![allow(dead_code)]

use std::sync::Arc;

use chrono::{Duration, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use sarraf_core::rate::{ExchangeRate, RateStatus};
use sarraf_core::split::VerifyDecision;
use sarraf_core::transaction::Transaction;
use sarraf_engine::{CreateTransactionInput, Deadline, Engine, ReceiptInput, TenantConfig};
use sarraf_shared::config::AppConfig;
use sarraf_shared::types::{
    ActorId, BranchId, Currency, CustomerId, Money, RateId, TenantId, TransactionId,
};
use sarraf_store::{InMemoryAuditLog, InMemoryRates};

/// A wired engine with one registered tenant and a USD/IRR rate.
pub struct Harness {
    pub engine: Engine,
    pub rates: Arc<InMemoryRates>,
    pub audit: Arc<InMemoryAuditLog>,
    pub tenant_id: TenantId,
    pub customer_id: CustomerId,
    pub actor: ActorId,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(AppConfig::default())
    }

    pub fn with_config(config: AppConfig) -> Self {
        Self::build(config, None)
    }

    pub fn with_remittance(
        remittance: Arc<dyn sarraf_engine::RemittanceService>,
    ) -> Self {
        Self::build(AppConfig::default(), Some(remittance))
    }

    fn build(
        config: AppConfig,
        remittance: Option<Arc<dyn sarraf_engine::RemittanceService>>,
    ) -> Self {
        // Surface engine logs when a test runs with RUST_LOG set.
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();

        let audit = Arc::new(InMemoryAuditLog::new());
        let rates = Arc::new(InMemoryRates::new(Arc::clone(&audit)));
        let mut builder = Engine::builder(config)
            .audit(Arc::clone(&audit))
            .rates(Arc::clone(&rates) as Arc<dyn sarraf_core::rate::RateProvider>);
        if let Some(remittance) = remittance {
            builder = builder.remittance(remittance);
        }
        let engine = builder.build();

        let tenant_id = TenantId::new();
        engine.register_tenant(
            TenantConfig::from_defaults(tenant_id, "TEH", &AppConfig::default()).unwrap(),
        );

        let harness = Self {
            engine,
            rates,
            audit,
            tenant_id,
            customer_id: CustomerId::new(),
            actor: ActorId::new(),
        };
        harness.add_rate(Currency::Usd, Currency::Irr, dec!(42000), dec!(41000));
        harness
    }

    /// Registers an active rate effective an hour ago.
    pub fn add_rate(&self, from: Currency, to: Currency, buy: Decimal, sell: Decimal) -> RateId {
        self.add_rate_for(self.tenant_id, None, from, to, buy, sell)
    }

    pub fn add_rate_for(
        &self,
        tenant_id: TenantId,
        branch_id: Option<BranchId>,
        from: Currency,
        to: Currency,
        buy: Decimal,
        sell: Decimal,
    ) -> RateId {
        self.rates
            .upsert(
                ExchangeRate {
                    id: RateId::new(),
                    tenant_id,
                    branch_id,
                    from_currency: from,
                    to_currency: to,
                    buy_rate: buy,
                    sell_rate: sell,
                    min_amount: Money::zero(from),
                    max_amount: Money::new(from, i64::MAX).unwrap(),
                    effective_from: Utc::now() - Duration::hours(1),
                    status: RateStatus::Active,
                },
                self.actor,
            )
            .unwrap()
    }

    /// Seeds a customer account with available funds.
    pub fn seed_available(&self, currency: Currency, minor: i64) -> sarraf_shared::types::AccountId {
        let account = self
            .engine
            .accounts()
            .ensure_account(self.tenant_id, self.customer_id, currency);
        self.engine
            .accounts()
            .apply(
                self.tenant_id,
                account.id,
                Money::signed(currency, minor),
                sarraf_store::BalanceKind::Available,
                &sarraf_store::ApplyContext {
                    actor: self.actor,
                    allow_overdraft: false,
                    reference: "seed".to_string(),
                },
            )
            .unwrap();
        account.id
    }

    /// A plain currency-buy input: pay `amount_from`, receive `to`.
    pub fn buy_input(&self, amount_from: Money, to: Currency) -> CreateTransactionInput {
        CreateTransactionInput {
            transaction_id: None,
            customer_id: self.customer_id,
            branch_id: None,
            tx_type: sarraf_core::transaction::TransactionType::CurrencyBuy,
            amount_from,
            to_currency: to,
            source_account_id: None,
            slots: Vec::new(),
            risk_score: None,
            metadata: serde_json::Value::Null,
        }
    }

    pub fn create(&self, input: CreateTransactionInput) -> Transaction {
        self.engine
            .create_transaction(self.tenant_id, self.actor, input, Deadline::none())
            .unwrap()
    }

    /// Attaches a receipt to every pending slot and approves them all.
    pub fn pay_and_verify_all(&self, transaction_id: &TransactionId) -> Transaction {
        let tx = self
            .engine
            .get_transaction(self.tenant_id, transaction_id)
            .unwrap();
        let slot_count = tx.split.slots().len();

        let mut latest = tx;
        for index in 0..slot_count {
            self.engine
                .attach_receipt(
                    self.tenant_id,
                    transaction_id,
                    index,
                    ReceiptInput {
                        file_ref: format!("receipts/{transaction_id}/{index}.jpg"),
                        note: None,
                    },
                    self.actor,
                    Deadline::none(),
                )
                .unwrap();
            latest = self
                .engine
                .verify_slot(
                    self.tenant_id,
                    transaction_id,
                    index,
                    VerifyDecision::Approve,
                    self.actor,
                    Deadline::none(),
                )
                .unwrap();
        }
        latest
    }

    /// Runs a transaction all the way to `completed`.
    pub fn run_to_completion(&self, input: CreateTransactionInput) -> Transaction {
        let tx = self.create(input);
        self.pay_and_verify_all(&tx.id);
        self.engine
            .start_processing(self.tenant_id, &tx.id, self.actor, Deadline::none())
            .unwrap()
    }
}
