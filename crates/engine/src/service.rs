//! The transaction engine.
//!
//! `Engine` binds money math, rate lookup, the account store, the ledger,
//! the payment-split tracker, and the event bus into one service surface.
//! There is no global state: an engine value owns its collaborators, and
//! tests inject fakes through the builder.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sarraf_core::audit::{AuditAction, AuditEntry};
use sarraf_core::events::{Event, EventBus};
use sarraf_core::ledger::{EntrySide, EntryStatus, LedgerEntry, NewEntry};
use sarraf_core::rate::{calculate_conversion, RateKind, RateProvider};
use sarraf_core::split::{PaymentSplit, ReceiptMeta, SlotOutcome, SlotSpec, VerifyDecision};
use sarraf_core::transaction::{
    Note, StatusChange, Transaction, TransactionStatus, TransactionType,
};
use sarraf_shared::config::{AppConfig, DuplicateIdPolicy};
use sarraf_shared::types::{
    AccountCode, AccountId, ActorId, BranchId, Currency, CustomerId, Money, PageRequest,
    PageResponse, TenantId, TransactionId,
};
use sarraf_shared::{ErrorKind, ServiceError, ServiceResult};
use sarraf_store::{
    Account, ApplyContext, BalanceKind, InMemoryAccounts, InMemoryAuditLog, InMemoryLedger,
    InMemoryRates, InMemoryTransactions, TransactionFilter, TransactionStoreError,
};

use crate::deadline::Deadline;
use crate::ids;
use crate::remittance::{NullRemittance, RemittanceService};
use crate::retry::with_retries;
use crate::tenants::{TenantConfig, TenantRegistry};

/// Chart code for tenant cash received from customers.
const CASH_CODE: &str = "1000-CASH";
/// Chart code absorbing the tenant's net FX position per settlement.
const FX_POSITION_CODE: &str = "2050-FX-POSITION";
/// Chart code for remittance counterparty payables.
const REMITTANCE_CODE: &str = "2060-REMITTANCE-PAYABLE";
/// Default payment slot name when the caller does not split.
const DEFAULT_SLOT: &str = "PAY-MAIN";

/// Input for creating a transaction.
#[derive(Debug, Clone)]
pub struct CreateTransactionInput {
    /// Caller-supplied id for idempotent creation; generated if absent.
    pub transaction_id: Option<TransactionId>,
    /// The customer transacting.
    pub customer_id: CustomerId,
    /// Branch scope for rate lookup, if any.
    pub branch_id: Option<BranchId>,
    /// Kind of transaction.
    pub tx_type: TransactionType,
    /// What the customer pays (or sells).
    pub amount_from: Money,
    /// Currency the customer receives.
    pub to_currency: Currency,
    /// Source account for sell/exchange/hold; resolved from the customer
    /// and paid currency when absent.
    pub source_account_id: Option<AccountId>,
    /// Payment slots; a single slot covering the total is used when empty.
    pub slots: Vec<SlotSpec>,
    /// Advisory risk score.
    pub risk_score: Option<u8>,
    /// Opaque metadata blob.
    pub metadata: serde_json::Value,
}

/// Receipt upload metadata as the external layer hands it over.
#[derive(Debug, Clone)]
pub struct ReceiptInput {
    /// Opaque reference into the upload store.
    pub file_ref: String,
    /// Free-form note from the uploader.
    pub note: Option<String>,
}

/// Fields mutable after settlement.
#[derive(Debug, Clone, Default)]
pub struct MetadataPatch {
    /// Notes to append.
    pub notes: Vec<Note>,
    /// Replacement tags, if set.
    pub tags: Option<Vec<String>>,
    /// Replacement metadata blob, if set.
    pub metadata: Option<serde_json::Value>,
}

/// The multi-tenant currency transaction engine.
pub struct Engine {
    config: AppConfig,
    tenants: TenantRegistry,
    accounts: Arc<InMemoryAccounts>,
    ledger: Arc<InMemoryLedger>,
    transactions: Arc<InMemoryTransactions>,
    rates: Arc<dyn RateProvider>,
    remittance: Arc<dyn RemittanceService>,
    events: Arc<EventBus>,
    audit: Arc<InMemoryAuditLog>,
}

/// Builder wiring an engine's collaborators.
pub struct EngineBuilder {
    config: AppConfig,
    audit: Option<Arc<InMemoryAuditLog>>,
    rates: Option<Arc<dyn RateProvider>>,
    remittance: Option<Arc<dyn RemittanceService>>,
    events: Option<Arc<EventBus>>,
}

impl EngineBuilder {
    /// Overrides the audit log (shared with externally built stores).
    #[must_use]
    pub fn audit(mut self, audit: Arc<InMemoryAuditLog>) -> Self {
        self.audit = Some(audit);
        self
    }

    /// Overrides the rate provider.
    #[must_use]
    pub fn rates(mut self, rates: Arc<dyn RateProvider>) -> Self {
        self.rates = Some(rates);
        self
    }

    /// Overrides the remittance service.
    #[must_use]
    pub fn remittance(mut self, remittance: Arc<dyn RemittanceService>) -> Self {
        self.remittance = Some(remittance);
        self
    }

    /// Overrides the event bus.
    #[must_use]
    pub fn events(mut self, events: Arc<EventBus>) -> Self {
        self.events = Some(events);
        self
    }

    /// Builds the engine, defaulting any collaborator not injected.
    #[must_use]
    pub fn build(self) -> Engine {
        let audit = self
            .audit
            .unwrap_or_else(|| Arc::new(InMemoryAuditLog::new()));
        let rates = self
            .rates
            .unwrap_or_else(|| Arc::new(InMemoryRates::new(Arc::clone(&audit))));
        Engine {
            config: self.config,
            tenants: TenantRegistry::new(),
            accounts: Arc::new(InMemoryAccounts::new(Arc::clone(&audit))),
            ledger: Arc::new(InMemoryLedger::new(Arc::clone(&audit))),
            transactions: Arc::new(InMemoryTransactions::new()),
            rates,
            remittance: self.remittance.unwrap_or_else(|| Arc::new(NullRemittance)),
            events: self.events.unwrap_or_else(|| Arc::new(EventBus::new())),
            audit,
        }
    }
}

impl Engine {
    /// Starts building an engine with the given configuration.
    #[must_use]
    pub fn builder(config: AppConfig) -> EngineBuilder {
        EngineBuilder {
            config,
            audit: None,
            rates: None,
            remittance: None,
            events: None,
        }
    }

    /// Registers a tenant.
    pub fn register_tenant(&self, tenant: TenantConfig) {
        self.tenants.register(tenant);
    }

    /// The tenant registry (operational-account allow-listing).
    #[must_use]
    pub fn tenants(&self) -> &TenantRegistry {
        &self.tenants
    }

    /// The account store.
    #[must_use]
    pub fn accounts(&self) -> &InMemoryAccounts {
        &self.accounts
    }

    /// The ledger store.
    #[must_use]
    pub fn ledger(&self) -> &InMemoryLedger {
        &self.ledger
    }

    /// The event bus, for subscriptions.
    #[must_use]
    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// The audit log.
    #[must_use]
    pub fn audit(&self) -> &InMemoryAuditLog {
        &self.audit
    }

    /// The default deadline from configuration.
    #[must_use]
    pub fn default_deadline(&self) -> Deadline {
        Deadline::after_ms(self.config.engine.default_deadline_ms)
    }

    // ------------------------------------------------------------------
    // Create
    // ------------------------------------------------------------------

    /// Creates a transaction in `pending_payment`.
    pub fn create_transaction(
        &self,
        tenant_id: TenantId,
        actor: ActorId,
        input: CreateTransactionInput,
        deadline: Deadline,
    ) -> ServiceResult<Transaction> {
        deadline.check()?;
        let tenant = self.tenants.get(tenant_id)?;

        if input.amount_from.minor <= 0 {
            return Err(ServiceError::invalid_input("amount must be positive"));
        }

        if let Some(id) = &input.transaction_id {
            if self.transactions.contains(tenant_id, id) {
                return self.handle_duplicate_id(tenant_id, id);
            }
        }

        // Resolve the source account first: a cross-tenant reference must
        // fail before any state changes.
        let source_account = self.resolve_source_account(tenant_id, actor, &input)?;

        // Price the transaction.
        let (amount_to, commission, total_owed, rate, rate_kind) = self.price(
            tenant_id,
            &tenant,
            &input,
        )?;

        // The split must validate before any hold is placed.
        let split = if input.slots.is_empty() {
            PaymentSplit::single(AccountCode::from(DEFAULT_SLOT), total_owed)
        } else {
            PaymentSplit::new(input.slots.clone(), total_owed)
        }
        .map_err(ServiceError::from)?;

        // Sell and hold transactions earmark the customer's funds now.
        let hold_id = match input.tx_type {
            TransactionType::CurrencySell | TransactionType::Hold => {
                let account = source_account
                    .as_ref()
                    .expect("source account resolved for sell/hold");
                Some(
                    self.accounts
                        .hold(tenant_id, account.id, total_owed, actor)
                        .map_err(ServiceError::from)?,
                )
            }
            _ => None,
        };

        let release_hold = |engine: &Self| {
            if let Some(hold) = hold_id {
                let _ = engine.accounts.release(tenant_id, hold, actor);
            }
        };

        // Abort atomically if the deadline passed before the commit point.
        if let Err(err) = deadline.check() {
            release_hold(self);
            return Err(err);
        }

        let now = Utc::now();
        let mut tx = Transaction {
            id: input
                .transaction_id
                .clone()
                .unwrap_or_else(|| ids::transaction_id(&tenant.code, now)),
            reference: ids::reference_number(now),
            tenant_id,
            customer_id: input.customer_id,
            branch_id: input.branch_id,
            tx_type: input.tx_type,
            amount_from: input.amount_from,
            amount_to,
            rate,
            rate_kind,
            commission,
            total_owed,
            status: TransactionStatus::PendingPayment,
            split,
            hold_id,
            risk_score: input.risk_score,
            notes: Vec::new(),
            tags: Vec::new(),
            metadata: input.metadata.clone(),
            created_by: actor,
            created_at: now,
            status_history: vec![StatusChange {
                status: TransactionStatus::PendingPayment,
                at: now,
                actor,
                reason: None,
            }],
            reversed: false,
            reversed_at: None,
            integrity_flagged: false,
        };

        let inserted = loop {
            match self.transactions.insert(tx.clone()) {
                Ok(inserted) => break inserted,
                Err(TransactionStoreError::DuplicateId(_)) if input.transaction_id.is_none() => {
                    tx.id = ids::transaction_id(&tenant.code, Utc::now());
                }
                Err(TransactionStoreError::DuplicateId(id)) => {
                    release_hold(self);
                    return self.handle_duplicate_id(tenant_id, &id);
                }
                Err(TransactionStoreError::DuplicateReference(_)) => {
                    tx.reference = ids::reference_number(Utc::now());
                }
                Err(err) => {
                    release_hold(self);
                    return Err(err.into());
                }
            }
        };

        tracing::info!(
            tenant = %tenant_id,
            transaction = %inserted.id,
            tx_type = ?inserted.tx_type,
            "transaction created"
        );
        self.audit.append(
            AuditEntry::new(
                tenant_id,
                actor,
                AuditAction::TransactionCreated,
                format!("transaction:{}", inserted.id),
            )
            .with_after(serde_json::json!({
                "type": inserted.tx_type,
                "amount_from": inserted.amount_from,
                "amount_to": inserted.amount_to,
                "total_owed": inserted.total_owed,
            })),
        );

        // Past the commit point the transaction stands; a late deadline is
        // reported so the caller can poll by id.
        if deadline.is_expired() {
            return Err(Deadline::committed_but_timed_out(inserted.id.as_str()));
        }
        Ok(inserted)
    }

    fn handle_duplicate_id(
        &self,
        tenant_id: TenantId,
        id: &TransactionId,
    ) -> ServiceResult<Transaction> {
        match self.config.engine.duplicate_transaction_id_policy {
            DuplicateIdPolicy::Reject => Err(ServiceError::conflict(format!(
                "duplicate transaction id: {id}"
            ))),
            DuplicateIdPolicy::ReturnExisting => {
                self.transactions.get(tenant_id, id).map_err(Into::into)
            }
        }
    }

    /// Resolves and tenant-guards the source account where one applies.
    fn resolve_source_account(
        &self,
        tenant_id: TenantId,
        actor: ActorId,
        input: &CreateTransactionInput,
    ) -> ServiceResult<Option<Account>> {
        let needs_source = matches!(
            input.tx_type,
            TransactionType::CurrencySell | TransactionType::Exchange | TransactionType::Hold
        );
        if !needs_source && input.source_account_id.is_none() {
            return Ok(None);
        }

        let account = match input.source_account_id {
            Some(account_id) => self.accounts.get(tenant_id, account_id).map_err(|err| {
                let service_err = ServiceError::from(err);
                if service_err.kind == ErrorKind::TenantIsolationViolation {
                    tracing::error!(
                        tenant = %tenant_id,
                        account = %account_id,
                        "cross-tenant account reference refused"
                    );
                    self.audit.append(
                        AuditEntry::new(
                            tenant_id,
                            actor,
                            AuditAction::IsolationViolationAttempt,
                            format!("account:{account_id}"),
                        )
                        .with_reason("transaction create referenced a foreign account"),
                    );
                }
                service_err
            })?,
            None => self.accounts.ensure_account(
                tenant_id,
                input.customer_id,
                input.amount_from.currency,
            ),
        };
        Ok(Some(account))
    }

    /// Computes amounts, commission, and the captured rate for an input.
    fn price(
        &self,
        tenant_id: TenantId,
        tenant: &TenantConfig,
        input: &CreateTransactionInput,
    ) -> ServiceResult<(Money, Money, Money, Decimal, RateKind)> {
        if input.tx_type == TransactionType::Hold {
            // Earmarking has no conversion leg and charges no commission.
            return Ok((
                input.amount_from,
                Money::zero(input.amount_from.currency),
                input.amount_from,
                Decimal::ONE,
                RateKind::Buy,
            ));
        }

        let kind = match input.tx_type {
            TransactionType::CurrencySell => RateKind::Sell,
            _ => RateKind::Buy,
        };

        let rate = with_retries(&self.config.engine, || {
            self.rates
                .current(
                    tenant_id,
                    input.amount_from.currency,
                    input.to_currency,
                    input.branch_id,
                    Utc::now(),
                )
                .map_err(ServiceError::from)
        })?;

        let quote = calculate_conversion(&rate, input.amount_from, kind, &tenant.fee_policy)
            .map_err(ServiceError::from)?;

        // Range limits are denominated in the rate's base currency; check
        // whichever leg carries it.
        let ranged = if input.amount_from.currency == rate.from_currency {
            input.amount_from
        } else {
            quote.converted_amount
        };
        rate.validate_amount(ranged).map_err(ServiceError::from)?;

        Ok((
            quote.converted_amount,
            quote.commission,
            quote.total_cost,
            quote.rate_used,
            kind,
        ))
    }

    // ------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------

    /// Reads a transaction, annotating it if its ledger rows fail
    /// verification.
    pub fn get_transaction(
        &self,
        tenant_id: TenantId,
        transaction_id: &TransactionId,
    ) -> ServiceResult<Transaction> {
        let tx = self
            .transactions
            .get(tenant_id, transaction_id)
            .map_err(ServiceError::from)?;

        let (entries, valid) = self.ledger.entries_for_transaction(tenant_id, transaction_id);
        if !entries.is_empty() && !valid && !tx.integrity_flagged {
            tracing::error!(
                tenant = %tenant_id,
                transaction = %transaction_id,
                "ledger integrity mismatch; transaction degraded to read-only"
            );
            self.audit.append(AuditEntry::new(
                tenant_id,
                ActorId::from_uuid(uuid::Uuid::nil()),
                AuditAction::IntegrityFlagged,
                format!("transaction:{transaction_id}"),
            ));
            return self
                .transactions
                .with_mut(tenant_id, transaction_id, |tx| {
                    tx.integrity_flagged = true;
                    Ok::<Transaction, ServiceError>(tx.clone())
                })
                .map_err(ServiceError::from)?;
        }
        Ok(tx)
    }

    /// Lists a tenant's transactions, filtered and paginated.
    #[must_use]
    pub fn list_transactions(
        &self,
        tenant_id: TenantId,
        filter: &TransactionFilter,
        page: PageRequest,
    ) -> PageResponse<Transaction> {
        self.transactions.list(tenant_id, filter, page)
    }

    /// Current (or as-of) available balance of an account.
    pub fn get_account_balance(
        &self,
        tenant_id: TenantId,
        account_id: AccountId,
        as_of: Option<DateTime<Utc>>,
    ) -> ServiceResult<Money> {
        match as_of {
            Some(at) => self
                .accounts
                .balance_as_of(tenant_id, account_id, at)
                .map_err(Into::into),
            None => self.accounts.balance(tenant_id, account_id).map_err(Into::into),
        }
    }

    /// Verifies every committed ledger entry of a tenant.
    #[must_use]
    pub fn validate_ledger_integrity(
        &self,
        tenant_id: TenantId,
    ) -> sarraf_store::IntegrityReport {
        self.ledger.validate_integrity(tenant_id)
    }

    /// A tenant's audit trail, optionally narrowed to one aggregate.
    #[must_use]
    pub fn audit_trail(
        &self,
        tenant_id: TenantId,
        aggregate: Option<&str>,
    ) -> Vec<AuditEntry> {
        match aggregate {
            Some(key) => self.audit.for_aggregate(tenant_id, key),
            None => self.audit.for_tenant(tenant_id),
        }
    }

    // ------------------------------------------------------------------
    // Payment split
    // ------------------------------------------------------------------

    /// Attaches a receipt to a pending slot.
    pub fn attach_receipt(
        &self,
        tenant_id: TenantId,
        transaction_id: &TransactionId,
        slot_index: usize,
        receipt: ReceiptInput,
        actor: ActorId,
        deadline: Deadline,
    ) -> ServiceResult<Transaction> {
        deadline.check()?;
        let now = Utc::now();

        let updated = self
            .transactions
            .with_mut(tenant_id, transaction_id, |tx| {
                Self::require_awaiting_payment(tx)?;
                tx.split
                    .attach_receipt(
                        slot_index,
                        ReceiptMeta {
                            file_ref: receipt.file_ref.clone(),
                            uploaded_by: actor,
                            uploaded_at: now,
                            note: receipt.note.clone(),
                        },
                    )
                    .map_err(ServiceError::from)?;
                Ok::<Transaction, ServiceError>(tx.clone())
            })
            .map_err(ServiceError::from)??;

        self.audit.append(
            AuditEntry::new(
                tenant_id,
                actor,
                AuditAction::ReceiptAttached,
                format!("transaction:{transaction_id}"),
            )
            .with_after(serde_json::json!({ "slot": slot_index })),
        );
        self.events.publish(&Event::ReceiptAttached {
            tenant_id,
            transaction_id: transaction_id.clone(),
            slot_index,
        });
        Ok(updated)
    }

    /// Applies a verification decision to a paid slot, advancing the
    /// transaction state as progress changes.
    pub fn verify_slot(
        &self,
        tenant_id: TenantId,
        transaction_id: &TransactionId,
        slot_index: usize,
        decision: VerifyDecision,
        actor: ActorId,
        deadline: Deadline,
    ) -> ServiceResult<Transaction> {
        deadline.check()?;
        let now = Utc::now();

        let (updated, outcome) = self
            .transactions
            .with_mut(tenant_id, transaction_id, |tx| {
                Self::require_awaiting_payment(tx)?;
                let outcome = tx
                    .split
                    .verify_slot(slot_index, decision)
                    .map_err(ServiceError::from)?;

                if outcome == SlotOutcome::Verified {
                    if tx.split.is_complete() {
                        tx.transition(TransactionStatus::PaymentComplete, actor, None, now)
                            .map_err(ServiceError::from)?;
                    } else if tx.status == TransactionStatus::PendingPayment {
                        tx.transition(TransactionStatus::PartialPaid, actor, None, now)
                            .map_err(ServiceError::from)?;
                    }
                }
                Ok::<(Transaction, SlotOutcome), ServiceError>((tx.clone(), outcome))
            })
            .map_err(ServiceError::from)??;

        let action = match outcome {
            SlotOutcome::Verified => AuditAction::SlotVerified,
            SlotOutcome::Rejected => AuditAction::SlotRejected,
            SlotOutcome::ClarificationRequested => AuditAction::ClarificationRequested,
        };
        self.audit.append(
            AuditEntry::new(
                tenant_id,
                actor,
                action,
                format!("transaction:{transaction_id}"),
            )
            .with_after(serde_json::json!({
                "slot": slot_index,
                "progress": updated.split.progress(),
            })),
        );

        if outcome == SlotOutcome::Verified {
            self.events.publish(&Event::ReceiptVerified {
                tenant_id,
                transaction_id: transaction_id.clone(),
                slot_index,
            });
            if updated.status == TransactionStatus::PaymentComplete {
                self.events.publish(&Event::PaymentSplitCompleted {
                    tenant_id,
                    transaction_id: transaction_id.clone(),
                });
            }
        }
        Ok(updated)
    }

    fn require_awaiting_payment(tx: &Transaction) -> ServiceResult<()> {
        match tx.status {
            TransactionStatus::PendingPayment | TransactionStatus::PartialPaid => Ok(()),
            status => Err(ServiceError::new(
                ErrorKind::InvalidTransition,
                format!("payment slots are frozen in status {status:?}"),
            )),
        }
    }

    // ------------------------------------------------------------------
    // Settlement
    // ------------------------------------------------------------------

    /// Operator command: settle a fully paid transaction.
    ///
    /// Moves `payment_complete → processing`, applies the account and
    /// ledger effects as one atomic unit, and finishes in `completed`.
    /// Failures abort: the hold is released, applied account mutations are
    /// rolled back, and the transaction ends in `failed`.
    pub fn start_processing(
        &self,
        tenant_id: TenantId,
        transaction_id: &TransactionId,
        actor: ActorId,
        deadline: Deadline,
    ) -> ServiceResult<Transaction> {
        deadline.check()?;
        let tenant = self.tenants.get(tenant_id)?;
        let now = Utc::now();

        let result = self
            .transactions
            .with_mut(tenant_id, transaction_id, |tx| {
                let checkpoint = tx.clone();
                tx.transition(TransactionStatus::Processing, actor, None, now)
                    .map_err(ServiceError::from)?;

                match self.settle(&tenant, tx, actor, deadline) {
                    Ok(()) => {
                        tx.transition(TransactionStatus::Completed, actor, None, Utc::now())
                            .map_err(ServiceError::from)?;
                        Ok::<Transaction, ServiceError>(tx.clone())
                    }
                    Err(err) if err.kind == ErrorKind::Timeout => {
                        // Deadline expired before the commit point: the
                        // abort is atomic and the status is unchanged.
                        *tx = checkpoint;
                        Err(err)
                    }
                    Err(err) => {
                        if let Some(hold) = tx.hold_id.take() {
                            let _ = self.accounts.release(tenant_id, hold, actor);
                        }
                        tx.transition(
                            TransactionStatus::Failed,
                            actor,
                            Some(err.message.clone()),
                            Utc::now(),
                        )
                        .map_err(ServiceError::from)?;
                        Err(err)
                    }
                }
            })
            .map_err(ServiceError::from)?;

        match result {
            Ok(tx) => {
                tracing::info!(tenant = %tenant_id, transaction = %transaction_id, "settlement committed");
                self.events.publish(&Event::TransactionCompleted {
                    tenant_id,
                    transaction_id: transaction_id.clone(),
                });
                Ok(tx)
            }
            Err(err) => {
                if err.kind != ErrorKind::Timeout {
                    tracing::warn!(
                        tenant = %tenant_id,
                        transaction = %transaction_id,
                        error = %err,
                        "settlement aborted"
                    );
                    self.events.publish(&Event::TransactionFailed {
                        tenant_id,
                        transaction_id: transaction_id.clone(),
                        reason: err.message.clone(),
                    });
                }
                Err(err)
            }
        }
    }

    /// Applies the account and ledger effects of settlement.
    ///
    /// Runs under the transaction mutex. Account mutations that fail roll
    /// back everything applied so far; the ledger batch is pre-balanced and
    /// posts last, after which the hold (if any) is consumed.
    fn settle(
        &self,
        tenant: &TenantConfig,
        tx: &Transaction,
        actor: ActorId,
        deadline: Deadline,
    ) -> ServiceResult<()> {
        let tenant_id = tx.tenant_id;
        let base = tenant.base_currency;
        let mut legs: Vec<NewEntry> = Vec::new();
        let mut applied: Vec<(AccountId, Money)> = Vec::new();

        if let Err(err) = self.settle_moves(tenant, tx, actor, base, &mut legs, &mut applied) {
            self.rollback(tenant_id, tx, actor, &applied);
            return Err(err);
        }

        // Close the batch on the FX position account so it balances by
        // construction; per-entry rounding then nets to zero.
        match self.closing_leg(&legs, base) {
            Ok(Some(closing)) => legs.push(closing),
            Ok(None) => {}
            Err(err) => {
                self.rollback(tenant_id, tx, actor, &applied);
                return Err(err);
            }
        }

        // Commit point: nothing past here may run once the deadline expired.
        if let Err(err) = deadline.check() {
            self.rollback(tenant_id, tx, actor, &applied);
            return Err(err);
        }

        if let Err(err) = self.ledger.post_batch(
            tenant_id,
            &tx.id,
            legs,
            actor,
            base,
            &tenant.residual_account_code,
        ) {
            self.rollback(tenant_id, tx, actor, &applied);
            return Err(err.into());
        }

        // The hold, if any, is consumed only after the batch is committed.
        if let Some(hold) = tx.hold_id {
            self.accounts
                .consume(tenant_id, hold, actor)
                .map_err(ServiceError::from)?;
        }
        Ok(())
    }

    /// The per-type account mutations and their ledger legs.
    fn settle_moves(
        &self,
        tenant: &TenantConfig,
        tx: &Transaction,
        actor: ActorId,
        base: Currency,
        legs: &mut Vec<NewEntry>,
        applied: &mut Vec<(AccountId, Money)>,
    ) -> ServiceResult<()> {
        match tx.tx_type {
            TransactionType::CurrencyBuy => {
                // Destination currency account is created on first credit.
                self.apply_customer_leg(tx, tx.amount_to, base, actor, applied, legs)?;
                self.push_payment_legs(tx, tenant, base, legs)?;
            }
            TransactionType::CurrencySell => {
                // The held source funds leave the customer's account.
                legs.push(self.held_source_leg(tx, base)?);
                self.apply_customer_leg(tx, tx.amount_to, base, actor, applied, legs)?;
                self.push_commission_leg(tx, base, tenant, legs)?;
            }
            TransactionType::Exchange => {
                // Debit the source first; it may legitimately fail.
                let debit = Money::signed(tx.total_owed.currency, -tx.total_owed.minor);
                self.apply_customer_leg(tx, debit, base, actor, applied, legs)?;
                self.apply_customer_leg(tx, tx.amount_to, base, actor, applied, legs)?;
                self.push_commission_leg(tx, base, tenant, legs)?;
            }
            TransactionType::Remittance => {
                // Counterparty leg is external; record only the local leg.
                self.remittance.dispatch(tx)?;
                self.push_payment_legs(tx, tenant, base, legs)?;
                legs.push(NewEntry {
                    account_code: AccountCode::from(REMITTANCE_CODE),
                    account_id: None,
                    side: EntrySide::Credit,
                    amount: tx.amount_from,
                    exchange_rate: self.base_multiplier(
                        tx.tenant_id,
                        tx,
                        tx.amount_from.currency,
                        base,
                    )?,
                    description: format!("remittance payable {}", tx.id),
                });
            }
            TransactionType::Hold => {
                legs.push(self.held_source_leg(tx, base)?);
            }
        }
        Ok(())
    }

    /// Applies a signed delta to the customer's account in the delta's
    /// currency and records the matching ledger leg.
    fn apply_customer_leg(
        &self,
        tx: &Transaction,
        delta: Money,
        base: Currency,
        actor: ActorId,
        applied: &mut Vec<(AccountId, Money)>,
        legs: &mut Vec<NewEntry>,
    ) -> ServiceResult<()> {
        let account =
            self.accounts
                .ensure_account(tx.tenant_id, tx.customer_id, delta.currency);
        self.accounts
            .apply(
                tx.tenant_id,
                account.id,
                delta,
                BalanceKind::Available,
                &ApplyContext {
                    actor,
                    // Only designated tenant operational accounts may go
                    // negative; customer accounts never do.
                    allow_overdraft: self.tenants.may_overdraft(tx.tenant_id, account.id),
                    reference: tx.id.to_string(),
                },
            )
            .map_err(ServiceError::from)?;
        applied.push((account.id, delta));

        legs.push(NewEntry {
            account_code: customer_code(delta.currency),
            account_id: Some(account.id),
            side: if delta.minor >= 0 {
                EntrySide::Debit
            } else {
                EntrySide::Credit
            },
            amount: Money::signed(delta.currency, delta.minor.abs()),
            exchange_rate: self.base_multiplier(tx.tenant_id, tx, delta.currency, base)?,
            description: format!("customer leg {}", tx.id),
        });
        Ok(())
    }

    /// Compensates already-applied account mutations after an abort.
    fn rollback(
        &self,
        tenant_id: TenantId,
        tx: &Transaction,
        actor: ActorId,
        applied: &[(AccountId, Money)],
    ) {
        for (account_id, delta) in applied.iter().rev() {
            let compensation = Money::signed(delta.currency, -delta.minor);
            let _ = self.accounts.apply(
                tenant_id,
                *account_id,
                compensation,
                BalanceKind::Available,
                &ApplyContext {
                    actor,
                    allow_overdraft: true,
                    reference: format!("rollback:{}", tx.id),
                },
            );
        }
    }

    /// Ledger legs for a cash payment received through payment slots.
    fn push_payment_legs(
        &self,
        tx: &Transaction,
        tenant: &TenantConfig,
        base: Currency,
        legs: &mut Vec<NewEntry>,
    ) -> ServiceResult<()> {
        legs.push(NewEntry {
            account_code: AccountCode::from(CASH_CODE),
            account_id: None,
            side: EntrySide::Debit,
            amount: tx.total_owed,
            exchange_rate: self.base_multiplier(tx.tenant_id, tx, tx.total_owed.currency, base)?,
            description: format!("customer payment {}", tx.id),
        });
        self.push_commission_leg(tx, base, tenant, legs)
    }

    /// Commission income leg, when commission was charged.
    fn push_commission_leg(
        &self,
        tx: &Transaction,
        base: Currency,
        tenant: &TenantConfig,
        legs: &mut Vec<NewEntry>,
    ) -> ServiceResult<()> {
        if tx.commission.minor > 0 {
            legs.push(NewEntry {
                account_code: tenant.commission_account_code.clone(),
                account_id: None,
                side: EntrySide::Credit,
                amount: tx.commission,
                exchange_rate: self.base_multiplier(
                    tx.tenant_id,
                    tx,
                    tx.commission.currency,
                    base,
                )?,
                description: format!("commission {}", tx.id),
            });
        }
        Ok(())
    }

    /// The credit leg for held source funds leaving the customer account.
    fn held_source_leg(&self, tx: &Transaction, base: Currency) -> ServiceResult<NewEntry> {
        let source = self.accounts.ensure_account(
            tx.tenant_id,
            tx.customer_id,
            tx.total_owed.currency,
        );
        Ok(NewEntry {
            account_code: customer_code(tx.total_owed.currency),
            account_id: Some(source.id),
            side: EntrySide::Credit,
            amount: tx.total_owed,
            exchange_rate: self.base_multiplier(tx.tenant_id, tx, tx.total_owed.currency, base)?,
            description: format!("customer leg {}", tx.id),
        })
    }

    /// Builds the FX-position leg that balances the batch exactly.
    fn closing_leg(
        &self,
        legs: &[NewEntry],
        base: Currency,
    ) -> ServiceResult<Option<NewEntry>> {
        let mut imbalance: i64 = 0;
        for leg in legs {
            let in_base = if leg.amount.currency == base {
                leg.amount.minor
            } else {
                leg.amount
                    .mul_rate(leg.exchange_rate, base)
                    .map_err(ServiceError::from)?
                    .amount
                    .minor
            };
            imbalance += match leg.side {
                EntrySide::Debit => in_base,
                EntrySide::Credit => -in_base,
            };
        }

        if imbalance == 0 {
            return Ok(None);
        }
        Ok(Some(NewEntry {
            account_code: AccountCode::from(FX_POSITION_CODE),
            account_id: None,
            side: if imbalance > 0 {
                EntrySide::Credit
            } else {
                EntrySide::Debit
            },
            amount: Money::signed(base, imbalance.abs()),
            exchange_rate: Decimal::ONE,
            description: "fx position".to_string(),
        }))
    }

    /// Multiplier converting one unit of `currency` into the base currency.
    fn base_multiplier(
        &self,
        tenant_id: TenantId,
        tx: &Transaction,
        currency: Currency,
        base: Currency,
    ) -> ServiceResult<Decimal> {
        if currency == base {
            return Ok(Decimal::ONE);
        }
        // The captured rate covers the transaction's own pair against base.
        let pair = (tx.amount_from.currency, tx.amount_to.currency);
        if (pair.0 == currency && pair.1 == base) || (pair.1 == currency && pair.0 == base) {
            return Ok(tx.rate);
        }
        // Otherwise value the leg at the current buy rate against base.
        let rate = self
            .rates
            .current(tenant_id, currency, base, tx.branch_id, Utc::now())
            .map_err(ServiceError::from)?;
        if rate.from_currency == currency {
            Ok(rate.buy_rate)
        } else {
            Decimal::ONE
                .checked_div(rate.buy_rate)
                .ok_or_else(|| ServiceError::invalid_input("degenerate valuation rate"))
        }
    }

    // ------------------------------------------------------------------
    // Cancel / Reverse / Metadata
    // ------------------------------------------------------------------

    /// Cancels a transaction before settlement, releasing any hold.
    pub fn cancel_transaction(
        &self,
        tenant_id: TenantId,
        transaction_id: &TransactionId,
        reason: &str,
        actor: ActorId,
        deadline: Deadline,
    ) -> ServiceResult<Transaction> {
        deadline.check()?;
        let now = Utc::now();

        let updated = self
            .transactions
            .with_mut(tenant_id, transaction_id, |tx| {
                tx.transition(
                    TransactionStatus::Cancelled,
                    actor,
                    Some(reason.to_string()),
                    now,
                )
                .map_err(ServiceError::from)?;
                if let Some(hold) = tx.hold_id.take() {
                    self.accounts
                        .release(tenant_id, hold, actor)
                        .map_err(ServiceError::from)?;
                }
                Ok::<Transaction, ServiceError>(tx.clone())
            })
            .map_err(ServiceError::from)??;

        self.audit.append(
            AuditEntry::new(
                tenant_id,
                actor,
                AuditAction::StatusChanged,
                format!("transaction:{transaction_id}"),
            )
            .with_after(serde_json::json!({ "status": "cancelled" }))
            .with_reason(reason),
        );
        self.events.publish(&Event::TransactionCancelled {
            tenant_id,
            transaction_id: transaction_id.clone(),
            reason: reason.to_string(),
        });
        Ok(updated)
    }

    /// Reverses a completed transaction: compensating account operations
    /// plus a ledger mirror for every posted entry. History is preserved;
    /// nothing is deleted.
    pub fn reverse_transaction(
        &self,
        tenant_id: TenantId,
        transaction_id: &TransactionId,
        reason: &str,
        actor: ActorId,
        deadline: Deadline,
    ) -> ServiceResult<Transaction> {
        deadline.check()?;
        let now = Utc::now();

        let updated = self
            .transactions
            .with_mut(tenant_id, transaction_id, |tx| {
                tx.check_reversible().map_err(ServiceError::from)?;

                let (entries, valid) =
                    self.ledger.entries_for_transaction(tenant_id, transaction_id);
                if !valid {
                    tx.integrity_flagged = true;
                    return Err(ServiceError::new(
                        ErrorKind::IntegrityFailure,
                        "ledger rows failed verification; transaction is read-only",
                    ));
                }

                let posted: Vec<&LedgerEntry> = entries
                    .iter()
                    .filter(|e| e.status == EntryStatus::Posted)
                    .collect();

                // Compensate balances first, then mirror the postings.
                for entry in &posted {
                    if let Some(account_id) = entry.account_id {
                        let compensation =
                            Money::signed(entry.currency, -entry.signed_minor());
                        self.accounts
                            .apply(
                                tenant_id,
                                account_id,
                                compensation,
                                BalanceKind::Available,
                                &ApplyContext {
                                    actor,
                                    allow_overdraft: true,
                                    reference: format!("reversal:{transaction_id}"),
                                },
                            )
                            .map_err(ServiceError::from)?;
                    }
                }
                for entry in &posted {
                    self.ledger
                        .reverse(tenant_id, entry.id, reason, actor)
                        .map_err(ServiceError::from)?;
                }

                tx.reversed = true;
                tx.reversed_at = Some(now);
                tx.notes.push(Note::System(format!("reversed: {reason}")));
                Ok::<Transaction, ServiceError>(tx.clone())
            })
            .map_err(ServiceError::from)??;

        tracing::info!(tenant = %tenant_id, transaction = %transaction_id, "transaction reversed");
        self.audit.append(
            AuditEntry::new(
                tenant_id,
                actor,
                AuditAction::TransactionReversed,
                format!("transaction:{transaction_id}"),
            )
            .with_reason(reason),
        );
        self.events.publish(&Event::TransactionReversed {
            tenant_id,
            transaction_id: transaction_id.clone(),
        });
        Ok(updated)
    }

    /// Updates the mutable metadata of a transaction.
    ///
    /// Financial fields are immutable after settlement; only notes, tags,
    /// and the metadata blob may change. Deletion is forbidden; use
    /// [`Engine::reverse_transaction`].
    pub fn update_metadata(
        &self,
        tenant_id: TenantId,
        transaction_id: &TransactionId,
        patch: MetadataPatch,
        actor: ActorId,
    ) -> ServiceResult<Transaction> {
        let updated = self
            .transactions
            .with_mut(tenant_id, transaction_id, |tx| {
                tx.notes.extend(patch.notes.clone());
                if let Some(tags) = patch.tags.clone() {
                    tx.tags = tags;
                }
                if let Some(metadata) = patch.metadata.clone() {
                    tx.metadata = metadata;
                }
                Ok::<Transaction, ServiceError>(tx.clone())
            })
            .map_err(ServiceError::from)??;

        self.audit.append(AuditEntry::new(
            tenant_id,
            actor,
            AuditAction::MetadataUpdated,
            format!("transaction:{transaction_id}"),
        ));
        Ok(updated)
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("transactions", &self.transactions)
            .field("accounts", &self.accounts)
            .field("ledger", &self.ledger)
            .finish()
    }
}

/// Chart code for a customer balance account in one currency.
fn customer_code(currency: Currency) -> AccountCode {
    AccountCode::new(format!("1010-CUSTOMER-{currency}"))
}
