//! Currency sell with a hold, and hold-type earmarks.

mod common;

use common::Harness;
use sarraf_core::transaction::{TransactionStatus, TransactionType};
use sarraf_engine::Deadline;
use sarraf_shared::types::{Currency, Money};
use sarraf_shared::ErrorKind;

fn sell_input(h: &Harness, minor: i64) -> sarraf_engine::CreateTransactionInput {
    sarraf_engine::CreateTransactionInput {
        transaction_id: None,
        customer_id: h.customer_id,
        branch_id: None,
        tx_type: TransactionType::CurrencySell,
        amount_from: Money::new(Currency::Usd, minor).unwrap(),
        to_currency: Currency::Irr,
        source_account_id: None,
        slots: Vec::new(),
        risk_score: None,
        metadata: serde_json::Value::Null,
    }
}

#[test]
fn sell_places_hold_and_settles() {
    let h = Harness::new();
    let usd_account = h.seed_available(Currency::Usd, 500_000); // 5,000.00 USD

    // Sell 2,000 USD at sell rate 41,000.
    let tx = h.create(sell_input(&h, 200_000));
    assert!(tx.hold_id.is_some());
    assert_eq!(
        tx.amount_to,
        Money::new(Currency::Irr, 82_000_000).unwrap()
    );

    // The hold is visible immediately.
    let account = h.engine.accounts().get(h.tenant_id, usd_account).unwrap();
    assert_eq!(account.available, 300_000);
    assert_eq!(account.held, 200_000);

    // Settle: hold consumed, rial credited.
    h.pay_and_verify_all(&tx.id);
    let tx = h
        .engine
        .start_processing(h.tenant_id, &tx.id, h.actor, Deadline::none())
        .unwrap();
    assert_eq!(tx.status, TransactionStatus::Completed);

    let usd = h.engine.accounts().get(h.tenant_id, usd_account).unwrap();
    assert_eq!(usd.available, 300_000);
    assert_eq!(usd.held, 0);

    let irr_account = h
        .engine
        .accounts()
        .ensure_account(h.tenant_id, h.customer_id, Currency::Irr);
    assert_eq!(irr_account.available, 82_000_000);

    assert!(h.engine.validate_ledger_integrity(h.tenant_id).is_clean());
}

#[test]
fn oversized_second_sell_fails_insufficient_funds() {
    let h = Harness::new();
    h.seed_available(Currency::Usd, 500_000);

    // First sell holds 2,000 USD; only 3,000 remains available.
    let first = h.create(sell_input(&h, 200_000));
    assert_eq!(first.status, TransactionStatus::PendingPayment);

    let err = h
        .engine
        .create_transaction(h.tenant_id, h.actor, sell_input(&h, 400_000), Deadline::none())
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::InsufficientFunds);
}

#[test]
fn concurrent_sells_only_one_wins_the_balance() {
    let h = Harness::new();
    h.seed_available(Currency::Usd, 500_000);

    // Two concurrent sells of 4,000 USD each against 5,000 available:
    // exactly one may succeed.
    let results: Vec<bool> = std::thread::scope(|scope| {
        let handles: Vec<_> = (0..2)
            .map(|_| {
                let h = &h;
                scope.spawn(move || {
                    h.engine
                        .create_transaction(
                            h.tenant_id,
                            h.actor,
                            sell_input(h, 400_000),
                            Deadline::none(),
                        )
                        .is_ok()
                })
            })
            .collect();
        handles.into_iter().map(|j| j.join().unwrap()).collect()
    });

    assert_eq!(results.iter().filter(|ok| **ok).count(), 1);
}

#[test]
fn cancel_before_settlement_releases_hold() {
    let h = Harness::new();
    let usd_account = h.seed_available(Currency::Usd, 500_000);

    let tx = h.create(sell_input(&h, 200_000));
    assert_eq!(
        h.engine.accounts().get(h.tenant_id, usd_account).unwrap().available,
        300_000
    );

    h.engine
        .cancel_transaction(h.tenant_id, &tx.id, "customer changed their mind", h.actor, Deadline::none())
        .unwrap();

    let account = h.engine.accounts().get(h.tenant_id, usd_account).unwrap();
    assert_eq!(account.available, 500_000);
    assert_eq!(account.held, 0);

    let tx = h.engine.get_transaction(h.tenant_id, &tx.id).unwrap();
    assert_eq!(tx.status, TransactionStatus::Cancelled);
    assert!(tx.hold_id.is_none());
}

#[test]
fn hold_type_earmarks_without_conversion() {
    let h = Harness::new();
    let usd_account = h.seed_available(Currency::Usd, 500_000);

    let tx = h.create(sarraf_engine::CreateTransactionInput {
        tx_type: TransactionType::Hold,
        ..sell_input(&h, 100_000)
    });
    assert_eq!(tx.amount_to, tx.amount_from);
    assert!(tx.commission.is_zero());

    let account = h.engine.accounts().get(h.tenant_id, usd_account).unwrap();
    assert_eq!(account.available, 400_000);
    assert_eq!(account.held, 100_000);

    // Settlement consumes the earmark.
    h.pay_and_verify_all(&tx.id);
    h.engine
        .start_processing(h.tenant_id, &tx.id, h.actor, Deadline::none())
        .unwrap();

    let account = h.engine.accounts().get(h.tenant_id, usd_account).unwrap();
    assert_eq!(account.available, 400_000);
    assert_eq!(account.held, 0);
}
