//! Multi-slot payment splits: partial payment, rejection, completion.

mod common;

use common::Harness;
use sarraf_core::split::{SlotSpec, SlotStatus, VerifyDecision};
use sarraf_core::transaction::{TransactionStatus, TransactionType};
use sarraf_engine::{CreateTransactionInput, Deadline, ReceiptInput};
use sarraf_shared::types::{AccountCode, Currency, Money};
use sarraf_shared::ErrorKind;

/// A buy paid in three 100.00 USD slots.
fn three_slot_input(h: &Harness) -> CreateTransactionInput {
    let slot = |name: &str| SlotSpec {
        account_ref: AccountCode::from(name),
        expected: Money::new(Currency::Usd, 10_000).unwrap(),
    };
    CreateTransactionInput {
        transaction_id: None,
        customer_id: h.customer_id,
        branch_id: None,
        tx_type: TransactionType::CurrencyBuy,
        amount_from: Money::new(Currency::Usd, 30_000).unwrap(),
        to_currency: Currency::Irr,
        source_account_id: None,
        slots: vec![slot("PAY-BANK-A"), slot("PAY-BANK-B"), slot("PAY-CASH")],
        risk_score: None,
        metadata: serde_json::Value::Null,
    }
}

fn attach(h: &Harness, id: &sarraf_shared::types::TransactionId, index: usize) {
    h.engine
        .attach_receipt(
            h.tenant_id,
            id,
            index,
            ReceiptInput {
                file_ref: format!("receipts/{id}/{index}.jpg"),
                note: None,
            },
            h.actor,
            Deadline::none(),
        )
        .unwrap();
}

fn verify(
    h: &Harness,
    id: &sarraf_shared::types::TransactionId,
    index: usize,
    decision: VerifyDecision,
) -> sarraf_core::transaction::Transaction {
    h.engine
        .verify_slot(h.tenant_id, id, index, decision, h.actor, Deadline::none())
        .unwrap()
}

#[test]
fn partial_payment_walks_the_states() {
    let h = Harness::new();
    let tx = h.create(three_slot_input(&h));
    assert_eq!(tx.split.progress().percentage, 0);

    // First verified slot: partial_paid at 33%.
    attach(&h, &tx.id, 0);
    let tx = verify(&h, &tx.id, 0, VerifyDecision::Approve);
    assert_eq!(tx.status, TransactionStatus::PartialPaid);
    assert_eq!(tx.split.progress().percentage, 33);

    // Verify slot 1, then reject slot 0: back to 33%, still partial_paid,
    // slot 1 stays verified and slot 0 returns to pending.
    attach(&h, &tx.id, 1);
    let tx = verify(&h, &tx.id, 1, VerifyDecision::Approve);
    assert_eq!(tx.split.progress().percentage, 66);

    attach(&h, &tx.id, 0);
    let tx = verify(&h, &tx.id, 0, VerifyDecision::Reject);
    assert_eq!(tx.status, TransactionStatus::PartialPaid);
    assert_eq!(tx.split.progress().percentage, 33);
    assert_eq!(tx.split.slots()[0].status, SlotStatus::Pending);
    assert!(tx.split.slots()[0].receipt.is_none());
    assert_eq!(tx.split.slots()[1].status, SlotStatus::Verified);

    // All three verified: payment_complete.
    attach(&h, &tx.id, 0);
    verify(&h, &tx.id, 0, VerifyDecision::Approve);
    attach(&h, &tx.id, 2);
    let tx = verify(&h, &tx.id, 2, VerifyDecision::Approve);
    assert_eq!(tx.status, TransactionStatus::PaymentComplete);
    assert_eq!(tx.split.progress().percentage, 100);
}

#[test]
fn clarification_keeps_slot_paid() {
    let h = Harness::new();
    let tx = h.create(three_slot_input(&h));

    attach(&h, &tx.id, 0);
    let tx = verify(&h, &tx.id, 0, VerifyDecision::RequestClarification);
    assert_eq!(tx.status, TransactionStatus::PendingPayment);
    assert_eq!(tx.split.slots()[0].status, SlotStatus::Paid);
    assert!(tx.split.slots()[0].receipt.is_some());

    // The clarification is on the audit trail.
    let trail = h
        .engine
        .audit_trail(h.tenant_id, Some(&format!("transaction:{}", tx.id)));
    assert!(trail
        .iter()
        .any(|e| e.action == sarraf_core::audit::AuditAction::ClarificationRequested));
}

#[test]
fn verify_without_receipt_is_rejected() {
    let h = Harness::new();
    let tx = h.create(three_slot_input(&h));

    let err = h
        .engine
        .verify_slot(
            h.tenant_id,
            &tx.id,
            0,
            VerifyDecision::Approve,
            h.actor,
            Deadline::none(),
        )
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::InvalidTransition);
}

#[test]
fn slots_must_sum_to_total() {
    let h = Harness::new();
    let mut input = three_slot_input(&h);
    input.slots.pop();

    let err = h
        .engine
        .create_transaction(h.tenant_id, h.actor, input, Deadline::none())
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::InvalidInput);
}

#[test]
fn receipts_frozen_after_payment_complete() {
    let h = Harness::new();
    let tx = h.create(three_slot_input(&h));
    let tx = h.pay_and_verify_all(&tx.id);
    assert_eq!(tx.status, TransactionStatus::PaymentComplete);

    let err = h
        .engine
        .attach_receipt(
            h.tenant_id,
            &tx.id,
            0,
            ReceiptInput {
                file_ref: "late.jpg".to_string(),
                note: None,
            },
            h.actor,
            Deadline::none(),
        )
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::InvalidTransition);
}
