//! Property-based tests for the transaction state machine.

use chrono::Utc;
use proptest::prelude::*;
use rust_decimal_macros::dec;
use sarraf_shared::types::{
    AccountCode, ActorId, BranchId, Currency, CustomerId, Money, ReferenceNumber, TenantId,
    TransactionId,
};

use crate::rate::RateKind;
use crate::split::PaymentSplit;

use super::state::is_allowed;
use super::types::{Transaction, TransactionStatus, TransactionType};

fn sample_transaction() -> Transaction {
    let total = Money::new(Currency::Irr, 420_000_000).unwrap();
    Transaction {
        id: TransactionId::from("TEH00000009001"),
        reference: ReferenceNumber::from("REF00000000011234"),
        tenant_id: TenantId::new(),
        customer_id: CustomerId::new(),
        branch_id: None::<BranchId>,
        tx_type: TransactionType::CurrencyBuy,
        amount_from: total,
        amount_to: Money::new(Currency::Usd, 1_000_000).unwrap(),
        rate: dec!(42000),
        rate_kind: RateKind::Buy,
        commission: Money::zero(Currency::Irr),
        total_owed: total,
        status: TransactionStatus::PendingPayment,
        split: PaymentSplit::single(AccountCode::from("PAY-MAIN"), total).unwrap(),
        hold_id: None,
        risk_score: None,
        notes: Vec::new(),
        tags: Vec::new(),
        metadata: serde_json::Value::Null,
        created_by: ActorId::new(),
        created_at: Utc::now(),
        status_history: Vec::new(),
        reversed: false,
        reversed_at: None,
        integrity_flagged: false,
    }
}

fn any_status() -> impl Strategy<Value = TransactionStatus> {
    use TransactionStatus as S;
    prop_oneof![
        Just(S::PendingPayment),
        Just(S::PartialPaid),
        Just(S::PaymentComplete),
        Just(S::Processing),
        Just(S::Completed),
        Just(S::Cancelled),
        Just(S::Failed),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    /// *For any* sequence of attempted transitions, a transaction only
    /// reaches `completed` after having passed through `payment_complete`
    /// and `processing`, and terminal states absorb.
    #[test]
    fn prop_completed_requires_payment_complete(
        attempts in prop::collection::vec(any_status(), 1..24),
    ) {
        let mut tx = sample_transaction();
        let actor = ActorId::new();

        for target in attempts {
            let before = tx.status;
            let result = tx.transition(target, actor, None, Utc::now());

            if before.is_terminal() {
                prop_assert!(result.is_err(), "terminal state {before:?} must absorb");
            }

            if result.is_ok() {
                prop_assert!(is_allowed(before, target));
            } else {
                prop_assert_eq!(tx.status, before, "failed transition must not move state");
            }

            if tx.status == TransactionStatus::Completed {
                prop_assert!(
                    tx.ever_reached(TransactionStatus::PaymentComplete),
                    "completed without payment_complete"
                );
                prop_assert!(
                    tx.ever_reached(TransactionStatus::Processing),
                    "completed without processing"
                );
            }
        }
    }

    /// *For any* sequence of successful transitions, the recorded history
    /// is itself a chain of allowed moves.
    #[test]
    fn prop_history_is_an_allowed_chain(
        attempts in prop::collection::vec(any_status(), 1..24),
    ) {
        let mut tx = sample_transaction();
        let actor = ActorId::new();
        for target in attempts {
            let _ = tx.transition(target, actor, None, Utc::now());
        }

        let mut current = TransactionStatus::PendingPayment;
        for change in &tx.status_history {
            prop_assert!(is_allowed(current, change.status));
            current = change.status;
        }
        prop_assert_eq!(current, tx.status);
    }
}
