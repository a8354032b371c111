//! The payment split tracker.
//!
//! A transaction exclusively owns its split. All slot mutation goes through
//! these methods so the `pending → paid → verified` DAG holds; the engine
//! appends audit entries and publishes events around each transition.

use sarraf_shared::types::{AccountCode, Money};
use serde::{Deserialize, Serialize};

use super::error::SplitError;
use super::types::{
    PaymentSlot, ReceiptMeta, SlotOutcome, SlotSpec, SlotStatus, SplitProgress, VerifyDecision,
};

/// Ordered payment slots tracking how a transaction gets paid.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentSplit {
    slots: Vec<PaymentSlot>,
}

impl PaymentSplit {
    /// Builds a split from slot specifications.
    ///
    /// The slots must be non-empty, positive, denominated in the owed
    /// currency, and sum exactly to `total_owed`.
    pub fn new(specs: Vec<SlotSpec>, total_owed: Money) -> Result<Self, SplitError> {
        if specs.is_empty() {
            return Err(SplitError::EmptySplit);
        }

        let mut slot_sum = Money::zero(total_owed.currency);
        for (index, spec) in specs.iter().enumerate() {
            if spec.expected.currency != total_owed.currency {
                return Err(SplitError::CurrencyMixed);
            }
            if spec.expected.minor <= 0 {
                return Err(SplitError::NonPositiveSlot(index));
            }
            slot_sum = slot_sum.add(spec.expected)?;
        }

        if slot_sum != total_owed {
            return Err(SplitError::SumMismatch {
                slot_sum,
                total_owed,
            });
        }

        let slots = specs
            .into_iter()
            .map(|spec| PaymentSlot {
                account_ref: spec.account_ref,
                expected: spec.expected,
                status: SlotStatus::Pending,
                receipt: None,
            })
            .collect();

        Ok(Self { slots })
    }

    /// Builds a single-slot split covering the whole owed amount.
    pub fn single(account_ref: AccountCode, total_owed: Money) -> Result<Self, SplitError> {
        Self::new(
            vec![SlotSpec {
                account_ref,
                expected: total_owed,
            }],
            total_owed,
        )
    }

    /// Read access to the slots.
    #[must_use]
    pub fn slots(&self) -> &[PaymentSlot] {
        &self.slots
    }

    /// Attaches a receipt to a pending slot, moving it to paid.
    pub fn attach_receipt(
        &mut self,
        index: usize,
        receipt: ReceiptMeta,
    ) -> Result<(), SplitError> {
        let len = self.slots.len();
        let slot = self
            .slots
            .get_mut(index)
            .ok_or(SplitError::SlotOutOfRange { index, len })?;

        if slot.status != SlotStatus::Pending {
            return Err(SplitError::ReceiptRequiresPendingSlot {
                index,
                status: slot.status,
            });
        }

        slot.receipt = Some(receipt);
        slot.status = SlotStatus::Paid;
        Ok(())
    }

    /// Applies a verification decision to a paid slot.
    pub fn verify_slot(
        &mut self,
        index: usize,
        decision: VerifyDecision,
    ) -> Result<SlotOutcome, SplitError> {
        let len = self.slots.len();
        let slot = self
            .slots
            .get_mut(index)
            .ok_or(SplitError::SlotOutOfRange { index, len })?;

        if slot.status != SlotStatus::Paid {
            return Err(SplitError::VerifyRequiresPaidSlot {
                index,
                status: slot.status,
            });
        }

        match decision {
            VerifyDecision::Approve => {
                slot.status = SlotStatus::Verified;
                Ok(SlotOutcome::Verified)
            }
            VerifyDecision::Reject => {
                slot.status = SlotStatus::Pending;
                slot.receipt = None;
                Ok(SlotOutcome::Rejected)
            }
            VerifyDecision::RequestClarification => Ok(SlotOutcome::ClarificationRequested),
        }
    }

    /// Current verification progress.
    #[must_use]
    pub fn progress(&self) -> SplitProgress {
        let total = self.slots.len();
        let completed = self
            .slots
            .iter()
            .filter(|s| s.status == SlotStatus::Verified)
            .count();
        let percentage = if total == 0 {
            0
        } else {
            u8::try_from(completed * 100 / total).unwrap_or(100)
        };

        SplitProgress {
            completed,
            total,
            percentage,
        }
    }

    /// Returns true once every slot is verified.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.progress().percentage == 100
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use sarraf_shared::types::{ActorId, Currency};

    fn receipt() -> ReceiptMeta {
        ReceiptMeta {
            file_ref: "receipts/2026/03/ab12.jpg".to_string(),
            uploaded_by: ActorId::new(),
            uploaded_at: Utc::now(),
            note: None,
        }
    }

    fn three_slot_split() -> PaymentSplit {
        let expected = Money::new(Currency::Usd, 10_000).unwrap();
        PaymentSplit::new(
            vec![
                SlotSpec {
                    account_ref: AccountCode::from("PAY-BANK-A"),
                    expected,
                },
                SlotSpec {
                    account_ref: AccountCode::from("PAY-BANK-B"),
                    expected,
                },
                SlotSpec {
                    account_ref: AccountCode::from("PAY-CASH"),
                    expected,
                },
            ],
            Money::new(Currency::Usd, 30_000).unwrap(),
        )
        .unwrap()
    }

    #[test]
    fn test_new_rejects_sum_mismatch() {
        let result = PaymentSplit::new(
            vec![SlotSpec {
                account_ref: AccountCode::from("PAY-BANK-A"),
                expected: Money::new(Currency::Usd, 10_000).unwrap(),
            }],
            Money::new(Currency::Usd, 20_000).unwrap(),
        );
        assert!(matches!(result, Err(SplitError::SumMismatch { .. })));
    }

    #[test]
    fn test_new_rejects_empty_and_mixed() {
        assert_eq!(
            PaymentSplit::new(vec![], Money::zero(Currency::Usd)),
            Err(SplitError::EmptySplit)
        );

        let result = PaymentSplit::new(
            vec![SlotSpec {
                account_ref: AccountCode::from("PAY-BANK-A"),
                expected: Money::new(Currency::Eur, 10_000).unwrap(),
            }],
            Money::new(Currency::Usd, 10_000).unwrap(),
        );
        assert_eq!(result, Err(SplitError::CurrencyMixed));
    }

    #[test]
    fn test_single_slot_split() {
        let total = Money::new(Currency::Irr, 420_000_000).unwrap();
        let split = PaymentSplit::single(AccountCode::from("PAY-MAIN"), total).unwrap();
        assert_eq!(split.slots().len(), 1);
        assert_eq!(split.slots()[0].expected, total);
        assert_eq!(split.progress().percentage, 0);
    }

    #[test]
    fn test_attach_receipt_moves_to_paid() {
        let mut split = three_slot_split();
        split.attach_receipt(0, receipt()).unwrap();
        assert_eq!(split.slots()[0].status, SlotStatus::Paid);
        assert!(split.slots()[0].receipt.is_some());

        // A second receipt on the same slot is rejected.
        assert!(matches!(
            split.attach_receipt(0, receipt()),
            Err(SplitError::ReceiptRequiresPendingSlot { index: 0, .. })
        ));
    }

    #[test]
    fn test_verify_requires_paid() {
        let mut split = three_slot_split();
        assert!(matches!(
            split.verify_slot(0, VerifyDecision::Approve),
            Err(SplitError::VerifyRequiresPaidSlot { index: 0, .. })
        ));
    }

    #[test]
    fn test_approve_then_progress() {
        let mut split = three_slot_split();
        split.attach_receipt(0, receipt()).unwrap();
        let outcome = split.verify_slot(0, VerifyDecision::Approve).unwrap();
        assert_eq!(outcome, SlotOutcome::Verified);

        let progress = split.progress();
        assert_eq!(progress.completed, 1);
        assert_eq!(progress.total, 3);
        assert_eq!(progress.percentage, 33);
        assert!(!split.is_complete());
    }

    #[test]
    fn test_reject_returns_to_pending_and_clears_receipt() {
        let mut split = three_slot_split();
        split.attach_receipt(1, receipt()).unwrap();
        let outcome = split.verify_slot(1, VerifyDecision::Reject).unwrap();
        assert_eq!(outcome, SlotOutcome::Rejected);
        assert_eq!(split.slots()[1].status, SlotStatus::Pending);
        assert!(split.slots()[1].receipt.is_none());
    }

    #[test]
    fn test_clarification_keeps_slot_paid() {
        let mut split = three_slot_split();
        split.attach_receipt(2, receipt()).unwrap();
        let outcome = split
            .verify_slot(2, VerifyDecision::RequestClarification)
            .unwrap();
        assert_eq!(outcome, SlotOutcome::ClarificationRequested);
        assert_eq!(split.slots()[2].status, SlotStatus::Paid);
        assert!(split.slots()[2].receipt.is_some());
    }

    #[test]
    fn test_full_verification_completes() {
        let mut split = three_slot_split();
        for index in 0..3 {
            split.attach_receipt(index, receipt()).unwrap();
            split.verify_slot(index, VerifyDecision::Approve).unwrap();
        }
        assert_eq!(split.progress().percentage, 100);
        assert!(split.is_complete());
    }

    #[test]
    fn test_reject_after_other_verified_keeps_their_state() {
        let mut split = three_slot_split();
        // Verify slot 0, pay slot 1, then reject slot 1.
        split.attach_receipt(0, receipt()).unwrap();
        split.verify_slot(0, VerifyDecision::Approve).unwrap();
        split.attach_receipt(1, receipt()).unwrap();
        split.verify_slot(1, VerifyDecision::Reject).unwrap();

        assert_eq!(split.slots()[0].status, SlotStatus::Verified);
        assert_eq!(split.slots()[1].status, SlotStatus::Pending);
        assert_eq!(split.progress().percentage, 33);
    }

    #[test]
    fn test_slot_out_of_range() {
        let mut split = three_slot_split();
        assert_eq!(
            split.attach_receipt(7, receipt()),
            Err(SplitError::SlotOutOfRange { index: 7, len: 3 })
        );
    }
}
