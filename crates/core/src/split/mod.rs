//! Payment split tracking.
//!
//! A transaction's required payment is split into one or more named slots,
//! each with its own receipt and verification lifecycle.

pub mod error;
pub mod tracker;
pub mod types;

pub use error::SplitError;
pub use tracker::PaymentSplit;
pub use types::{
    PaymentSlot, ReceiptMeta, SlotOutcome, SlotSpec, SlotStatus, SplitProgress, VerifyDecision,
};
