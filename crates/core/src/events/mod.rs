//! In-process event fan-out.
//!
//! Named topics with synchronous delivery to subscribers in subscription
//! order. Each delivery is isolated: a panicking handler is caught and
//! logged, and never takes down the publisher or later subscribers. There
//! is no durability; components that need durable delivery are external.

use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, RwLock};

use sarraf_shared::types::{TenantId, TransactionId};
use serde::{Deserialize, Serialize};

/// Events published by the engine and its stores.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "event")]
pub enum Event {
    /// A receipt was attached to a payment slot.
    ReceiptAttached {
        /// Owning tenant.
        tenant_id: TenantId,
        /// The transaction.
        transaction_id: TransactionId,
        /// Which slot.
        slot_index: usize,
    },
    /// A payment slot was approved.
    ReceiptVerified {
        /// Owning tenant.
        tenant_id: TenantId,
        /// The transaction.
        transaction_id: TransactionId,
        /// Which slot.
        slot_index: usize,
    },
    /// Every slot of a transaction's split is verified.
    PaymentSplitCompleted {
        /// Owning tenant.
        tenant_id: TenantId,
        /// The transaction.
        transaction_id: TransactionId,
    },
    /// Settlement committed.
    TransactionCompleted {
        /// Owning tenant.
        tenant_id: TenantId,
        /// The transaction.
        transaction_id: TransactionId,
    },
    /// Settlement aborted.
    TransactionFailed {
        /// Owning tenant.
        tenant_id: TenantId,
        /// The transaction.
        transaction_id: TransactionId,
        /// Why it failed.
        reason: String,
    },
    /// The transaction was cancelled before settlement.
    TransactionCancelled {
        /// Owning tenant.
        tenant_id: TenantId,
        /// The transaction.
        transaction_id: TransactionId,
        /// Operator-supplied reason.
        reason: String,
    },
    /// A completed transaction was reversed.
    TransactionReversed {
        /// Owning tenant.
        tenant_id: TenantId,
        /// The transaction.
        transaction_id: TransactionId,
    },
}

impl Event {
    /// The named topic this event fans out on.
    #[must_use]
    pub const fn topic(&self) -> &'static str {
        match self {
            Self::ReceiptAttached { .. } => "ReceiptAttached",
            Self::ReceiptVerified { .. } => "ReceiptVerified",
            Self::PaymentSplitCompleted { .. } => "PaymentSplitCompleted",
            Self::TransactionCompleted { .. } => "TransactionCompleted",
            Self::TransactionFailed { .. } => "TransactionFailed",
            Self::TransactionCancelled { .. } => "TransactionCancelled",
            Self::TransactionReversed { .. } => "TransactionReversed",
        }
    }
}

type Handler = Arc<dyn Fn(&Event) + Send + Sync>;

/// Synchronous in-process event dispatcher.
#[derive(Default)]
pub struct EventBus {
    topics: RwLock<HashMap<String, Vec<Handler>>>,
}

impl EventBus {
    /// Creates an empty bus.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribes a handler to a named topic.
    ///
    /// Handlers run on the publisher's thread, in subscription order.
    pub fn subscribe(&self, topic: &str, handler: impl Fn(&Event) + Send + Sync + 'static) {
        let mut topics = self.topics.write().expect("event bus lock poisoned");
        topics
            .entry(topic.to_string())
            .or_default()
            .push(Arc::new(handler));
    }

    /// Publishes an event to its topic's subscribers.
    ///
    /// Each delivery is isolated: a panic in one handler is caught, logged,
    /// and does not affect the publisher or the remaining handlers.
    pub fn publish(&self, event: &Event) {
        let handlers: Vec<Handler> = {
            let topics = self.topics.read().expect("event bus lock poisoned");
            topics.get(event.topic()).cloned().unwrap_or_default()
        };

        for handler in handlers {
            let delivery = catch_unwind(AssertUnwindSafe(|| handler(event)));
            if delivery.is_err() {
                tracing::error!(topic = event.topic(), "event handler panicked");
            }
        }
    }

    /// Number of subscribers on a topic. Mostly useful in tests.
    #[must_use]
    pub fn subscriber_count(&self, topic: &str) -> usize {
        let topics = self.topics.read().expect("event bus lock poisoned");
        topics.get(topic).map_or(0, Vec::len)
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let topics = self.topics.read().expect("event bus lock poisoned");
        f.debug_struct("EventBus")
            .field("topics", &topics.keys().collect::<Vec<_>>())
            .finish()
    }
}
