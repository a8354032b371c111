//! Operation deadlines.
//!
//! Every engine operation accepts a deadline. Expiry before the commit
//! point aborts the operation atomically; expiry after the commit point
//! leaves the commit standing and tells the caller to poll by transaction
//! id. No operation is retried silently on timeout.

use std::time::{Duration, Instant};

use sarraf_shared::{ErrorKind, ServiceError};

/// A point in time after which an operation must not commit.
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    expires_at: Option<Instant>,
}

impl Deadline {
    /// No deadline; the operation may take as long as it needs.
    #[must_use]
    pub const fn none() -> Self {
        Self { expires_at: None }
    }

    /// A deadline `ms` milliseconds from now.
    #[must_use]
    pub fn after_ms(ms: u64) -> Self {
        Self {
            expires_at: Some(Instant::now() + Duration::from_millis(ms)),
        }
    }

    /// Returns true once the deadline has passed.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.expires_at.is_some_and(|at| Instant::now() >= at)
    }

    /// Errors with `Timeout` if expired; called before state changes.
    pub fn check(&self) -> Result<(), ServiceError> {
        if self.is_expired() {
            return Err(ServiceError::new(
                ErrorKind::Timeout,
                "deadline expired before commit; operation aborted",
            ));
        }
        Ok(())
    }

    /// The error reported when the deadline passed after the commit point:
    /// the commit stands and the caller may poll by transaction id.
    #[must_use]
    pub fn committed_but_timed_out(transaction_id: &str) -> ServiceError {
        ServiceError::new(
            ErrorKind::Timeout,
            "committed but response timed out; poll by transaction id",
        )
        .with_details(serde_json::json!({
            "committed": true,
            "transaction_id": transaction_id,
        }))
    }
}

impl Default for Deadline {
    fn default() -> Self {
        Self::none()
    }
}
