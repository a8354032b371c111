//! Bounded internal retry for transient failures.
//!
//! Only `Unavailable` errors are retried, up to the configured attempt
//! count with jittered backoff. Every other kind surfaces immediately;
//! retrying those is the caller's explicit choice.

use std::time::Duration;

use rand::Rng;
use sarraf_shared::config::EngineConfig;
use sarraf_shared::{ErrorKind, ServiceError};

/// Runs `op`, retrying `Unavailable` failures with jittered backoff.
pub fn with_retries<T>(
    config: &EngineConfig,
    mut op: impl FnMut() -> Result<T, ServiceError>,
) -> Result<T, ServiceError> {
    let mut attempt = 0;
    loop {
        match op() {
            Ok(value) => return Ok(value),
            Err(err) if err.kind == ErrorKind::Unavailable && attempt < config.max_retries => {
                attempt += 1;
                let backoff = config.retry_base_delay_ms.saturating_mul(u64::from(attempt));
                let jitter: u64 = rand::rng().random_range(0..=config.retry_base_delay_ms.max(1));
                tracing::warn!(attempt, backoff_ms = backoff + jitter, "retrying after transient failure");
                std::thread::sleep(Duration::from_millis(backoff + jitter));
            }
            Err(err) => return Err(err),
        }
    }
}
