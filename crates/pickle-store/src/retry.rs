//! Exponential-backoff retry for storage calls.
//!
//! Each storage call is modeled as a closure returning a future; the loop
//! re-invokes it while the error is classified retriable. Backoff is
//! `base × 2^attempt` plus a small random jitter. Tests use
//! [`RetryPolicy::immediate`] so the suite never sleeps.

use std::future::Future;
use std::time::Duration;

use rand::RngExt;
use tracing::debug;

use crate::error::StoreError;

/// Controls attempt count and backoff behavior of [`with_retries`].
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Maximum number of attempts (including the first).
    pub max_attempts: u32,
    /// Base delay; attempt `i` waits `base × 2^i` plus jitter.
    pub base_delay: Duration,
    /// Upper bound on the random jitter added to each delay.
    pub max_jitter: Duration,
    /// When false, no sleeping happens between attempts.
    pub sleep: bool,
}

impl RetryPolicy {
    /// The production policy: 10 attempts, 100 ms base, ≤100 ms jitter.
    #[must_use]
    pub const fn standard() -> Self {
        Self {
            max_attempts: 10,
            base_delay: Duration::from_millis(100),
            max_jitter: Duration::from_millis(100),
            sleep: true,
        }
    }

    /// The standard policy with sleeping disabled, for tests.
    #[must_use]
    pub const fn immediate() -> Self {
        Self {
            sleep: false,
            ..Self::standard()
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::standard()
    }
}

/// Invoke `op` until it succeeds, fails fatally, or exhausts the policy.
///
/// A retriable error that survives every attempt is wrapped in
/// [`StoreError::RetriesExceeded`].
pub async fn with_retries<T, F, Fut>(policy: &RetryPolicy, mut op: F) -> Result<T, StoreError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, StoreError>>,
{
    let mut attempt: u32 = 0;
    loop {
        let err = match op().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_retriable() => err,
            Err(err) => return Err(err),
        };

        attempt += 1;
        if attempt >= policy.max_attempts {
            return Err(StoreError::RetriesExceeded {
                source: Box::new(err),
            });
        }

        if policy.sleep {
            let backoff = policy.base_delay * 2u32.saturating_pow(attempt - 1);
            let jitter_ms = policy.max_jitter.as_millis() as u64;
            let jitter = if jitter_ms == 0 {
                Duration::ZERO
            } else {
                Duration::from_millis(rand::rng().random_range(0..jitter_ms))
            };
            debug!(attempt, ?backoff, "retrying storage call");
            tokio::time::sleep(backoff + jitter).await;
        }
    }
}
