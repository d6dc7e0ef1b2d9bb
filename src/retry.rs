//! Bounded exponential-backoff retry.
//!
//! [`RetryPolicy`] is independent of the transport: it takes an async
//! operation and a classifier deciding which errors are worth retrying.

use std::future::Future;
use std::time::Duration;

use tracing::{debug, warn};

use crate::error::{Result, TransportError};

/// Default number of retries after the first attempt.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Default delay before the first retry.
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_secs(3);

/// Default upper bound on any single delay.
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(60);

/// Decides whether an error is worth another attempt.
pub type Classifier = fn(&TransportError) -> bool;

/// Retry policy: `max_retries` extra attempts, delay `base_delay * 2^n`.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    max_retries: u32,
    base_delay: Duration,
    max_delay: Duration,
    classifier: Classifier,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            base_delay: DEFAULT_BASE_DELAY,
            max_delay: DEFAULT_MAX_DELAY,
            classifier: TransportError::is_transient,
        }
    }
}

impl RetryPolicy {
    /// Create the default policy (3 retries, 3 s base delay, transient errors only).
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the number of retries after the first attempt.
    #[must_use]
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Set the delay before the first retry.
    #[must_use]
    pub fn with_base_delay(mut self, base_delay: Duration) -> Self {
        self.base_delay = base_delay;
        self
    }

    /// Cap every delay at `max_delay`. Values below the base delay are raised to it.
    #[must_use]
    pub fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = max_delay;
        self
    }

    /// Replace the error classifier.
    #[must_use]
    pub fn with_classifier(mut self, classifier: Classifier) -> Self {
        self.classifier = classifier;
        self
    }

    /// Number of retries after the first attempt.
    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Returns `true` if `error` may be retried.
    pub fn should_retry(&self, error: &TransportError) -> bool {
        (self.classifier)(error)
    }

    /// Delay before retry number `retry` (zero-based).
    pub fn delay_for(&self, retry: u32) -> Duration {
        let factor = 2u32.checked_pow(retry).unwrap_or(u32::MAX);
        let cap = self.max_delay.max(self.base_delay);
        self.base_delay.checked_mul(factor).unwrap_or(cap).min(cap)
    }

    /// Run `op` until it succeeds, fails with a non-retryable error, or
    /// the retries are exhausted.
    ///
    /// # Errors
    ///
    /// Returns the last error produced by `op`.
    pub async fn run<T, F, Fut>(&self, mut op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut retry = 0;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if retry < self.max_retries && self.should_retry(&e) => {
                    let delay = self.delay_for(retry);
                    retry += 1;
                    warn!(
                        error = %e,
                        retry,
                        max_retries = self.max_retries,
                        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        "attempt failed, backing off"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => {
                    debug!(error = %e, attempts = retry + 1, "giving up");
                    return Err(e);
                }
            }
        }
    }
}
