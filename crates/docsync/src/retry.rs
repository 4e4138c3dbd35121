//! Exponential-backoff retry for fallible remote operations.
//!
//! Every batched write (commit, delete) is wrapped in this policy. Reads
//! used only for counting and estimation are best-effort and are not.
//! Retries are local to a single operation and do not roll back partial
//! effects, so wrapped operations must be idempotent.

use crate::error::Result;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

/// Observation passed to the `on_retry` hook before each backoff sleep.
///
/// The hook has no effect on control flow; it exists for logging/metrics.
#[derive(Debug)]
pub struct RetryEvent<'a> {
    /// 1-based number of the attempt that just failed.
    pub attempt: u32,
    /// Total attempts that will be made (retries + 1).
    pub max_attempts: u32,
    /// Delay before the next attempt.
    pub delay: Duration,
    /// Display form of the error that triggered the retry.
    pub error: &'a str,
}

type RetryHook = Arc<dyn Fn(&RetryEvent<'_>) + Send + Sync>;

/// Retry policy with capped exponential backoff.
#[derive(Clone)]
pub struct RetryPolicy {
    retries: u32,
    base_delay: Duration,
    max_delay: Duration,
    on_retry: Option<RetryHook>,
}

impl std::fmt::Debug for RetryPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("retries", &self.retries)
            .field("base_delay", &self.base_delay)
            .field("max_delay", &self.max_delay)
            .finish()
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3)
    }
}

impl RetryPolicy {
    /// Policy with the given retry count and default delays (500ms base,
    /// 30s cap).
    pub fn new(retries: u32) -> Self {
        Self {
            retries,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
            on_retry: None,
        }
    }

    pub fn with_delays(mut self, base_delay: Duration, max_delay: Duration) -> Self {
        self.base_delay = base_delay;
        self.max_delay = max_delay;
        self
    }

    /// Install an observation hook called before each backoff sleep.
    pub fn with_on_retry(mut self, hook: RetryHook) -> Self {
        self.on_retry = Some(hook);
        self
    }

    /// Backoff delay after the given 1-based failed attempt:
    /// `min(base_delay * 2^(attempt - 1), max_delay)`.
    fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }

    /// Run `op`, retrying on failure until attempts are exhausted.
    /// Fails with the last error.
    pub async fn run<T, F, Fut>(&self, label: &str, mut op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let max_attempts = self.retries + 1;
        let mut attempt = 0u32;

        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(err) => {
                    attempt += 1;
                    if attempt >= max_attempts {
                        return Err(err);
                    }

                    let delay = self.delay_for(attempt);
                    let error = err.to_string();
                    match &self.on_retry {
                        Some(hook) => hook(&RetryEvent {
                            attempt,
                            max_attempts,
                            delay,
                            error: &error,
                        }),
                        None => warn!(
                            "{}: attempt {}/{} failed ({}), retrying in {:?}",
                            label, attempt, max_attempts, error, delay
                        ),
                    }

                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}
