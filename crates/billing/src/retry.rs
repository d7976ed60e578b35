//! Retry policy for transient failures

use std::future::Future;
use std::time::Duration;

use tokio_retry::strategy::FixedInterval;
use tokio_retry::Retry;

use crate::error::BillingResult;

pub const DEFAULT_MAX_RETRIES: usize = 2;
pub const DEFAULT_BACKOFF: Duration = Duration::from_millis(1000);

/// Fixed-interval retry: `max_retries` extra attempts, `backoff` apart
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: usize,
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            backoff: DEFAULT_BACKOFF,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_retries: usize, backoff: Duration) -> Self {
        Self {
            max_retries,
            backoff,
        }
    }

    /// Run `action` until it succeeds, fails permanently, or retries run out.
    /// Only errors with `is_transient()` are retried. The attempt number
    /// (starting at 1) is passed to each call.
    pub async fn run<T, F, Fut>(&self, operation: &'static str, mut action: F) -> BillingResult<T>
    where
        F: FnMut(usize) -> Fut,
        Fut: Future<Output = BillingResult<T>>,
    {
        let strategy = FixedInterval::new(self.backoff).take(self.max_retries);
        let max_attempts = self.max_retries + 1;
        let mut attempt = 0usize;

        let result = Retry::spawn(strategy, || {
            attempt += 1;
            let current = attempt;
            let call = action(current);
            async move {
                let result = call.await;
                match &result {
                    Ok(_) => Ok(result),
                    Err(e) if e.is_transient() && current < max_attempts => {
                        tracing::debug!(
                            operation,
                            attempt = current,
                            error = %e,
                            "Transient error - will retry"
                        );
                        Err(result) // Return error to trigger retry
                    }
                    Err(_) => Ok(result), // Return error wrapped in Ok to stop retrying
                }
            }
        })
        .await
        .unwrap_or_else(|e| e);

        if let Err(e) = &result {
            tracing::warn!(operation, error = %e, "Giving up");
        }
        result
    }
}
