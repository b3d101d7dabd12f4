use std::future::Future;
use std::time::Duration;

use crate::error::ApiError;

/// Bounded exponential backoff for transient request failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(5),
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries.
    #[must_use]
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    /// Delay before retry number `retry` (0-based): `base * 2^retry`, capped.
    #[must_use]
    pub fn delay_for(&self, retry: u32) -> Duration {
        let factor = 1u32.checked_shl(retry).unwrap_or(u32::MAX);
        self.base_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }

    #[must_use]
    pub fn should_retry(&self, error: &ApiError, retries_done: u32) -> bool {
        retries_done < self.max_retries && error.kind().is_auto_retryable()
    }

    /// Run `operation` until it succeeds, fails permanently or retries run out.
    ///
    /// `operation` receives the 0-based attempt number.
    ///
    /// # Errors
    ///
    /// Returns the last `ApiError` once no further retry is allowed.
    pub async fn run<T, F, Fut>(&self, mut operation: F) -> Result<T, ApiError>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, ApiError>>,
    {
        let mut retries = 0;
        loop {
            match operation(retries).await {
                Ok(value) => return Ok(value),
                Err(err) if self.should_retry(&err, retries) => {
                    let delay = self.delay_for(retries);
                    tracing::warn!(
                        code = err.kind().code(),
                        error = %err,
                        retry = retries + 1,
                        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        "retrying request"
                    );
                    tokio::time::sleep(delay).await;
                    retries += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}
