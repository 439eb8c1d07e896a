//! Exponential backoff with structural error classification.

use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use cirrus_core::error::{Error, Result};
use cirrus_core::sleep_cancellable;

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    /// Chunk transfers: 3 attempts, 1 s base.
    pub const TRANSFER: Self = Self {
        max_attempts: 3,
        base_delay: Duration::from_secs(1),
    };

    /// Thumbnail registration: 5 attempts, 1 s base.
    pub const THUMBNAIL: Self = Self {
        max_attempts: 5,
        base_delay: Duration::from_secs(1),
    };

    /// Delay before the `retry`-th retry: `base × 2^(retry-1)`.
    pub fn delay(&self, retry: u32) -> Duration {
        self.base_delay * 2u32.saturating_pow(retry.saturating_sub(1))
    }
}

/// Run `op` until it succeeds, the policy is exhausted, or a non-retryable
/// error surfaces. `op` receives the 1-based attempt number.
///
/// Classification is structural: only errors carrying status 400, 401, 403
/// or 404 stop the loop early (plus cancellation). When the server supplied
/// a `Retry-After`, the longer of it and the backoff schedule wins.
pub async fn retry<T, F, Fut>(
    policy: RetryPolicy,
    cancel: &CancellationToken,
    mut op: F,
) -> Result<T>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut last_err: Option<Error> = None;

    for attempt in 1..=policy.max_attempts {
        if attempt > 1 {
            let mut delay = policy.delay(attempt - 1);
            if let Some(Error::Http(http)) = &last_err {
                delay = delay.max(http.retry_after());
            }
            sleep_cancellable(cancel, delay).await?;
        }

        match op(attempt).await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_retryable() && attempt < policy.max_attempts => {
                tracing::debug!(attempt, error = %err, "retryable failure");
                last_err = Some(err);
            }
            Err(err) => return Err(err),
        }
    }

    // loop always returns on the last attempt
    Err(last_err.unwrap_or(Error::Cancelled))
}
