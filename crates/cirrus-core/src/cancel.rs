//! Cancellation helpers.
//!
//! Every suspension point in the workspace (network calls, retry backoff,
//! the consistency-gate wait) races against a
//! [`tokio_util::sync::CancellationToken`]; on cancellation the pending
//! operation is dropped and [`Error::Cancelled`] propagates out unchanged.

use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};

/// Run `fut` to completion unless `cancel` fires first.
pub async fn run_cancellable<F, T>(cancel: &CancellationToken, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    tokio::select! {
        _ = cancel.cancelled() => Err(Error::Cancelled),
        res = fut => res,
    }
}

/// Sleep for `duration`, returning [`Error::Cancelled`] if interrupted.
pub async fn sleep_cancellable(cancel: &CancellationToken, duration: Duration) -> Result<()> {
    tokio::select! {
        _ = cancel.cancelled() => Err(Error::Cancelled),
        _ = tokio::time::sleep(duration) => Ok(()),
    }
}
