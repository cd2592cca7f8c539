use std::future::Future;
use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("operation timed out after {0}ms")]
pub struct TimedOut(pub u64);

/// Runs `operation` with an upper bound on how long the caller waits for it.
pub async fn run_with_timeout<T, F>(timeout_ms: u64, operation: F) -> Result<T, TimedOut>
where
    F: Future<Output = T>,
{
    tokio::time::timeout(Duration::from_millis(timeout_ms), operation)
        .await
        .map_err(|_| TimedOut(timeout_ms))
}
