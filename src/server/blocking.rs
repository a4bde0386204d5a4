//! Keeping synchronous SQLite work off the async executor.

use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::task::{spawn_blocking, JoinError};
use tracing::warn;

#[derive(Debug, Error)]
pub enum BlockingCallError {
    #[error("timed out after {}ms", .0.as_millis())]
    TimedOut(Duration),
    #[error("task failed: {0}")]
    Failed(#[from] JoinError),
}

/// Runs `call` on the blocking pool and stops waiting for it after `timeout`.
///
/// The call itself keeps running once abandoned, so this is only for lookups
/// and for bookkeeping writes that may land late.
pub async fn run_with_timeout<T, F>(timeout: Duration, call: F) -> Result<T, BlockingCallError>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    match tokio::time::timeout(timeout, spawn_blocking(call)).await {
        Ok(outcome) => Ok(outcome?),
        Err(_) => {
            warn!("Blocking call timed out after {:?}", timeout);
            Err(BlockingCallError::TimedOut(timeout))
        }
    }
}

/// Runs `call` on the blocking pool with a deadline `timeout` from now, and
/// waits for it to return.
///
/// `call` has to give up by itself once the deadline passes. Because the task
/// is never abandoned, whatever it returns is what actually happened.
pub async fn run_until_deadline<T, F>(timeout: Duration, call: F) -> Result<T, BlockingCallError>
where
    F: FnOnce(Instant) -> T + Send + 'static,
    T: Send + 'static,
{
    let deadline = Instant::now() + timeout;
    Ok(spawn_blocking(move || call(deadline)).await?)
}
