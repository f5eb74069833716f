//! Async test helpers
//!
//! Timeouts around futures and waiting on process status changes.

use std::future::Future;
use tokio::sync::watch;
use tokio::time::{timeout, Duration};

use crate::core_process::ProcessStatus;

/// Run a future with a timeout, returning Ok(result) or Err on timeout
pub async fn with_timeout<F, T>(duration: Duration, future: F) -> Result<T, TimeoutError>
where
    F: Future<Output = T>,
{
    timeout(duration, future).await.map_err(|_| TimeoutError::Elapsed)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeoutError {
    Elapsed,
}

impl std::fmt::Display for TimeoutError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "operation timed out")
    }
}

impl std::error::Error for TimeoutError {}

/// Helper to assert a future completes within duration
pub async fn assert_completes_within<F, T>(duration: Duration, future: F) -> T
where
    F: Future<Output = T>,
{
    match timeout(duration, future).await {
        Ok(result) => result,
        Err(_) => panic!("Future did not complete within {:?}", duration),
    }
}

/// Collect every status a process reports until it reaches a terminal one
pub async fn collect_statuses(mut rx: watch::Receiver<ProcessStatus>) -> Vec<ProcessStatus> {
    let mut seen = vec![*rx.borrow_and_update()];
    while !seen.last().is_some_and(|s| s.is_terminal()) {
        if rx.changed().await.is_err() {
            break;
        }
        seen.push(*rx.borrow_and_update());
    }
    seen
}
