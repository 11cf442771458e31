// src/exec/batch/retry.rs

//! Bounded retries for substrate wire calls.

use std::future::Future;
use std::time::Duration;

use tracing::warn;

use crate::errors::{JobdagError, Result};

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Attempts after the first one.
    pub retries: u32,
    /// Sleep before retry `n` is `backoff * n`.
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            retries: 3,
            backoff: Duration::from_millis(200),
        }
    }
}

/// Transport-level failures worth another attempt.
pub fn is_transient(err: &JobdagError) -> bool {
    matches!(
        err,
        JobdagError::HttpError(_)
            | JobdagError::IoError(_)
            | JobdagError::TransientSubstrateError { .. }
    )
}

/// Run `call` until it succeeds, fails permanently, or runs out of retries.
///
/// Exhaustion is reported as `TransientSubstrateError` naming `operation`.
pub async fn with_retries<T, F, Fut>(operation: &'static str, policy: RetryPolicy, mut call: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt: u32 = 0;
    loop {
        attempt += 1;
        match call().await {
            Ok(value) => return Ok(value),
            Err(e) if !is_transient(&e) => return Err(e),
            Err(e) if attempt > policy.retries => {
                return Err(JobdagError::TransientSubstrateError {
                    operation,
                    attempts: attempt,
                    message: e.to_string(),
                });
            }
            Err(e) => {
                warn!(operation, attempt, error = %e, "transient substrate error; retrying");
                tokio::time::sleep(policy.backoff * attempt).await;
            }
        }
    }
}
