// src/retry.rs

//! Bounded retry with a fixed pause between attempts.

use std::future::Future;
use std::time::Duration;

use tracing::warn;

use crate::errors::{NiftiBatchError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total number of attempts, including the first one.
    pub max_attempts: u32,
    /// Pause between two attempts.
    pub delay: Duration,
}

impl RetryPolicy {
    pub const fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            delay,
        }
    }

    /// Identity provider policy: 3 attempts, 3 s apart.
    pub const fn identity_provider() -> Self {
        Self::new(3, Duration::from_secs(3))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::identity_provider()
    }
}

/// Run `op` until it succeeds, fails with an error `is_transient` rejects,
/// or `policy.max_attempts` attempts have been made.
///
/// `op` receives the 1-based attempt number. The last error is returned
/// unchanged on exhaustion.
pub async fn retry<T, F, Fut, P>(policy: RetryPolicy, is_transient: P, mut op: F) -> Result<T>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T>>,
    P: Fn(&NiftiBatchError) -> bool,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;

    loop {
        match op(attempt).await {
            Ok(value) => return Ok(value),
            Err(err) if attempt < max_attempts && is_transient(&err) => {
                warn!(
                    attempt,
                    max_attempts,
                    delay = ?policy.delay,
                    error = %err,
                    "transient failure; retrying"
                );
                tokio::time::sleep(policy.delay).await;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}
