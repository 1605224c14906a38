//! # Retry Policy
//!
//! The single retry loop every L1 interaction goes through. Callers hand in
//! a closure producing the call's future, so the same policy wraps any
//! operation without per-call loops.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use tracing::warn;

/// Bounded retries with a fixed delay between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub max_retries: u64,
    /// Pause between attempts.
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            delay: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u64, delay: Duration) -> Self {
        Self { max_retries, delay }
    }

    /// No retries, for tests that assert on the first failure.
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            delay: Duration::ZERO,
        }
    }

    /// Run `op` under this policy. See [`retry`].
    pub async fn run<T, E, F, Fut>(&self, operation: &str, op: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Display,
    {
        retry(op, self.max_retries, self.delay, operation).await
    }
}

/// Call `op` until it succeeds or `max_retries` retries are spent, sleeping
/// `delay` between attempts. The last error is returned.
pub async fn retry<T, E, F, Fut>(
    mut op: F,
    max_retries: u64,
    delay: Duration,
    operation: &str,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
{
    let mut attempt = 0u64;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if attempt < max_retries => {
                attempt += 1;
                warn!(
                    operation,
                    attempt,
                    max_retries,
                    error = %e,
                    "L1 call failed, retrying"
                );
                tokio::time::sleep(delay).await;
            }
            Err(e) => return Err(e),
        }
    }
}
