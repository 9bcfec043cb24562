//! Bounded retry with a fixed backoff between attempts.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use crate::config::EngineConfig;

/// How many times to try and how long to wait in between.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Total attempts, including the first. Never below one.
    pub attempts: u32,
    pub backoff: Duration,
}

impl RetryPolicy {
    pub fn new(attempts: u32, backoff: Duration) -> Self {
        Self {
            attempts: attempts.max(1),
            backoff,
        }
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(config.fetch_retries, config.fetch_retry_delay)
    }
}

/// Run `op` until it succeeds, the error is not retryable, or attempts run out.
pub async fn retry<T, E, F, Fut>(
    policy: RetryPolicy,
    what: &str,
    mut op: F,
    retryable: impl Fn(&E) -> bool,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
{
    let mut attempt = 1;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if attempt < policy.attempts && retryable(&e) => {
                tracing::warn!(
                    attempt,
                    attempts = policy.attempts,
                    "{} failed, retrying in {:?}: {}",
                    what,
                    policy.backoff,
                    e
                );
                tokio::time::sleep(policy.backoff).await;
                attempt += 1;
            }
            Err(e) => {
                tracing::warn!(attempt, attempts = policy.attempts, "{} failed: {}", what, e);
                return Err(e);
            }
        }
    }
}
