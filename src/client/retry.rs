//! Retry and per-attempt deadline around backend calls.

use std::future::Future;
use std::time::Duration;

use tracing::{debug, error, info, warn};

use super::ProviderError;

#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Maximum number of attempts, `None` retries until success
    pub tries: Option<u32>,
    /// Fixed pause between attempts
    pub delay: Duration,
    /// Deadline for a single attempt
    pub max_query_time: Option<Duration>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            tries: None,
            delay: Duration::from_secs(1),
            max_query_time: None,
        }
    }
}

impl RetryPolicy {
    pub fn bounded(tries: u32) -> Self {
        Self {
            tries: Some(tries.max(1)),
            ..Self::default()
        }
    }

    pub fn unbounded() -> Self {
        Self::default()
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn with_max_query_time(mut self, max_query_time: Duration) -> Self {
        self.max_query_time = Some(max_query_time);
        self
    }

    pub fn should_retry(&self, attempt: u32, error: &ProviderError) -> bool {
        error.retryable && self.tries.is_none_or(|tries| attempt < tries)
    }
}

/// Run `execute` until it succeeds, fails with a non-retryable error or runs out of tries.
///
/// Each attempt is bounded by `max_query_time` when set; an attempt that overruns it fails
/// with a retryable timeout. The closure receives the 1-based attempt number.
pub async fn execute_with_retry<T, Op, OpFuture>(
    policy: &RetryPolicy,
    operation: &str,
    mut execute: Op,
) -> Result<T, ProviderError>
where
    Op: FnMut(u32) -> OpFuture,
    OpFuture: Future<Output = Result<T, ProviderError>>,
{
    let mut attempt = 1;

    loop {
        debug!(operation, attempt, "Starting attempt");

        let result = match policy.max_query_time {
            Some(budget) => match tokio::time::timeout(budget, execute(attempt)).await {
                Ok(result) => result,
                Err(_) => Err(ProviderError::timeout(format!(
                    "{operation} did not finish within {budget:?}"
                ))),
            },
            None => execute(attempt).await,
        };

        match result {
            Ok(value) => {
                if attempt > 1 {
                    info!(operation, attempts = attempt, "Succeeded after retrying");
                }
                return Ok(value);
            }
            Err(error) if policy.should_retry(attempt, &error) => {
                warn!(operation, attempt, %error, delay = ?policy.delay, "Attempt failed, retrying");
                tokio::time::sleep(policy.delay).await;
                attempt += 1;
            }
            Err(error) => {
                error!(operation, attempts = attempt, %error, "Giving up");
                return Err(error);
            }
        }
    }
}
