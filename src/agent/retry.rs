//! Rate-limit retry around a whole agent run.

use std::future::Future;
use std::time::Duration;

use tracing::warn;

use crate::error::AgentError;

/// Default number of attempts, including the first.
pub const DEFAULT_MAX_ATTEMPTS: usize = 10;
/// Default pause after a rate-limited attempt.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(5);

/// Retries an operation while it fails with [`AgentError::RateLimited`].
///
/// Every failure leaving the policy is wrapped as
/// [`AgentError::QueryProcessing`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Attempts in total; zero is treated as one.
    pub max_attempts: usize,
    /// Fixed delay between attempts.
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            delay: DEFAULT_RETRY_DELAY,
        }
    }
}

impl RetryPolicy {
    /// Creates a policy.
    #[must_use]
    pub const fn new(max_attempts: usize, delay: Duration) -> Self {
        Self {
            max_attempts,
            delay,
        }
    }

    /// Runs `op`, passing the 1-based attempt number.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::QueryProcessing`] wrapping the first
    /// non-rate-limit failure, or the last rate-limit failure once all
    /// attempts are used.
    pub async fn run<T, F, Fut>(&self, mut op: F) -> Result<T, AgentError>
    where
        F: FnMut(usize) -> Fut,
        Fut: Future<Output = Result<T, AgentError>>,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match op(attempt).await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_rate_limited() && attempt < max_attempts => {
                    warn!(
                        attempt,
                        max_attempts,
                        delay_secs = self.delay.as_secs_f64(),
                        error = %e,
                        "rate limited, retrying"
                    );
                    tokio::time::sleep(self.delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e.into_query_processing()),
            }
        }
    }

    /// Like [`RetryPolicy::run`], bounded by an overall `deadline`.
    ///
    /// # Errors
    ///
    /// As [`RetryPolicy::run`]; expiry yields [`AgentError::QueryProcessing`]
    /// wrapping [`AgentError::DeadlineExceeded`].
    pub async fn run_with_deadline<T, F, Fut>(
        &self,
        deadline: Duration,
        op: F,
    ) -> Result<T, AgentError>
    where
        F: FnMut(usize) -> Fut,
        Fut: Future<Output = Result<T, AgentError>>,
    {
        tokio::time::timeout(deadline, self.run(op))
            .await
            .map_err(|_| AgentError::DeadlineExceeded { timeout: deadline }.into_query_processing())?
    }
}
