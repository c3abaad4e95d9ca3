use std::future::Future;
use std::time::Duration;

use anyhow::Result;
use tracing::warn;

use crate::config::RetryConfig;
use crate::types::TransferStatus;
use crate::types::error::is_transient_error;
use crate::types::token::RunCancellationToken;

const DEFAULT_BACKOFF_MULTIPLIER: u32 = 2;

/// Attempt budget, exponential backoff curve and the predicate deciding what is retried.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub multiplier: u32,
    pub is_retryable: fn(&anyhow::Error) -> bool,
}

pub struct RetryOutcome<T> {
    pub result: Result<T>,
    pub attempts: u32,
    pub exhausted: bool,
}

impl<T> RetryOutcome<T> {
    pub fn status(&self) -> TransferStatus {
        match (&self.result, self.attempts > 1) {
            (Ok(_), false) => TransferStatus::Succeeded,
            (Ok(_), true) => TransferStatus::RetriedThenSucceeded,
            (Err(_), true) if !self.exhausted => TransferStatus::RetriedThenFailed,
            (Err(_), _) => TransferStatus::Failed,
        }
    }
}

impl RetryPolicy {
    pub fn from_config(retry_config: &RetryConfig) -> Self {
        RetryPolicy {
            max_attempts: retry_config.max_attempts,
            initial_backoff: Duration::from_millis(retry_config.initial_backoff_milliseconds),
            max_backoff: Duration::from_millis(retry_config.max_backoff_milliseconds),
            multiplier: DEFAULT_BACKOFF_MULTIPLIER,
            is_retryable: is_transient_error,
        }
    }

    /// Delay before the attempt following attempt number `attempt`.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = self
            .multiplier
            .saturating_pow(attempt.saturating_sub(1));
        self.initial_backoff
            .saturating_mul(factor)
            .min(self.max_backoff)
    }

    /// Runs `operation` until it succeeds, fails with a non-retryable error, runs out of
    /// attempts or the run is cancelled. The closure receives the 1-based attempt number.
    pub async fn execute<T, F, Fut>(
        &self,
        operation_name: &str,
        cancellation_token: &RunCancellationToken,
        mut operation: F,
    ) -> RetryOutcome<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempts = 0;

        loop {
            attempts += 1;
            let e = match operation(attempts).await {
                Ok(value) => {
                    return RetryOutcome {
                        result: Ok(value),
                        attempts,
                        exhausted: false,
                    };
                }
                Err(e) => e,
            };

            if !(self.is_retryable)(&e) || cancellation_token.is_cancelled() {
                return RetryOutcome {
                    result: Err(e),
                    attempts,
                    exhausted: false,
                };
            }
            if attempts >= max_attempts {
                return RetryOutcome {
                    result: Err(e),
                    attempts,
                    exhausted: true,
                };
            }

            let backoff = self.backoff(attempts);
            warn!(
                operation = operation_name,
                attempts = attempts,
                backoff_milliseconds = backoff.as_millis() as u64,
                error = format!("{e:#}"),
                "transient error, retrying."
            );

            tokio::select! {
                _ = tokio::time::sleep(backoff) => {},
                _ = cancellation_token.cancelled() => {
                    return RetryOutcome {
                        result: Err(e),
                        attempts,
                        exhausted: false,
                    };
                }
            }
        }
    }
}
