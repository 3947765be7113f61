//! Bounded retry for relationship batches.

use std::future::Future;
use std::time::Duration;

use backoff::backoff::Backoff;
use backoff::ExponentialBackoffBuilder;
use tracing::warn;

use crate::errors::{LoaderError, Result};

/// How often, and how patiently, a failed batch is re-submitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Attempts in total, the first one included.
    pub max_attempts: u32,
    /// Delay before the second attempt; later delays grow exponentially.
    /// Zero disables sleeping.
    pub initial_interval: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_interval: Duration::from_millis(500),
        }
    }
}

impl RetryPolicy {
    /// `max_attempts` attempts with no delay in between.
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            initial_interval: Duration::ZERO,
        }
    }

    /// Run `op` until it succeeds or `max_attempts` attempts have failed.
    ///
    /// `op` receives the 1-based attempt number. After the last failed attempt
    /// the final error is returned wrapped in [`LoaderError::RetriesExhausted`].
    pub async fn run<T, F, Fut>(&self, batch: usize, mut op: F) -> Result<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut delays = ExponentialBackoffBuilder::new()
            .with_initial_interval(self.initial_interval)
            .with_max_interval(Duration::from_secs(10))
            .with_max_elapsed_time(None)
            .build();

        let mut attempt = 1;
        loop {
            match op(attempt).await {
                Ok(value) => return Ok(value),
                Err(e) if attempt >= max_attempts => {
                    return Err(LoaderError::RetriesExhausted {
                        batch,
                        attempts: attempt,
                        source: Box::new(e),
                    });
                }
                Err(e) => {
                    warn!(batch, attempt, max_attempts, error = %e, "batch failed, retrying");
                    if !self.initial_interval.is_zero() {
                        if let Some(delay) = delays.next_backoff() {
                            tokio::time::sleep(delay).await;
                        }
                    }
                    attempt += 1;
                }
            }
        }
    }
}
