//! Exponential backoff for gateway calls.
//!
//! Only [`GatewayError::Transient`] failures are retried. Authentication and validation failures are returned
//! immediately since repeating the same request cannot change the outcome.
use std::{future::Future, time::Duration};

use log::*;
use tokio::time::sleep;

use crate::GatewayError;

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Total number of attempts, including the first one
    pub max_attempts: u32,
    /// Delay before the first retry. Each subsequent retry doubles it.
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { max_attempts: 3, base_delay: Duration::from_secs(1) }
    }
}

impl RetryPolicy {
    pub fn no_retries() -> Self {
        Self { max_attempts: 1, base_delay: Duration::ZERO }
    }

    /// The delay to wait after the given (1-based) failed attempt.
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.base_delay.saturating_mul(factor)
    }
}

/// Runs `operation` until it succeeds, fails with a non-retryable error, or the attempt budget is spent.
pub async fn with_backoff<F, Fut, T>(policy: &RetryPolicy, label: &str, mut operation: F) -> Result<T, GatewayError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, GatewayError>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 0;
    loop {
        attempt += 1;
        match operation().await {
            Ok(result) => {
                if attempt > 1 {
                    debug!("🌐️ {label} succeeded after {attempt} attempts");
                }
                return Ok(result);
            },
            Err(e) if e.is_retryable() && attempt < max_attempts => {
                let delay = policy.delay_after(attempt);
                warn!("🌐️ {label} failed on attempt {attempt}/{max_attempts}: {e}. Retrying in {delay:?}");
                sleep(delay).await;
            },
            Err(e) => {
                if e.is_retryable() {
                    warn!("🌐️ {label} failed after {attempt} attempts: {e}");
                }
                return Err(e);
            },
        }
    }
}
