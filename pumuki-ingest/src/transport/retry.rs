//! Retry policy with exponential backoff and cancellable waits.

use std::future::Future;
use std::time::Duration;

use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Errors that can be retried.
pub trait RetryableError {
    /// Whether another attempt may succeed.
    fn is_retryable(&self) -> bool;
}

/// Retry policy for payload delivery.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub max_retries: u32,
    /// Delay before the first retry; doubles for each later one.
    pub base_delay: Duration,
    /// Upper bound on a single wait; unbounded by default.
    pub max_delay: Duration,
    /// Jitter factor (0.0-1.0) applied to the delay.
    pub jitter: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            base_delay: Duration::from_millis(250),
            max_delay: Duration::MAX,
            jitter: 0.0,
        }
    }
}

impl RetryPolicy {
    /// Backoff after the given attempt (1-based): `base_delay * 2^(attempt-1)`.
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let attempt = attempt.max(1);
        let base_secs = self.base_delay.as_secs_f64();
        let max_secs = self.max_delay.as_secs_f64().max(0.0);

        let multiplier = 2_u32.saturating_pow(attempt.saturating_sub(1)) as f64;
        let mut delay = (base_secs * multiplier).min(max_secs);

        if self.jitter > 0.0 && delay > 0.0 {
            let jitter = (fastrand::f64() * 2.0 - 1.0) * self.jitter;
            delay = (delay * (1.0 + jitter)).max(0.0);
        }

        Duration::try_from_secs_f64(delay)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }

    /// Total attempts including the first.
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }
}

/// Why [`run_with_retry`] stopped without a success.
#[derive(Debug, Clone, PartialEq)]
pub enum RetryStop<E> {
    /// Non-retryable error, or retries exhausted.
    Failed(E),
    /// Cancelled while waiting to retry; carries the last error.
    Cancelled(E),
}

/// Run an async operation with retries on retryable errors.
///
/// `op` receives the 1-based attempt number. Backoff waits end early when
/// `cancel` fires.
pub async fn run_with_retry<F, Fut, T, E>(
    phase: &str,
    policy: &RetryPolicy,
    cancel: &CancellationToken,
    mut op: F,
) -> Result<T, RetryStop<E>>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: RetryableError,
{
    let max_attempts = policy.max_attempts();
    let mut attempt = 1;

    loop {
        debug!(phase, attempt, max_attempts, "Starting attempt");

        match op(attempt).await {
            Ok(value) => {
                info!(phase, attempt, "Attempt succeeded");
                return Ok(value);
            }
            Err(err) if err.is_retryable() && attempt < max_attempts => {
                warn!(phase, attempt, "Attempt failed (retryable)");
                let delay = policy.backoff_delay(attempt);
                debug!(
                    phase,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    "Retrying after backoff"
                );
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => {
                        warn!(phase, attempt, "Cancelled during backoff");
                        return Err(RetryStop::Cancelled(err));
                    }
                    _ = sleep(delay) => {}
                }
                attempt += 1;
            }
            Err(err) => {
                warn!(
                    phase,
                    attempt,
                    retryable = err.is_retryable(),
                    "Attempt failed, giving up"
                );
                return Err(RetryStop::Failed(err));
            }
        }
    }
}
