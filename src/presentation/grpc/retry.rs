//! Client retry policy.

use std::future::Future;
use std::time::Duration;

use tonic::{Code, Status};
use tracing::warn;

use crate::config::RetrySettings;

/// Status codes worth another attempt
pub const RETRYABLE_CODES: [Code; 3] = [
    Code::Unavailable,
    Code::DeadlineExceeded,
    Code::ResourceExhausted,
];

pub fn is_retryable(status: &Status) -> bool {
    RETRYABLE_CODES.contains(&status.code())
}

impl RetrySettings {
    /// Delay before retry number `attempt` (0-based): exponential from
    /// `initial_backoff_ms`, capped at `max_backoff_ms`.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let delay = self.initial_backoff_ms as f64 * self.backoff_multiplier.powi(exponent);
        let capped = delay.min(self.max_backoff_ms as f64).max(0.0);
        Duration::from_millis(capped as u64)
    }

    /// Run `op` until it succeeds, fails with a non-retryable status, or
    /// `max_attempts` calls have been made. Returns the last result.
    pub async fn retry<T, F, Fut>(&self, mut op: F) -> Result<T, Status>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, Status>>,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 0;

        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(status) if is_retryable(&status) && attempt + 1 < max_attempts => {
                    let delay = self.backoff(attempt);
                    warn!(
                        attempt = attempt + 1,
                        max_attempts,
                        code = ?status.code(),
                        delay_ms = delay.as_millis() as u64,
                        "gRPC call failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(status) => return Err(status),
            }
        }
    }
}
