use std::future::Future;
use std::time::Duration;

use crate::error::{AdminError, AdminResult};

/// How often, and how patiently, an operation is retried when the store
/// reports a transient failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one. Never less than one.
    pub max_attempts: u32,
    /// Delay before the second attempt; doubled for every attempt after it.
    pub base_delay: Duration,
    /// Ceiling for any single delay.
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(2),
        }
    }
}

impl RetryPolicy {
    /// Never retry.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// The pause after the given (1-based) failed attempt.
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        self.base_delay
            .saturating_mul(1 << exponent)
            .min(self.max_delay)
    }

    /// Run `operation` until it succeeds, fails permanently, or runs out of
    /// attempts. Only [`AdminError::TransientStorageFailure`] is retried, and
    /// the error finally surfaced carries the number of attempts made.
    pub async fn run<T, F, Fut>(&self, label: &str, mut operation: F) -> AdminResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = AdminResult<T>>,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 1;

        loop {
            match operation().await {
                Err(AdminError::TransientStorageFailure { source, .. }) => {
                    if attempt >= max_attempts {
                        tracing::error!("{label} gave up after {attempt} attempt(s): {source}");
                        return Err(AdminError::TransientStorageFailure {
                            attempts: attempt,
                            source,
                        });
                    }

                    let delay = self.delay_after(attempt);
                    tracing::warn!(
                        "{label} hit a transient storage failure (attempt {attempt} of {max_attempts}), retrying in {delay:?}: {source}"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                result => return result,
            }
        }
    }
}
