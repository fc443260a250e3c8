use crate::provider::ProviderError;
use std::time::Duration;
use tokio::time::sleep;

/// Backoff for job submission. Status checks are never retried.
pub struct RetryPolicy {
    max_retries: u8,
    base_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_retries: u8) -> Self {
        Self {
            max_retries,
            base_delay: Duration::from_secs(2),
        }
    }

    pub fn should_retry(&self, attempt: u8, error: &ProviderError) -> bool {
        if attempt >= self.max_retries {
            return false;
        }

        error.is_retryable()
    }

    pub fn delay_for(&self, attempt: u8) -> Duration {
        let multiplier = 2u32.saturating_pow(attempt as u32);
        self.base_delay
            .saturating_mul(multiplier)
            .max(Duration::from_secs(1))
    }

    pub async fn wait_before_retry(&self, attempt: u8) {
        let delay = self.delay_for(attempt);
        tracing::info!(
            "Retrying submission in {}s (attempt {})",
            delay.as_secs(),
            attempt as u32 + 2
        );
        sleep(delay).await;
    }
}
