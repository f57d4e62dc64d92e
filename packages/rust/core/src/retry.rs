//! Bounded exponential backoff for adapter calls.

use std::future::Future;
use std::time::Duration;

use seocompass_shared::{PipelineConfig, Result, SeoCompassError};

/// Attempts and backoff applied to each stage's adapter call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(8),
        }
    }
}

impl From<&PipelineConfig> for RetryPolicy {
    fn from(config: &PipelineConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            base_delay: config.base_delay,
            max_delay: config.max_delay,
        }
    }
}

impl RetryPolicy {
    /// Sleep after failed attempt `attempt` (1-based): `base * 2^(attempt-1)`, capped.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u32
            .checked_pow(attempt.saturating_sub(1))
            .unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }

    /// Call `op` until it succeeds or `max_attempts` calls have failed.
    ///
    /// `on_retry(attempt, delay, error)` runs before each backoff sleep. There
    /// is no sleep after the final attempt; its error is returned as-is.
    pub async fn run<T, F, Fut, R>(&self, mut op: F, mut on_retry: R) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
        R: FnMut(u32, Duration, &SeoCompassError),
    {
        let attempts = self.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if attempt >= attempts => return Err(e),
                Err(e) => {
                    let delay = self.delay_for(attempt);
                    on_retry(attempt, delay, &e);
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(4),
        }
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for(1), Duration::from_secs(1));
        assert_eq!(policy.delay_for(2), Duration::from_secs(2));
        assert_eq!(policy.delay_for(3), Duration::from_secs(4));
        assert_eq!(policy.delay_for(4), Duration::from_secs(8));
        assert_eq!(policy.delay_for(5), Duration::from_secs(8));
        assert_eq!(policy.delay_for(64), Duration::from_secs(8));
    }

    #[test]
    fn from_pipeline_config_clamps_attempts() {
        let config = PipelineConfig {
            max_attempts: 0,
            base_delay: Duration::from_millis(10),
            max_delay: Duration::from_millis(20),
            workers: 1,
            queue_capacity: 1,
        };
        let policy = RetryPolicy::from(&config);
        assert_eq!(policy.max_attempts, 1);
        assert_eq!(policy.base_delay, Duration::from_millis(10));
    }

    #[tokio::test]
    async fn succeeds_after_transient_failures() {
        let calls = &AtomicU32::new(0);
        let mut retries = Vec::new();

        let value = fast(3)
            .run(
                move || async move {
                    if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                        Err(SeoCompassError::Adapter("flaky".into()))
                    } else {
                        Ok(42)
                    }
                },
                |attempt, delay, _| retries.push((attempt, delay)),
            )
            .await
            .unwrap();

        assert_eq!(value, 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(
            retries,
            vec![
                (1, Duration::from_millis(1)),
                (2, Duration::from_millis(2))
            ]
        );
    }

    #[tokio::test]
    async fn exhaustion_returns_last_error_without_final_sleep() {
        let calls = &AtomicU32::new(0);
        let mut retries = 0;

        let err = fast(3)
            .run(
                move || async move {
                    let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                    Err::<(), _>(SeoCompassError::Adapter(format!("failure {n}")))
                },
                |_, _, _| retries += 1,
            )
            .await
            .unwrap_err();

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(retries, 2);
        assert!(err.to_string().contains("failure 3"));
    }
}
