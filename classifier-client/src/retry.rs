use feedguard_core::{ClassifierConfig, CoreError, ErrorExt};
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, error, info};

#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Total attempts, the first one included.
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    /// Upper bound for any single wait, including one the server asked for.
    pub max_delay_ms: u64,
    pub backoff_multiplier: f64,
    /// Fraction of the backoff added as random jitter, in `[0, 1]`.
    pub jitter_factor: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 250,
            max_delay_ms: 5000,
            backoff_multiplier: 2.0,
            jitter_factor: 0.1,
        }
    }
}

impl RetryConfig {
    pub fn from_classifier_config(config: &ClassifierConfig) -> Self {
        Self {
            max_attempts: config.max_attempts,
            base_delay_ms: config.retry_base_delay_ms,
            ..Default::default()
        }
    }

    fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }

    /// Backoff before retry number `retry` (0 for the first retry).
    pub fn backoff(&self, retry: u32) -> Duration {
        let scaled = self.base_delay_ms as f64 * self.backoff_multiplier.powi(retry as i32);
        let base = Duration::from_millis(scaled.min(self.max_delay_ms as f64) as u64);

        let jitter_ms = (base.as_millis() as f64 * self.jitter_factor) as u64;
        let jitter = Duration::from_millis(fastrand::u64(0..=jitter_ms));
        (base + jitter).min(self.max_delay())
    }

    /// How long to wait after `error` before retry number `retry`, or `None`
    /// when the error is permanent.
    pub fn delay_for(&self, error: &CoreError, retry: u32) -> Option<Duration> {
        if !error.is_retryable() {
            return None;
        }
        Some(match error.retry_after() {
            Some(requested) => requested.min(self.max_delay()),
            None => self.backoff(retry),
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RetryMetrics {
    pub attempts: u64,
    pub retries: u64,
    /// Operations that failed at least once and then succeeded.
    pub recovered: u64,
    /// Operations that gave up.
    pub exhausted: u64,
    pub total_wait: Duration,
}

#[derive(Debug, Clone)]
pub struct RetryExecutor {
    config: RetryConfig,
    metrics: Arc<Mutex<RetryMetrics>>,
}

impl RetryExecutor {
    pub fn new(config: RetryConfig) -> Self {
        Self {
            config,
            metrics: Arc::new(Mutex::new(RetryMetrics::default())),
        }
    }

    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// Calls `operation` until it succeeds, fails permanently or has been
    /// tried `max_attempts` times. The last error is returned on failure.
    pub async fn execute<F, Fut, T>(&self, name: &str, operation: F) -> Result<T, CoreError>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, CoreError>>,
    {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            self.lock_metrics().attempts += 1;

            let error = match operation().await {
                Ok(value) => {
                    if attempt > 1 {
                        self.lock_metrics().recovered += 1;
                        info!("{} succeeded on attempt {}", name, attempt);
                    }
                    return Ok(value);
                }
                Err(error) => error,
            };
            debug!("{} attempt {} failed: {}", name, attempt, error);

            let delay = if attempt < self.config.max_attempts {
                self.config.delay_for(&error, attempt - 1)
            } else {
                None
            };
            let Some(delay) = delay else {
                self.lock_metrics().exhausted += 1;
                error!("{} gave up after {} attempt(s): {}", name, attempt, error);
                return Err(error);
            };

            {
                let mut metrics = self.lock_metrics();
                metrics.retries += 1;
                metrics.total_wait += delay;
            }
            info!("Retrying {} in {:?}", name, delay);
            sleep(delay).await;
        }
    }

    pub fn get_metrics(&self) -> RetryMetrics {
        self.lock_metrics().clone()
    }

    pub fn reset_metrics(&self) {
        *self.lock_metrics() = RetryMetrics::default();
    }

    fn lock_metrics(&self) -> MutexGuard<'_, RetryMetrics> {
        self.metrics.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
