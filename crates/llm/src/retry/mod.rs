//! Retry framework shared by the intention extractor and the stage runner.
//!
//! Exponential backoff with optional ±10% jitter. Sleeps use
//! `tokio::time`, so tests can drive them with a paused clock.

use common::LlmError;
use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

/// Configuration for retry behavior with exponential backoff
#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    /// Maximum number of retry attempts (excluding initial attempt)
    pub max_retries: u32,
    /// Initial delay before first retry
    pub initial_delay: Duration,
    /// Maximum delay cap
    pub max_delay: Duration,
    pub backoff_multiplier: f64,
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
            backoff_multiplier: 2.0,
            jitter: true,
        }
    }
}

impl RetryConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Immediate retries without delay, for tests.
    pub fn immediate(max_retries: u32) -> Self {
        Self {
            max_retries,
            initial_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            backoff_multiplier: 1.0,
            jitter: false,
        }
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    pub fn with_backoff_multiplier(mut self, multiplier: f64) -> Self {
        self.backoff_multiplier = multiplier;
        self
    }

    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    pub fn total_attempts(&self) -> u32 {
        self.max_retries + 1
    }
}

/// Trait for errors that can be classified as retryable or non-retryable
pub trait RetryableError {
    fn is_retryable(&self) -> bool;

    /// Short label for logging.
    fn error_type(&self) -> String;

    fn error_message(&self) -> String;
}

impl RetryableError for LlmError {
    fn is_retryable(&self) -> bool {
        LlmError::is_retryable(self)
    }

    fn error_type(&self) -> String {
        self.kind().to_string()
    }

    fn error_message(&self) -> String {
        self.to_string()
    }
}

/// Runs `operation` until it succeeds, fails with a non-retryable error, or
/// the retry budget is exhausted. The last error is returned unchanged.
pub async fn execute_with_retry<F, Fut, T, E>(config: &RetryConfig, mut operation: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: RetryableError,
{
    let start_time = Instant::now();
    let mut attempt = 0;

    loop {
        debug!(
            "Retry attempt {}/{} (total elapsed: {:?})",
            attempt + 1,
            config.total_attempts(),
            start_time.elapsed()
        );

        match operation().await {
            Ok(result) => {
                if attempt > 0 {
                    info!(
                        "Operation succeeded after {} retries (total time: {:?})",
                        attempt,
                        start_time.elapsed()
                    );
                }
                return Ok(result);
            }
            Err(error) => {
                if attempt >= config.max_retries || !error.is_retryable() {
                    error!(
                        error_type = %error.error_type(),
                        "Operation failed permanently: {} (attempt {}/{})",
                        error.error_message(),
                        attempt + 1,
                        config.total_attempts()
                    );
                    return Err(error);
                }

                let delay = calculate_backoff_delay(config, attempt);
                warn!(
                    error_type = %error.error_type(),
                    "Operation failed, retrying: {} (attempt {}/{}, delay: {:?})",
                    error.error_message(),
                    attempt + 1,
                    config.total_attempts(),
                    delay
                );
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                attempt += 1;
            }
        }
    }
}

/// Calculate backoff delay with exponential backoff and optional jitter
pub fn calculate_backoff_delay(config: &RetryConfig, attempt: u32) -> Duration {
    let base_delay = config.initial_delay.as_millis() as f64;
    let exponential_delay = base_delay * config.backoff_multiplier.powi(attempt as i32);

    let mut delay =
        Duration::from_millis(exponential_delay.min(config.max_delay.as_millis() as f64) as u64);

    if config.jitter && !delay.is_zero() {
        let jitter_range = delay.as_millis() as f64 * 0.1;
        let jitter = rand::thread_rng().gen_range(-jitter_range..jitter_range);
        let jittered_delay = (delay.as_millis() as f64 + jitter).max(0.0) as u64;
        delay = Duration::from_millis(jittered_delay);
    }

    delay
}
