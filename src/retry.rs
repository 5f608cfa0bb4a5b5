//! Exponential backoff for provider and classification calls.

use std::future::Future;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of retry attempts after the first call
    pub max_retries: u32,
    pub initial_delay: Duration,
    /// Cap on the delay between attempts
    pub max_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
        }
    }
}

impl RetryConfig {
    pub fn new(max_retries: u32, initial_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_retries,
            initial_delay,
            max_delay,
        }
    }

    /// Single attempt, no retries.
    pub fn none() -> Self {
        Self::new(0, Duration::ZERO, Duration::ZERO)
    }
}

/// Retry while `should_retry` accepts the error.
///
/// A rejected error is returned immediately; an accepted one is retried up to
/// `config.max_retries` times with doubling delays capped at `config.max_delay`.
///
/// # Example
/// ```ignore
/// let page = with_retry_if(&config, ProviderError::is_retryable, || async {
///     client.get(url).send().await
/// }).await?;
/// ```
pub async fn with_retry_if<F, Fut, T, E, P>(
    config: &RetryConfig,
    should_retry: P,
    mut operation: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
    P: Fn(&E) -> bool,
{
    let mut attempts = 0;
    let mut delay = config.initial_delay;

    loop {
        match operation().await {
            Ok(result) => return Ok(result),
            Err(e) => {
                attempts += 1;
                if attempts > config.max_retries || !should_retry(&e) {
                    return Err(e);
                }

                tracing::warn!(
                    attempt = attempts,
                    max_attempts = config.max_retries + 1,
                    error = %e,
                    "Request failed, retrying in {:?}",
                    delay
                );

                tokio::time::sleep(delay).await;
                delay = (delay * 2).min(config.max_delay);
            }
        }
    }
}
