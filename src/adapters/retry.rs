//! Exponential backoff for outbound requests

use crate::config::RetryConfig;
use crate::log_retry_attempt;
use std::fmt::Display;
use std::future::Future;

/// Runs `operation` until it succeeds, `should_retry` rejects the error, or
/// `config.max_retries` attempts have been made.
///
/// The delay before attempt `n + 1` is `initial_delay_ms * multiplier^(n-1)`,
/// capped at `max_delay_ms`.
pub async fn retry_with_backoff<F, Fut, T, E, R>(
    config: &RetryConfig,
    operation_name: &str,
    should_retry: R,
    operation: F,
) -> Result<T, E>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
    R: Fn(&E) -> bool,
{
    let max_retries = config.max_retries.max(1);
    let mut attempt = 0;

    loop {
        match operation().await {
            Ok(result) => return Ok(result),
            Err(e) => {
                attempt += 1;
                if attempt >= max_retries || !should_retry(&e) {
                    return Err(e);
                }

                let delay = config.delay_for_attempt(attempt);

                log_retry_attempt!(operation_name, attempt, max_retries, delay, e);

                tokio::time::sleep(delay).await;
            }
        }
    }
}
