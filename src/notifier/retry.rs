//! Retry logic for notification delivery with linear backoff.

use std::future::Future;

use tracing::{debug, warn};

use super::{ExpirationNotice, Notifier, NotifyError};
use crate::config::NotificationRetryConfig;

/// Execute an async operation, retrying errors accepted by `is_retryable`.
///
/// At most `config.max_attempts` calls are made. After failed attempt `n`
/// the wait is `backoff_base_ms * n`. Returns the last error once attempts
/// are exhausted or a non-retryable error is seen.
pub async fn with_retry_generic<F, Fut, T, E, P>(
    config: &NotificationRetryConfig,
    operation_name: &str,
    is_retryable: P,
    operation: F,
) -> Result<T, E>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
    P: Fn(&E) -> bool,
{
    let max_attempts = config.max_attempts.max(1);
    let mut attempt = 1;

    loop {
        match operation().await {
            Ok(value) => {
                if attempt > 1 {
                    debug!(
                        operation = operation_name,
                        attempt, "Operation succeeded after retry"
                    );
                }
                return Ok(value);
            }
            Err(error) if attempt < max_attempts && is_retryable(&error) => {
                let delay = config.delay_for_attempt(attempt);
                warn!(
                    operation = operation_name,
                    error = %error,
                    attempt,
                    max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    "Retryable error, will retry after delay"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(error) => {
                if attempt > 1 {
                    warn!(
                        operation = operation_name,
                        error = %error,
                        attempts = attempt,
                        "Operation failed after all retry attempts"
                    );
                }
                return Err(error);
            }
        }
    }
}

/// Send a notice, retrying rate limits, server errors and transport failures.
pub async fn send_with_retry(
    notifier: &dyn Notifier,
    config: &NotificationRetryConfig,
    notice: &ExpirationNotice,
) -> Result<(), NotifyError> {
    with_retry_generic(config, "send_expiration_notice", NotifyError::is_retryable, || {
        notifier.send(notice)
    })
    .await
}
