//! Shared retry logic for provider adapters.

use std::time::Duration;

use crate::error::{LlmError, Result};

/// Execute an async operation with exponential backoff retry.
///
/// Retries only on transient errors (network failures, rate limits).
/// Non-retryable errors are returned immediately.
pub async fn with_retry<F, Fut, T>(
    max_retries: u32,
    initial_backoff: Duration,
    adapter_name: &str,
    mut f: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T>>,
{
    let mut last_error: Option<LlmError> = None;
    let mut backoff = initial_backoff;

    for attempt in 0..=max_retries {
        match f().await {
            Ok(result) => return Ok(result),
            Err(e) => {
                if !e.is_retryable() {
                    return Err(e);
                }

                last_error = Some(e);

                if attempt < max_retries {
                    tracing::warn!(
                        adapter = adapter_name,
                        attempt = attempt + 1,
                        max_retries = max_retries,
                        backoff_ms = backoff.as_millis() as u64,
                        "Request failed, retrying"
                    );
                    tokio::time::sleep(backoff).await;
                    backoff *= 2;
                }
            }
        }
    }

    Err(last_error.expect("retry loop exits early unless an error was recorded"))
}
