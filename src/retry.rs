//! Retry-with-backoff policy shared by backend and blob requests.

use std::future::Future;
use std::time::Duration;

use crate::error::UploadError;

// Retries after the initial attempt
pub const MAX_RETRIES: u32 = 3;
// Base backoff delay, doubled per attempt: 2s, 4s, 8s
pub const BASE_DELAY_MS: u64 = 2000;

/// Repeats `make_request` on transient network failures with exponential
/// backoff. HTTP error responses surface immediately; after [`MAX_RETRIES`]
/// retries the last error is returned.
pub async fn retry_with_backoff<T, F, Fut>(
    op: &'static str,
    mut make_request: F,
) -> Result<T, UploadError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, UploadError>>,
{
    let mut attempt: u32 = 0;

    loop {
        match make_request().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_retryable() && attempt < MAX_RETRIES => {
                let delay = Duration::from_millis(BASE_DELAY_MS << attempt);
                log::warn!(
                    "{}: transient failure, retry {}/{} in {}ms: {}",
                    op,
                    attempt + 1,
                    MAX_RETRIES,
                    delay.as_millis(),
                    err
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}
