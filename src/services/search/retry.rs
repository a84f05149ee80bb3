//! Retry with exponential backoff for transient adapter failures.
//!
//! At most three attempts, and the whole sequence (attempts plus
//! backoff sleeps) stays inside the adapter's configured timeout.

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;

use super::AdapterError;

pub const MAX_ATTEMPTS: u32 = 3;
const INITIAL_BACKOFF: Duration = Duration::from_millis(200);

pub async fn retry_with_backoff<T, F, Fut>(
    total_timeout: Duration,
    mut operation: F,
) -> Result<T, AdapterError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, AdapterError>>,
{
    let deadline = Instant::now() + total_timeout;
    let mut backoff = INITIAL_BACKOFF;

    for attempt in 1..=MAX_ATTEMPTS {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return Err(AdapterError::Timeout(total_timeout.as_secs()));
        }

        let result = match tokio::time::timeout(remaining, operation()).await {
            Ok(result) => result,
            Err(_) => return Err(AdapterError::Timeout(total_timeout.as_secs())),
        };

        match result {
            Ok(value) => return Ok(value),
            Err(e) if e.is_transient() && attempt < MAX_ATTEMPTS => {
                tracing::debug!("Transient failure (attempt {}/{}): {}", attempt, MAX_ATTEMPTS, e);
                let sleep = backoff.min(deadline.saturating_duration_since(Instant::now()));
                if sleep.is_zero() {
                    return Err(AdapterError::Timeout(total_timeout.as_secs()));
                }
                tokio::time::sleep(sleep).await;
                backoff *= 2;
            },
            Err(e) => return Err(e),
        }
    }

    Err(AdapterError::Timeout(total_timeout.as_secs()))
}
