use crate::config::RetrySettings;
use crate::error::{KeeperError, Result};
use std::future::Future;
use std::time::Duration;
use tracing::warn;

/// Run `op` with bounded exponential backoff. Only retryable faults
/// (transport, not-yet-available snapshots) are re-attempted; invariant
/// violations and consistency faults pass straight through. Exhausting the
/// attempt budget surfaces [`KeeperError::RetriesExhausted`] rather than the
/// bare last error so the operator sees how hard the keeper tried.
pub async fn with_backoff<T, F, Fut>(settings: &RetrySettings, label: &str, mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut delay = settings.base_delay();
    let mut last = None;

    for attempt in 1..=settings.max_attempts {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if !e.is_retryable() => return Err(e),
            Err(e) => {
                warn!(
                    label,
                    attempt,
                    max = settings.max_attempts,
                    error = %e,
                    "retryable failure, backing off"
                );
                last = Some(e);
                if attempt < settings.max_attempts {
                    tokio::time::sleep(delay).await;
                    delay = (delay * 2).min(settings.max_delay());
                }
            }
        }
    }

    Err(KeeperError::RetriesExhausted {
        label: label.to_string(),
        attempts: settings.max_attempts,
        last: last
            .map(|e| e.to_string())
            .unwrap_or_else(|| "no attempt recorded".to_string()),
    })
}

/// Settings tuned so tests never sleep meaningfully.
pub fn fast_retries(max_attempts: u32) -> RetrySettings {
    RetrySettings {
        max_attempts,
        base_delay_ms: 1,
        max_delay_ms: 4,
    }
}
