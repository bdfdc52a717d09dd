use std::future::Future;
use std::time::Duration;

use crate::config::{DEFAULT_API_DELAY_MS, DEFAULT_MAX_RETRIES};
use crate::error::{Error, Result};

/// Retry and throttle settings for publication API calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first 429; the call is attempted `max_retries + 1` times.
    pub max_retries: u32,
    /// Sleep after every call, and the seed of the 429 backoff.
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            base_delay: Duration::from_millis(DEFAULT_API_DELAY_MS),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32, base_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
        }
    }

    /// Backoff before retry number `attempt + 1`: base, 2x base, 4x base, ...
    pub fn backoff(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(1u32 << attempt.min(16))
    }
}

/// Run `op`, retrying with exponential backoff while it reports
/// `Error::RemoteThrottled`. Once retries are exhausted the throttle is
/// surfaced as `Error::RemoteFailure`. Every finished call is followed by a
/// `base_delay` sleep so sequential callers stay under the remote rate limit.
///
/// `op` is called again on each attempt, so it must rebuild its request.
pub async fn with_retry<T, F, Fut>(policy: &RetryPolicy, what: &str, mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt: u32 = 0;
    loop {
        match op().await {
            Err(Error::RemoteThrottled(msg)) => {
                if attempt >= policy.max_retries {
                    log::error!("{what}: still rate limited after {attempt} retries");
                    tokio::time::sleep(policy.base_delay).await;
                    return Err(Error::RemoteFailure(format!(
                        "rate limited after {attempt} retries: {msg}"
                    )));
                }
                let wait = policy.backoff(attempt);
                log::warn!(
                    "{what}: rate limited (429). Waiting {}ms before retry {}/{}",
                    wait.as_millis(),
                    attempt + 1,
                    policy.max_retries
                );
                tokio::time::sleep(wait).await;
                attempt += 1;
            }
            outcome => {
                tokio::time::sleep(policy.base_delay).await;
                return outcome;
            }
        }
    }
}
