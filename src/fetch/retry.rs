//! Bounded retry around a single provider request.

use crate::fetch::error::FetchError;
use crate::fetch::fetcher::Fetcher;
use crate::types::forecast_request::ForecastRequest;
use crate::types::payload::RawPayload;
use log::{debug, warn};
use std::time::Duration;

/// Attempts per request before giving up.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
/// Fixed wait between two attempts.
pub const DEFAULT_BACKOFF: Duration = Duration::from_secs(10);

/// How often and how patiently a request is retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            backoff: DEFAULT_BACKOFF,
        }
    }
}

/// Runs `fetcher` for `request` until it succeeds, fails permanently, or the
/// attempt budget of `policy` is spent.
///
/// Transient failures (transport errors, non-success statuses) are retried
/// after `policy.backoff`. Any other error is returned as-is on the first
/// occurrence. Running out of attempts yields
/// [`FetchError::RetriesExhausted`] wrapping the last failure.
pub async fn fetch_with_retry(
    fetcher: &dyn Fetcher,
    request: &ForecastRequest,
    policy: RetryPolicy,
) -> Result<RawPayload, FetchError> {
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;

    loop {
        debug!(
            "Requesting {} model {} for {} (attempt {}/{})",
            request.provider, request.model, request.location.name, attempt, max_attempts
        );
        match fetcher.fetch_once(request).await {
            Ok(payload) => return Ok(payload),
            Err(e) if !e.is_transient() => return Err(e),
            Err(e) if attempt >= max_attempts => {
                return Err(FetchError::RetriesExhausted {
                    provider: request.provider.clone(),
                    attempts: attempt,
                    last: Box::new(e),
                });
            }
            Err(e) => {
                warn!(
                    "Attempt {}/{} for {} model {} at {} failed: {}. Retrying in {:?}",
                    attempt,
                    max_attempts,
                    request.provider,
                    request.model,
                    request.location.name,
                    e,
                    policy.backoff
                );
                tokio::time::sleep(policy.backoff).await;
                attempt += 1;
            }
        }
    }
}
