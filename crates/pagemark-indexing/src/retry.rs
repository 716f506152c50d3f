//! Rate-limit retry policy for batch operations.
//!
//! Only throttling is retried. The wait is the provider's hint when it sent
//! one, else a fixed default; after `max_retries` waits the item is abandoned
//! and the error returned so the batch can move on.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use backoff::backoff::Backoff;
use pagemark_embeddings::EmbeddingError;
use pagemark_summarizer::SummarizerError;
use pagemark_types::RetrySettings;
use tracing::{debug, warn};

/// Errors that may carry a provider rate-limit signal.
pub trait RateLimitHint {
    /// `Some(hint)` if this is a rate-limit error, `None` otherwise.
    fn retry_hint(&self) -> Option<Option<Duration>>;
}

impl RateLimitHint for EmbeddingError {
    fn retry_hint(&self) -> Option<Option<Duration>> {
        EmbeddingError::retry_hint(self)
    }
}

impl RateLimitHint for SummarizerError {
    fn retry_hint(&self) -> Option<Option<Duration>> {
        SummarizerError::retry_hint(self)
    }
}

/// Bounded retry on rate limiting.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub default_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_settings(&RetrySettings::default())
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32, default_backoff: Duration) -> Self {
        Self {
            max_retries,
            default_backoff,
        }
    }

    pub fn from_settings(settings: &RetrySettings) -> Self {
        Self::new(
            settings.max_retries,
            Duration::from_secs(settings.default_backoff_secs),
        )
    }

    /// Policy that never retries.
    pub fn none() -> Self {
        Self::new(0, Duration::ZERO)
    }

    /// Run `op`, waiting and retrying while it reports rate limiting.
    pub async fn run<T, E, F, Fut>(&self, what: &str, mut op: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: RateLimitHint + Display,
    {
        let mut backoff = HintedBackoff::new(self);
        loop {
            let err = match op().await {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };

            let Some(hint) = err.retry_hint() else {
                return Err(err);
            };
            backoff.hint = hint;

            match backoff.next_backoff() {
                Some(wait) => {
                    warn!(
                        operation = what,
                        error = %err,
                        retry_in_ms = wait.as_millis() as u64,
                        "Rate limited, retrying"
                    );
                    tokio::time::sleep(wait).await;
                }
                None => {
                    warn!(operation = what, error = %err, "Retries exhausted");
                    return Err(err);
                }
            }
        }
    }
}

/// Backoff using the latest server hint, falling back to a fixed wait.
struct HintedBackoff {
    default: Duration,
    hint: Option<Duration>,
    remaining: u32,
    max_retries: u32,
}

impl HintedBackoff {
    fn new(policy: &RetryPolicy) -> Self {
        Self {
            default: policy.default_backoff,
            hint: None,
            remaining: policy.max_retries,
            max_retries: policy.max_retries,
        }
    }
}

impl Backoff for HintedBackoff {
    fn reset(&mut self) {
        self.hint = None;
        self.remaining = self.max_retries;
    }

    fn next_backoff(&mut self) -> Option<Duration> {
        if self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;
        let wait = self.hint.take().unwrap_or(self.default);
        debug!(wait_ms = wait.as_millis() as u64, remaining = self.remaining, "Next backoff");
        Some(wait)
    }
}
