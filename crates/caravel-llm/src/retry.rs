//! Retry policy with exponential backoff for outbound model requests.
//!
//! A [`RetryPolicy`] is pure configuration plus the backoff arithmetic;
//! [`with_retry`] drives the attempt loop. The policy decides retryability
//! from the observed HTTP failure code, so a 401 fails fast while a 503
//! backs off and tries again.

use std::collections::HashSet;
use std::time::Duration;

use rand::Rng;

use crate::error::{LlmError, Result};

/// Backoff configuration for retried requests.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_attempts: u32,
    backoff_base: f64,
    initial_delay: Duration,
    max_delay: Option<Duration>,
    jitter: f64,
    retryable: HashSet<u16>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_base: 2.0,
            initial_delay: Duration::from_millis(500),
            max_delay: None,
            jitter: 0.0,
            retryable: [429, 500, 502, 503, 504].into_iter().collect(),
        }
    }
}

impl RetryPolicy {
    /// Create a policy. `max_attempts` is floored at 1 and `backoff_base`
    /// at 1.0 so a misconfigured policy still makes progress.
    pub fn new(max_attempts: u32, backoff_base: f64, initial_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff_base: backoff_base.max(1.0),
            initial_delay,
            ..Self::default()
        }
    }

    /// Cap the unjittered delay.
    pub fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = Some(max_delay);
        self
    }

    /// Set the jitter fraction. Values are clamped to `[0, 1)`.
    pub fn with_jitter(mut self, jitter: f64) -> Self {
        self.jitter = jitter.clamp(0.0, 0.999);
        self
    }

    /// Replace the set of retryable HTTP status codes.
    pub fn with_retryable_codes(mut self, codes: impl IntoIterator<Item = u16>) -> Self {
        self.retryable = codes.into_iter().collect();
        self
    }

    /// Total attempts per request, always at least 1.
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Delay to sleep after attempt `attempt` (1-based) fails.
    ///
    /// `initial_delay * backoff_base^(attempt-1)`, capped by `max_delay`
    /// when configured, then perturbed by `[-jitter, +jitter] * delay`.
    pub fn next_delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let mut delay = self.initial_delay.as_secs_f64() * self.backoff_base.powi(exponent);

        if let Some(cap) = self.max_delay {
            delay = delay.min(cap.as_secs_f64());
        }

        if self.jitter > 0.0 {
            let factor = rand::thread_rng().gen_range(-self.jitter..=self.jitter);
            delay += delay * factor;
        }

        Duration::from_secs_f64(delay.max(0.0))
    }

    /// Whether a failure with this HTTP status should be retried.
    pub fn is_retryable_status(&self, status: u16) -> bool {
        self.retryable.contains(&status)
    }

    /// Whether an error should be retried.
    ///
    /// Network failures (no status observed) are always retryable; HTTP
    /// failures consult the configured code set; everything else is
    /// terminal.
    pub fn is_retryable(&self, error: &LlmError) -> bool {
        match error {
            LlmError::Network(_) => true,
            LlmError::Http { status, .. } => self.is_retryable_status(*status),
            _ => false,
        }
    }
}

/// Execute an async operation under a retry policy.
///
/// Retries only errors the policy classifies as retryable, sleeping the
/// policy's delay between attempts. Exhausting the attempt budget returns
/// the last observed error.
pub async fn with_retry<F, Fut, T>(policy: &RetryPolicy, label: &str, mut f: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T>>,
{
    let mut last_error = None;

    for attempt in 1..=policy.max_attempts() {
        match f().await {
            Ok(result) => return Ok(result),
            Err(e) => {
                if !policy.is_retryable(&e) {
                    return Err(e);
                }

                last_error = Some(e);

                if attempt < policy.max_attempts() {
                    let delay = policy.next_delay(attempt);
                    tracing::warn!(
                        backend = label,
                        attempt,
                        max_attempts = policy.max_attempts(),
                        delay_ms = delay.as_millis() as u64,
                        "request failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    Err(last_error.unwrap())
}
