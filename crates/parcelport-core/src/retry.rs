//! Caller-side retry policy driven by the error taxonomy.
//!
//! Adapters never retry on their own. Hosts decide with [`RetryPolicy::decide`]
//! or wrap a call in [`retry_with_policy`].

use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{CarrierError, ErrorCategory};

/// Wait between attempts when the carrier gave no `retry-after` hint.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Backoff {
    Fixed {
        delay: Duration,
    },
    /// `base * factor^attempt`, capped at `max`. Jitter spreads the delay
    /// over half to one and a half times its value.
    Exponential {
        base: Duration,
        factor: f64,
        max: Duration,
        jitter: bool,
    },
}

impl Default for Backoff {
    fn default() -> Self {
        Self::Exponential {
            base: Duration::from_millis(200),
            factor: 2.0,
            max: Duration::from_secs(5),
            jitter: true,
        }
    }
}

impl Backoff {
    /// Delay for the given retry attempt (0-based).
    pub fn delay(self, attempt: u32) -> Duration {
        match self {
            Self::Fixed { delay } => delay,
            Self::Exponential {
                base,
                factor,
                max,
                jitter,
            } => {
                let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
                let seconds = base.as_secs_f64() * factor.powi(exponent);
                let capped = if seconds.is_finite() {
                    seconds.min(max.as_secs_f64())
                } else {
                    max.as_secs_f64()
                };
                let delay = Duration::from_secs_f64(capped.max(0.0));

                if !jitter {
                    return delay;
                }

                let millis = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
                let spread = millis / 2;
                let offset = fastrand::u64(0..=spread.saturating_mul(2));
                Duration::from_millis((millis - spread).saturating_add(offset))
            }
        }
    }
}

/// Decision returned for one failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    RetryAfter(Duration),
    FailNow,
}

/// Serializable retry settings, see [`RetryPolicy::from_settings`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub jitter: bool,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay_ms: 200,
            max_delay_ms: 5_000,
            jitter: true,
        }
    }
}

/// Maps an error category and attempt count to a retry decision.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts = `max_retries + 1`.
    pub max_retries: u32,
    pub backoff: Backoff,
    /// Use the carrier's `retry-after` hint for rate limits instead of the backoff.
    pub honor_retry_after: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_settings(&RetrySettings::default())
    }
}

impl RetryPolicy {
    pub fn from_settings(settings: &RetrySettings) -> Self {
        Self {
            max_retries: settings.max_retries,
            backoff: Backoff::Exponential {
                base: Duration::from_millis(settings.base_delay_ms),
                factor: 2.0,
                max: Duration::from_millis(settings.max_delay_ms),
                jitter: settings.jitter,
            },
            honor_retry_after: true,
        }
    }

    pub fn fixed(delay: Duration, max_retries: u32) -> Self {
        Self {
            max_retries,
            backoff: Backoff::Fixed { delay },
            honor_retry_after: true,
        }
    }

    pub fn no_retry() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    /// `attempt` counts failed attempts so far, starting at 0 for the first failure.
    pub fn decide(&self, error: &CarrierError, attempt: u32) -> RetryDecision {
        if attempt >= self.max_retries {
            return RetryDecision::FailNow;
        }

        match error.category() {
            ErrorCategory::RateLimit => {
                let hinted = error
                    .retry_after_ms()
                    .filter(|_| self.honor_retry_after)
                    .map(Duration::from_millis);
                RetryDecision::RetryAfter(hinted.unwrap_or_else(|| self.backoff.delay(attempt)))
            }
            ErrorCategory::Transient => RetryDecision::RetryAfter(self.backoff.delay(attempt)),
            ErrorCategory::Validation | ErrorCategory::Auth | ErrorCategory::Permanent => {
                RetryDecision::FailNow
            }
        }
    }
}

/// Runs `operation` until it succeeds or `policy` says to stop.
pub async fn retry_with_policy<T, F, Fut>(
    policy: &RetryPolicy,
    mut operation: F,
) -> Result<T, CarrierError>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, CarrierError>>,
{
    let mut attempt = 0;
    loop {
        match operation(attempt).await {
            Ok(value) => return Ok(value),
            Err(error) => match policy.decide(&error, attempt) {
                RetryDecision::RetryAfter(delay) => {
                    tracing::debug!(
                        attempt,
                        category = error.category().as_str(),
                        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        "retrying carrier call"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                RetryDecision::FailNow => return Err(error),
            },
        }
    }
}
