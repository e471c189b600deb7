//! Bounded retry with backoff.
//!
//! [`retry`] is a generic combinator over any async operation: it takes a
//! [`RetryPolicy`] (attempt budget and backoff shape) and a predicate that
//! decides which errors are worth another attempt. [`send_with_retry`] is the
//! transport-specific use of it, retrying only transient transport errors.

use std::future::Future;
use std::time::Duration;

use crate::error::DispatchError;
use crate::message::RenderedMessage;
use crate::transport::{DeliveryId, Transport};

/// Default attempt budget per message.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Default base delay between attempts.
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(2000);

/// Shape of the wait between attempts.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Backoff {
    /// `base * n` after the n-th failed attempt.
    Linear,
    /// `base * multiplier^(n-1)` after the n-th failed attempt, capped at `max`.
    Exponential { multiplier: f64, max: Duration },
    /// `base` after every failed attempt.
    Fixed,
}

/// Retry budget and backoff.
///
/// The default is 3 attempts with linear backoff from a 2 second base:
/// 2s before the second attempt, 4s before the third.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts, including the first. Never less than 1.
    pub max_attempts: u32,
    /// Delay unit the backoff is scaled from.
    pub base_delay: Duration,
    pub backoff: Backoff,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay: DEFAULT_BASE_DELAY,
            backoff: Backoff::Linear,
        }
    }
}

impl RetryPolicy {
    /// Linear policy with the given budget and base delay.
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
            backoff: Backoff::Linear,
        }
    }

    /// A single attempt, never retried.
    pub fn no_retry() -> Self {
        Self::new(1, Duration::ZERO)
    }

    /// Set the backoff shape.
    pub fn backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    /// Attempt budget, clamped to at least one.
    pub fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }

    /// Wait after the `failed_attempt`-th attempt (1-based) has failed.
    pub fn delay_after(&self, failed_attempt: u32) -> Duration {
        let n = failed_attempt.max(1);
        match self.backoff {
            Backoff::Linear => self.base_delay.saturating_mul(n),
            Backoff::Fixed => self.base_delay,
            Backoff::Exponential { multiplier, max } => {
                let ms = self.base_delay.as_millis() as f64 * multiplier.powi(n as i32 - 1);
                Duration::from_millis(ms.min(max.as_millis() as f64) as u64)
            }
        }
    }
}

/// The result of a retried operation and how many attempts it took.
#[derive(Debug)]
pub struct Attempted<T, E> {
    pub result: Result<T, E>,
    pub attempts: u32,
}

/// Run `operation` under `policy`, retrying errors for which `is_retryable`
/// returns true.
///
/// Attempts are strictly sequential. Success returns immediately; a
/// non-retryable error, or a retryable one on the final attempt, is returned
/// as-is without further waiting.
pub async fn retry<T, E, F, Fut, P>(
    policy: &RetryPolicy,
    operation_name: &str,
    is_retryable: P,
    mut operation: F,
) -> Attempted<T, E>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    P: Fn(&E) -> bool,
    E: std::fmt::Display,
{
    let max_attempts = policy.attempts();
    let mut attempt = 1;

    loop {
        match operation(attempt).await {
            Ok(value) => {
                if attempt > 1 {
                    tracing::info!(operation = operation_name, attempt, "Succeeded after retry");
                }
                return Attempted {
                    result: Ok(value),
                    attempts: attempt,
                };
            }
            Err(err) if !is_retryable(&err) => {
                tracing::warn!(operation = operation_name, attempt, error = %err, "Permanent failure, not retrying");
                return Attempted {
                    result: Err(err),
                    attempts: attempt,
                };
            }
            Err(err) if attempt >= max_attempts => {
                tracing::warn!(operation = operation_name, attempt, max_attempts, error = %err, "Retries exhausted");
                return Attempted {
                    result: Err(err),
                    attempts: attempt,
                };
            }
            Err(err) => {
                let delay = policy.delay_after(attempt);
                tracing::warn!(
                    operation = operation_name,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "Attempt failed, backing off"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}

/// Send `message` through `transport`, retrying transient transport errors.
pub async fn send_with_retry<T: Transport + ?Sized>(
    transport: &T,
    message: &RenderedMessage,
    policy: &RetryPolicy,
) -> Attempted<DeliveryId, DispatchError> {
    retry(policy, "transport.send", DispatchError::is_transient, |_| async move {
        let result = transport.send(message).await;

        #[cfg(feature = "metrics")]
        {
            let outcome = match &result {
                Ok(_) => "ok",
                Err(e) if e.is_transient() => "transient",
                Err(_) => "permanent",
            };
            metrics::counter!(
                "bulletin_send_attempts_total",
                "provider" => transport.provider_name(),
                "result" => outcome
            )
            .increment(1);
        }

        result
    })
    .await
}
