//! Automatic retry with exponential backoff.
//!
//! [`retry_call`] wraps one logical unit of remote work. Errors the caller's
//! predicate marks as transient are retried with a delay of
//! `base_delay * 2^(attempt - 1)`, up to `max_attempts` total attempts.
//! Anything else, and the final failure after the last attempt, propagates
//! unchanged.

use std::future::Future;
use std::time::Duration;

use tracing::{debug, warn};

/// Configuration for retry behavior.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Total attempts including the first one (1 = never retry).
    pub max_attempts: u32,
    /// Delay before the first retry. Doubles on every subsequent retry.
    pub base_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
        }
    }
}

impl RetryConfig {
    /// A config that performs exactly one attempt.
    pub fn no_retries() -> Self {
        Self {
            max_attempts: 1,
            ..Default::default()
        }
    }

    pub fn with_base_delay(mut self, delay: Duration) -> Self {
        self.base_delay = delay;
        self
    }

    /// Delay after a transient failure on `attempt` (1-indexed).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        self.base_delay.saturating_mul(1u32 << exponent)
    }
}

/// Invoke `call` until it succeeds, fails permanently, or runs out of attempts.
///
/// Each invocation keeps its own attempt counter, so concurrent or nested
/// calls never share backoff state. The delay is an async sleep: other tasks
/// on the runtime keep running while a retry is pending.
pub async fn retry_call<T, E, F, Fut, P>(
    config: &RetryConfig,
    is_transient: P,
    mut call: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    P: Fn(&E) -> bool,
    E: std::fmt::Display,
{
    let max_attempts = config.max_attempts.max(1);
    let mut attempt = 1;
    loop {
        match call().await {
            Ok(v) => {
                if attempt > 1 {
                    debug!("Call recovered on attempt {attempt}/{max_attempts}");
                }
                return Ok(v);
            }
            Err(e) => {
                if attempt < max_attempts && is_transient(&e) {
                    let delay = config.delay_for_attempt(attempt);
                    warn!(
                        "Transient error (attempt {attempt}/{max_attempts}): {e}. Retrying in {delay:?}..."
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                } else {
                    return Err(e);
                }
            }
        }
    }
}
