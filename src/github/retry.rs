// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Exponential backoff retry for calls to the hosting API.
//!
//! An operation is attempted up to [`RetryConfig::max_attempts`] times. Only
//! failures that classify themselves as transient through [`Retryable`] are
//! retried. Everything else is handed back untouched on first sight.
//!
//! The caller is suspended for the cumulative backoff duration, which with
//! the default configuration amounts to at most about six seconds.

use rand::Rng;
use std::{future::Future, time::Duration};
use tracing::{debug, warn};

/// Exponential backoff configuration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryConfig {
    /// Total number of attempts, including the first one.
    pub max_attempts: u32,

    /// Delay before the first retry.
    pub base_delay: Duration,

    /// Cap on the delay between attempts.
    pub max_delay: Duration,

    /// Random jitter applied to each delay, as a fraction of it.
    pub jitter: f64,
}

impl RetryConfig {
    /// Configuration that never retries.
    pub const NO_RETRY: Self = Self {
        max_attempts: 1,
        base_delay: Duration::ZERO,
        max_delay: Duration::ZERO,
        jitter: 0.0,
    };

    /// Delay before retry number `retry` (0-indexed), without jitter.
    ///
    /// Doubles with each retry: `base_delay * 2^retry`, capped at
    /// `max_delay`.
    pub fn delay_for_retry(&self, retry: u32) -> Duration {
        let factor = 2u32.saturating_pow(retry);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }

    fn jittered(&self, delay: Duration) -> Duration {
        if self.jitter <= 0.0 || delay.is_zero() {
            return delay;
        }

        let spread = rand::thread_rng().gen_range(-self.jitter..=self.jitter);
        delay.mul_f64((1.0 + spread).max(0.0))
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(10),
            jitter: 0.1,
        }
    }
}

/// Classify failures for retry decisions.
pub trait Retryable {
    /// Whether trying again may succeed.
    fn is_transient(&self) -> bool;
}

/// Execute an operation with exponential backoff.
///
/// The operation is called repeatedly until it succeeds, fails with a
/// non-transient error, or runs out of attempts.
///
/// # Errors
///
/// - Return [`RetryError::Terminal`] on the first non-transient failure.
/// - Return [`RetryError::Exhausted`] carrying the last failure once every
///   attempt failed transiently.
pub async fn retry_with_backoff<T, E, F, Fut>(
    config: &RetryConfig,
    mut operation: F,
) -> Result<T, RetryError<E>>
where
    E: Retryable + std::error::Error + 'static,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let max_attempts = config.max_attempts.max(1);
    let mut attempt = 0;

    loop {
        attempt += 1;
        match operation().await {
            Ok(value) => return Ok(value),
            Err(error) if !error.is_transient() => return Err(RetryError::Terminal(error)),
            Err(error) if attempt >= max_attempts => {
                warn!("giving up after {attempt} attempt(s): {error}");
                return Err(RetryError::Exhausted {
                    attempts: attempt,
                    source: error,
                });
            }
            Err(error) => {
                let delay = config.jittered(config.delay_for_retry(attempt - 1));
                debug!("attempt {attempt} failed transiently ({error}), retry in {delay:?}");
                tokio::time::sleep(delay).await;
            }
        }
    }
}

/// Failure of a retried operation.
#[derive(Debug, thiserror::Error)]
pub enum RetryError<E>
where
    E: std::error::Error + 'static,
{
    /// Every attempt failed transiently.
    #[error("transient failure after {attempts} attempt(s): {source}")]
    Exhausted {
        attempts: u32,
        #[source]
        source: E,
    },

    /// Failure that retrying cannot fix.
    #[error(transparent)]
    Terminal(E),
}

impl<E> RetryError<E>
where
    E: std::error::Error + 'static,
{
    /// Underlying failure of the last attempt.
    pub fn last_error(&self) -> &E {
        match self {
            Self::Exhausted { source, .. } => source,
            Self::Terminal(source) => source,
        }
    }

    /// Whether retries ran out.
    pub fn is_exhausted(&self) -> bool {
        matches!(self, Self::Exhausted { .. })
    }
}
