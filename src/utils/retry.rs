//! Cancellable retry with capped exponential backoff.
//!
//! Delays come from `backon`'s exponential builder: `base * 2^attempt`,
//! capped at the configured maximum, no jitter. The sleep between attempts
//! selects on the caller's cancellation token, so a shutdown never waits
//! out a backoff.

use std::time::Duration;

use backon::{BackoffBuilder, ExponentialBuilder};
use tokio_util::sync::CancellationToken;
use tracing::warn;

/// Retry policy. Defaults: 5 attempts, 1s base delay, 30s cap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryConfig {
    pub max_attempts: usize,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
        }
    }
}

impl RetryConfig {
    pub fn with_max_attempts(mut self, max_attempts: usize) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    fn delays(&self) -> impl Iterator<Item = Duration> {
        ExponentialBuilder::default()
            .with_min_delay(self.base_delay)
            .with_max_delay(self.max_delay)
            .with_max_times(self.max_attempts)
            .build()
    }
}

/// Terminal outcome of a retried operation.
#[derive(Debug, thiserror::Error)]
pub enum RetryError<E> {
    #[error("max retries ({attempts}) exceeded: {source}")]
    Exhausted {
        attempts: usize,
        #[source]
        source: E,
    },

    #[error("retry cancelled")]
    Cancelled,
}

/// Run `op` up to `config.max_attempts` times.
///
/// Returns the first success, [`RetryError::Exhausted`] wrapping the last
/// failure, or [`RetryError::Cancelled`] if the token fires during a
/// backoff sleep. The operation itself is responsible for observing the
/// token if it can block.
pub async fn retry<F, Fut, T, E>(
    cancel: &CancellationToken,
    config: &RetryConfig,
    mut op: F,
) -> Result<T, RetryError<E>>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let mut delays = config.delays();
    let mut attempt = 0;

    loop {
        attempt += 1;

        let err = match op().await {
            Ok(value) => return Ok(value),
            Err(err) => err,
        };

        if attempt >= config.max_attempts {
            return Err(RetryError::Exhausted {
                attempts: config.max_attempts,
                source: err,
            });
        }

        let delay = delays.next().unwrap_or(config.max_delay);
        warn!(
            attempt = attempt,
            delay_ms = delay.as_millis() as u64,
            error = %err,
            "Operation failed, retrying after backoff"
        );

        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = cancel.cancelled() => return Err(RetryError::Cancelled),
        }
    }
}
