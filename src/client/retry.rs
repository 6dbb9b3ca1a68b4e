//! Retry policy: bounded re-execution with exponential backoff and jitter.
//!
//! Wraps a single-attempt operation (typically
//! [`ConnectorClient::request`](crate::client::ConnectorClient::request)) with
//! up to `max_attempts` executions. Only error kinds in the config's retryable
//! set are retried; everything else propagates immediately. The final error is
//! always the original categorized error, never wrapped.

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tracing::{debug, warn};

use super::error::{ConnectorError, ErrorKind};

/// Default maximum attempts (including the initial attempt).
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Default base delay for the first retry.
const DEFAULT_BASE_DELAY: Duration = Duration::from_secs(1);

/// Default delay cap.
const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(32);

/// Default backoff multiplier.
const DEFAULT_MULTIPLIER: f64 = 2.0;

/// Default jitter fraction (±25%).
const DEFAULT_JITTER_FRACTION: f64 = 0.25;

/// Error kinds retried by default. Authentication, NotFound, and Ssl are
/// never retryable: re-sending an identical request cannot help.
const DEFAULT_RETRYABLE: &[ErrorKind] = &[
    ErrorKind::RateLimit,
    ErrorKind::Server,
    ErrorKind::Timeout,
    ErrorKind::Network,
];

/// Configuration for retry behavior with exponential backoff.
///
/// Owned by the caller of a retrying operation and snapshotted at submission
/// time; a config change never rebinds in-flight work.
///
/// # Delay Calculation
///
/// ```text
/// raw    = min(max_delay, base_delay * multiplier^(attempt - 1))
/// delay  = raw * uniform(1 - jitter_fraction, 1 + jitter_fraction)
/// ```
///
/// A rate-limit error carrying an explicit `Retry-After` raises the delay to
/// at least that value.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of attempts, including the initial attempt (>= 1).
    pub max_attempts: u32,
    /// Base delay for the first retry.
    pub base_delay: Duration,
    /// Delay cap.
    pub max_delay: Duration,
    /// Multiplier applied per attempt (> 1 for exponential growth).
    pub multiplier: f64,
    /// Jitter fraction in `0..=1`; delays are scaled by `1 ± fraction`.
    pub jitter_fraction: f64,
    /// Error kinds eligible for retry.
    pub retryable: Vec<ErrorKind>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay: DEFAULT_BASE_DELAY,
            max_delay: DEFAULT_MAX_DELAY,
            multiplier: DEFAULT_MULTIPLIER,
            jitter_fraction: DEFAULT_JITTER_FRACTION,
            retryable: DEFAULT_RETRYABLE.to_vec(),
        }
    }
}

impl RetryConfig {
    /// Creates a config with a custom attempt count, defaults otherwise.
    #[must_use]
    pub fn with_max_attempts(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            ..Self::default()
        }
    }

    /// Returns whether the given error kind is eligible for retry.
    #[must_use]
    pub fn is_retryable(&self, kind: ErrorKind) -> bool {
        self.retryable.contains(&kind)
    }

    /// Computes the pre-jitter delay for the given failed attempt (1-indexed).
    ///
    /// The result is non-decreasing in `attempt`, bounded by `max_delay`, and
    /// never negative or NaN even for degenerate configs.
    #[must_use]
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        backoff_delay(self.base_delay, self.max_delay, self.multiplier, attempt)
    }

    /// Computes the full delay before re-attempting after `error` failed
    /// attempt number `attempt`: exponential backoff, jittered, with an
    /// explicit Retry-After acting as a floor.
    #[must_use]
    pub fn delay_for(&self, attempt: u32, error: &ConnectorError) -> Duration {
        let jittered = apply_jitter(self.backoff_delay(attempt), self.jitter_fraction);
        match error.retry_after() {
            Some(floor) => jittered.max(floor),
            None => jittered,
        }
    }
}

/// Computes `min(max_delay, base * multiplier^(attempt - 1))`, clamped to a
/// zero floor. Shared with the reconnect state machine's schedule.
#[must_use]
pub fn backoff_delay(
    base_delay: Duration,
    max_delay: Duration,
    multiplier: f64,
    attempt: u32,
) -> Duration {
    let attempt = attempt.max(1);
    let base_ms = base_delay.as_millis() as f64;
    let raw_ms = base_ms * multiplier.powi((attempt - 1) as i32);

    if !raw_ms.is_finite() {
        return max_delay;
    }

    let capped_ms = raw_ms.min(max_delay.as_millis() as f64).max(0.0);
    Duration::from_millis(capped_ms as u64)
}

/// Scales `delay` by a uniformly random factor in
/// `[1 - fraction, 1 + fraction]`. The fraction is clamped to `0..=1` so the
/// result can never go negative.
#[must_use]
pub fn apply_jitter(delay: Duration, fraction: f64) -> Duration {
    let fraction = if fraction.is_finite() {
        fraction.clamp(0.0, 1.0)
    } else {
        0.0
    };
    if fraction == 0.0 {
        return delay;
    }

    let factor = rand::thread_rng().gen_range((1.0 - fraction)..=(1.0 + fraction));
    let jittered_ms = (delay.as_millis() as f64 * factor).max(0.0);
    Duration::from_millis(jittered_ms as u64)
}

/// Executes `op` up to `config.max_attempts` times.
///
/// `op` receives the 1-indexed attempt number. Non-retryable failures and the
/// final failed attempt propagate the original error unchanged.
///
/// # Errors
///
/// Returns the last [`ConnectorError`] produced by `op`.
pub async fn retry<T, F, Fut>(config: &RetryConfig, op: F) -> Result<T, ConnectorError>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, ConnectorError>>,
{
    retry_with(config, op, |_, _| {}).await
}

/// Like [`retry`], but invokes `on_error` for every failed attempt before the
/// retry decision is made. The dispatcher uses this to observe rate-limit
/// errors that the retry loop would otherwise absorb.
///
/// # Errors
///
/// Returns the last [`ConnectorError`] produced by `op`.
pub async fn retry_with<T, F, Fut, O>(
    config: &RetryConfig,
    mut op: F,
    mut on_error: O,
) -> Result<T, ConnectorError>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, ConnectorError>>,
    O: FnMut(&ConnectorError, u32),
{
    let max_attempts = config.max_attempts.max(1);
    let mut attempt = 0u32;

    loop {
        attempt += 1;

        match op(attempt).await {
            Ok(value) => return Ok(value),
            Err(error) => {
                on_error(&error, attempt);

                if !config.is_retryable(error.kind()) {
                    debug!(attempt, error = %error, "failure is not retryable");
                    return Err(error);
                }
                if attempt >= max_attempts {
                    warn!(attempt, max_attempts, error = %error, "retry attempts exhausted");
                    return Err(error);
                }

                let delay = config.delay_for(attempt, &error);
                debug!(
                    attempt,
                    next_attempt = attempt + 1,
                    delay_ms = delay.as_millis(),
                    error = %error,
                    "retrying after backoff"
                );
                tokio::time::sleep(delay).await;
            }
        }
    }
}
