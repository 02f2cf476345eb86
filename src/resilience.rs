//! Resilience utilities: bounded retry with backoff and the asset upload
//! throttle.
//!
//! Two independent mechanisms:
//!
//! - [`retry_api_call`]: exponential backoff for transient failures (429,
//!   network). An explicit bounded loop rather than recursion, so stack
//!   depth and attempt accounting stay obvious.
//! - [`UploadThrottle`]: a token bucket that inserts a fixed gap before
//!   each asset upload, independent of the backoff path. Uploads are the
//!   slowest calls the engine makes and the target rate-limits them
//!   aggressively.
//!
//! # Example
//!
//! ```rust,no_run
//! # async fn example() -> collection_sync::error::Result<()> {
//! use collection_sync::resilience::{retry_api_call, RetryConfig};
//!
//! let config = RetryConfig::default();
//! let value = retry_api_call(&config, "list_items", || async {
//!     // issue the call...
//!     Ok::<_, collection_sync::error::SyncError>(42)
//! })
//! .await?;
//! # Ok(())
//! # }
//! ```

use crate::error::{Result, SyncError};
use governor::{
    clock::DefaultClock,
    middleware::NoOpMiddleware,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter,
};
use std::future::Future;
use std::num::NonZeroU32;
use std::time::Duration;
use tracing::{debug, warn};

/// Configuration for API call retry behavior.
///
/// Defaults match the target API's documented expectations: base delay of
/// one second, doubling per attempt, at most three retries.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of retries after the initial attempt.
    pub max_retries: usize,

    /// Delay before the first retry.
    pub initial_delay: Duration,

    /// Ceiling for the exponential backoff.
    pub max_delay: Duration,

    /// Backoff multiplier (2.0 = double each retry).
    pub backoff_factor: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            backoff_factor: 2.0,
        }
    }
}

impl RetryConfig {
    /// Fast-fail retry for tests.
    pub fn testing() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_millis(10),
            max_delay: Duration::from_millis(100),
            backoff_factor: 2.0,
        }
    }

    /// Calculate the delay before a given retry (1-indexed).
    pub fn delay_for_attempt(&self, attempt: usize) -> Duration {
        if attempt <= 1 {
            return self.initial_delay;
        }
        let multiplier = self.backoff_factor.powi((attempt - 1) as i32);
        let delay = Duration::from_secs_f64(self.initial_delay.as_secs_f64() * multiplier);
        std::cmp::min(delay, self.max_delay)
    }
}

/// Run an API call, retrying transient failures with exponential backoff.
///
/// Retryable errors ([`SyncError::is_retryable`]) are retried up to
/// `max_retries` times; the last error is surfaced once retries exhaust.
/// Non-retryable errors are surfaced immediately.
pub async fn retry_api_call<T, F, Fut>(
    config: &RetryConfig,
    operation: &str,
    mut call: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 0usize;
    loop {
        attempt += 1;
        match call().await {
            Ok(value) => {
                if attempt > 1 {
                    debug!(operation, attempt, "call succeeded after retry");
                }
                return Ok(value);
            }
            Err(e) if e.is_retryable() && attempt <= config.max_retries => {
                let delay = config.delay_for_attempt(attempt);
                warn!(
                    operation,
                    attempt,
                    max_retries = config.max_retries,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "transient failure, backing off"
                );
                crate::metrics::record_api_retry(operation);
                tokio::time::sleep(delay).await;
            }
            Err(e) => {
                if e.is_retryable() {
                    warn!(operation, attempt, "retries exhausted");
                }
                return Err(e);
            }
        }
    }
}

/// Fixed-interval throttle applied before each asset upload.
///
/// Token bucket with a burst of one: the first acquire is free, every
/// subsequent acquire waits out the configured gap.
pub struct UploadThrottle {
    limiter: Option<RateLimiter<NotKeyed, InMemoryState, DefaultClock, NoOpMiddleware>>,
}

impl UploadThrottle {
    /// Create a throttle with the given minimum gap between uploads.
    /// A zero gap disables throttling (used in tests).
    pub fn new(gap: Duration) -> Self {
        if gap.is_zero() {
            return Self { limiter: None };
        }
        // One token per gap, no burst beyond a single token.
        let quota = Quota::with_period(gap)
            .unwrap_or_else(|| Quota::per_second(NonZeroU32::MIN))
            .allow_burst(NonZeroU32::MIN);
        Self {
            limiter: Some(RateLimiter::direct(quota)),
        }
    }

    /// Create from a millisecond gap as carried in [`crate::config::SyncLimits`].
    pub fn from_millis(gap_ms: u64) -> Self {
        Self::new(Duration::from_millis(gap_ms))
    }

    /// Wait until an upload may proceed.
    pub async fn acquire(&self) {
        if let Some(ref limiter) = self.limiter {
            limiter.until_ready().await;
        }
    }
}
