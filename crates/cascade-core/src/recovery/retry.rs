//! Bounded retry for file operations that can hit transient locks
//!
//! Settings files are shared with other processes (installers, editors, a
//! second instance of the application). A write can fail for a few
//! milliseconds while another handle is open, so file operations are retried
//! for a short wall-clock budget instead of failing on the first attempt.

use crate::error::{CascadeResult, UnifiedError};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

/// Wall-clock retry policy for file operations
///
/// # Example
/// ```
/// use cascade_core::recovery::RetryPolicy;
/// use std::time::Duration;
///
/// let policy = RetryPolicy::default().with_budget(Duration::from_millis(250));
/// assert_eq!(policy.budget, Duration::from_millis(250));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total time to keep retrying, measured from the first attempt
    #[serde(with = "humantime_serde")]
    pub budget: Duration,
    /// Pause between attempts
    #[serde(with = "humantime_serde")]
    pub interval: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            budget: Duration::from_millis(100),
            interval: Duration::from_millis(10),
        }
    }
}

impl RetryPolicy {
    /// Create a policy with the given budget and interval
    pub const fn new(budget: Duration, interval: Duration) -> Self {
        Self { budget, interval }
    }

    /// A policy that makes exactly one attempt
    pub const fn no_retry() -> Self {
        Self {
            budget: Duration::ZERO,
            interval: Duration::ZERO,
        }
    }

    /// Set the total budget
    pub fn with_budget(mut self, budget: Duration) -> Self {
        self.budget = budget;
        self
    }

    /// Set the pause between attempts
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }
}

/// Run `operation` until it succeeds, fails with a non-retryable error, or the
/// policy's budget is spent. The last error is returned.
pub fn retry_for<T, F>(policy: &RetryPolicy, mut operation: F) -> CascadeResult<T>
where
    F: FnMut() -> CascadeResult<T>,
{
    let started = Instant::now();
    let mut attempt: u32 = 1;

    loop {
        match operation() {
            Ok(value) => {
                if attempt > 1 {
                    tracing::debug!(attempt, "file operation succeeded after retry");
                }
                return Ok(value);
            }
            Err(err) => {
                let elapsed = started.elapsed();
                if !err.is_retryable() || elapsed + policy.interval > policy.budget {
                    if err.is_retryable() {
                        tracing::warn!(
                            attempt,
                            elapsed_ms = elapsed.as_millis() as u64,
                            "giving up on file operation: {}",
                            err
                        );
                    }
                    return Err(err);
                }

                tracing::debug!(attempt, "retrying file operation: {}", err);
                if !policy.interval.is_zero() {
                    std::thread::sleep(policy.interval);
                }
                attempt += 1;
            }
        }
    }
}
