//! Bounded retry with exponential backoff for lock contention.
//!
//! Only a [`Attempt::Contended`] result is retried. A settled result (applied
//! or rejected) and an operation error both return on first occurrence.
//!
//! # Example
//!
//! ```rust
//! use tally_runtime::retry::{Attempt, RetryOutcome, RetryPolicy, retry_on_contention};
//! use std::time::Duration;
//!
//! # async fn example() -> Result<(), String> {
//! let policy = RetryPolicy::builder()
//!     .max_attempts(3)
//!     .initial_delay(Duration::from_millis(50))
//!     .build();
//!
//! let outcome = retry_on_contention(&policy, |_attempt| async {
//!     Ok::<_, String>(Attempt::Settled(42))
//! })
//! .await?;
//!
//! assert_eq!(outcome, RetryOutcome::Settled { value: 42, attempts: 1 });
//! # Ok(())
//! # }
//! ```

use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;

/// Retry policy configuration for exponential backoff.
///
/// # Default Values
///
/// - `max_attempts`: 3 (total calls, including the first)
/// - `initial_delay`: 50ms
/// - `max_delay`: 1 second
/// - `multiplier`: 2.0 (delay doubles each retry)
/// - `jitter`: off
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total number of attempts, including the first (at least 1)
    pub max_attempts: u32,
    /// Delay after the first contended attempt
    pub initial_delay: Duration,
    /// Maximum delay between attempts (cap for exponential backoff)
    pub max_delay: Duration,
    /// Multiplier for exponential backoff
    pub multiplier: f64,
    /// Randomize each delay within `[delay / 2, delay]`
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(50),
            max_delay: Duration::from_secs(1),
            multiplier: 2.0,
            jitter: false,
        }
    }
}

impl RetryPolicy {
    /// Create a new policy builder.
    #[must_use]
    pub const fn builder() -> RetryPolicyBuilder {
        RetryPolicyBuilder {
            max_attempts: None,
            initial_delay: None,
            max_delay: None,
            multiplier: None,
            jitter: None,
        }
    }

    /// Deterministic delay after the contended attempt with index `attempt`.
    ///
    /// `delay = initial_delay * multiplier^attempt`, capped at `max_delay`.
    #[must_use]
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return self.initial_delay.min(self.max_delay);
        }

        #[allow(clippy::cast_precision_loss)] // Delays are far below 2^52 ms
        let delay_ms = self.initial_delay.as_millis() as f64
            * self.multiplier.powi(i32::try_from(attempt).unwrap_or(i32::MAX));

        if !delay_ms.is_finite() {
            return self.max_delay;
        }

        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let delay = Duration::from_millis(delay_ms.max(0.0) as u64);

        delay.min(self.max_delay)
    }

    /// Delay actually slept after attempt `attempt`, with jitter applied if enabled.
    #[must_use]
    pub fn backoff(&self, attempt: u32) -> Duration {
        let delay = self.delay_for_attempt(attempt);
        if !self.jitter || delay.is_zero() {
            return delay;
        }

        let ceiling = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
        let floor = ceiling / 2;
        Duration::from_millis(rand::thread_rng().gen_range(floor..=ceiling))
    }

    /// Upper bound on the total time spent sleeping between attempts.
    #[must_use]
    pub fn total_backoff(&self) -> Duration {
        (0..self.max_attempts.saturating_sub(1))
            .map(|attempt| self.delay_for_attempt(attempt))
            .sum()
    }
}

/// Builder for [`RetryPolicy`].
#[derive(Debug, Clone)]
pub struct RetryPolicyBuilder {
    max_attempts: Option<u32>,
    initial_delay: Option<Duration>,
    max_delay: Option<Duration>,
    multiplier: Option<f64>,
    jitter: Option<bool>,
}

impl RetryPolicyBuilder {
    /// Set total number of attempts (values below 1 are raised to 1).
    #[must_use]
    pub const fn max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = Some(max_attempts);
        self
    }

    /// Set delay after the first contended attempt.
    #[must_use]
    pub const fn initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = Some(delay);
        self
    }

    /// Set maximum delay (cap for exponential backoff).
    #[must_use]
    pub const fn max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = Some(delay);
        self
    }

    /// Set multiplier for exponential backoff.
    #[must_use]
    pub const fn multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = Some(multiplier);
        self
    }

    /// Enable or disable jitter.
    #[must_use]
    pub const fn jitter(mut self, jitter: bool) -> Self {
        self.jitter = Some(jitter);
        self
    }

    /// Build the [`RetryPolicy`].
    #[must_use]
    pub fn build(self) -> RetryPolicy {
        let defaults = RetryPolicy::default();
        RetryPolicy {
            max_attempts: self.max_attempts.unwrap_or(defaults.max_attempts).max(1),
            initial_delay: self.initial_delay.unwrap_or(defaults.initial_delay),
            max_delay: self.max_delay.unwrap_or(defaults.max_delay),
            multiplier: self.multiplier.unwrap_or(defaults.multiplier),
            jitter: self.jitter.unwrap_or(defaults.jitter),
        }
    }
}

/// Result of a single attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Attempt<T> {
    /// The operation reached an authoritative answer. Never retried.
    Settled(T),
    /// The operation could not run because of contention. Retried while budget remains.
    Contended,
}

/// Terminal result of [`retry_on_contention`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryOutcome<T> {
    /// An attempt settled.
    Settled {
        /// The settled value.
        value: T,
        /// Attempts made, including the settling one.
        attempts: u32,
    },
    /// Every attempt was contended.
    Exhausted {
        /// Attempts made.
        attempts: u32,
    },
}

/// Run `operation` until it settles or the policy's attempts are used up.
///
/// `operation` receives the zero-based attempt index. After a contended
/// attempt with index `i` the task sleeps [`RetryPolicy::backoff`]`(i)` on the
/// async timer, so other tasks keep running.
///
/// # Errors
///
/// An `Err` from `operation` is returned immediately without retrying.
pub async fn retry_on_contention<F, Fut, T, E>(
    policy: &RetryPolicy,
    mut operation: F,
) -> Result<RetryOutcome<T>, E>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<Attempt<T>, E>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 0;

    loop {
        match operation(attempt).await? {
            Attempt::Settled(value) => {
                if attempt > 0 {
                    tracing::info!(attempt, "Operation settled after contention retry");
                }
                return Ok(RetryOutcome::Settled {
                    value,
                    attempts: attempt + 1,
                });
            }
            Attempt::Contended => {
                if attempt + 1 >= max_attempts {
                    tracing::error!(
                        attempts = attempt + 1,
                        "Contention persisted after max attempts"
                    );
                    return Ok(RetryOutcome::Exhausted {
                        attempts: attempt + 1,
                    });
                }

                let delay = policy.backoff(attempt);
                tracing::warn!(
                    attempt,
                    delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                    "Contention detected, retrying..."
                );
                metrics::counter!("tally_contention_retries_total").increment(1);

                sleep(delay).await;
                attempt += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn test_retry_policy_delay_calculation() {
        let policy = RetryPolicy::builder()
            .initial_delay(Duration::from_millis(50))
            .multiplier(2.0)
            .max_delay(Duration::from_secs(10))
            .build();

        assert_eq!(policy.delay_for_attempt(0), Duration::from_millis(50));
        assert_eq!(policy.delay_for_attempt(1), Duration::from_millis(100));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_millis(200));
        assert_eq!(policy.delay_for_attempt(3), Duration::from_millis(400));
    }

    #[test]
    fn test_retry_policy_max_delay_cap() {
        let policy = RetryPolicy::builder()
            .initial_delay(Duration::from_millis(1000))
            .multiplier(10.0)
            .max_delay(Duration::from_secs(2))
            .build();

        assert_eq!(policy.delay_for_attempt(5), Duration::from_secs(2));
        assert_eq!(policy.delay_for_attempt(10_000), Duration::from_secs(2));
    }

    #[test]
    fn test_builder_clamps_attempts() {
        let policy = RetryPolicy::builder().max_attempts(0).build();
        assert_eq!(policy.max_attempts, 1);
        assert_eq!(policy.total_backoff(), Duration::ZERO);
    }

    #[test]
    fn test_total_backoff_default() {
        // 3 attempts: sleeps of 50ms and 100ms
        assert_eq!(
            RetryPolicy::default().total_backoff(),
            Duration::from_millis(150)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_settles_on_first_try() {
        let counter = Arc::new(AtomicU32::new(0));

        let result = retry_on_contention(&RetryPolicy::default(), |_| {
            let c = Arc::clone(&counter);
            async move {
                c.fetch_add(1, Ordering::SeqCst);
                Ok::<_, String>(Attempt::Settled(42))
            }
        })
        .await;

        assert_eq!(
            result,
            Ok(RetryOutcome::Settled {
                value: 42,
                attempts: 1
            })
        );
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_settles_after_contention_with_backoff() {
        let policy = RetryPolicy::builder()
            .max_attempts(3)
            .initial_delay(Duration::from_millis(50))
            .build();
        let start = tokio::time::Instant::now();

        let result = retry_on_contention(&policy, |attempt| async move {
            if attempt < 2 {
                Ok::<_, String>(Attempt::Contended)
            } else {
                Ok(Attempt::Settled("done"))
            }
        })
        .await;

        assert_eq!(
            result,
            Ok(RetryOutcome::Settled {
                value: "done",
                attempts: 3
            })
        );
        // 50ms + 100ms of backoff
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(150));
        assert!(elapsed < Duration::from_millis(160), "unexpected backoff: {elapsed:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausts_attempts() {
        let counter = Arc::new(AtomicU32::new(0));

        let result = retry_on_contention(&RetryPolicy::default(), |_| {
            let c = Arc::clone(&counter);
            async move {
                c.fetch_add(1, Ordering::SeqCst);
                Ok::<Attempt<()>, String>(Attempt::Contended)
            }
        })
        .await;

        assert_eq!(result, Ok(RetryOutcome::Exhausted { attempts: 3 }));
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_errors_are_not_retried() {
        let counter = Arc::new(AtomicU32::new(0));

        let result = retry_on_contention(&RetryPolicy::default(), |_| {
            let c = Arc::clone(&counter);
            async move {
                c.fetch_add(1, Ordering::SeqCst);
                Err::<Attempt<()>, _>("connection reset")
            }
        })
        .await;

        assert_eq!(result, Err("connection reset"));
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    proptest! {
        #[test]
        fn prop_backoff_is_monotonic_and_capped(
            initial_ms in 1_u64..500,
            cap_ms in 1_u64..5_000,
            attempt in 0_u32..20,
        ) {
            let policy = RetryPolicy::builder()
                .initial_delay(Duration::from_millis(initial_ms))
                .max_delay(Duration::from_millis(cap_ms))
                .build();

            let here = policy.delay_for_attempt(attempt);
            let next = policy.delay_for_attempt(attempt + 1);
            prop_assert!(here <= next);
            prop_assert!(next <= Duration::from_millis(cap_ms));
        }

        #[test]
        fn prop_jitter_stays_within_half_to_full(attempt in 0_u32..8) {
            let policy = RetryPolicy::builder().jitter(true).build();
            let delay = policy.delay_for_attempt(attempt);
            let jittered = policy.backoff(attempt);
            prop_assert!(jittered <= delay);
            prop_assert!(jittered >= delay / 2);
        }
    }
}
