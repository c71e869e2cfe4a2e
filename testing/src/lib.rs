//! # Tally Testing
//!
//! Testing utilities for code built on `tally-core`.
//!
//! This crate provides:
//! - Deterministic environment doubles ([`FixedClock`], [`NoLatency`])
//! - [`InMemoryResourceStore`]: a real [`ResourceStore`](tally_core::ResourceStore)
//!   with per-record exclusive locks and a bounded lock wait
//! - [`ScriptedStore`]: a wrapper that injects contention or failures
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use tally_testing::InMemoryResourceStore;
//!
//! #[tokio::test]
//! async fn test_purchase() {
//!     let store = Arc::new(InMemoryResourceStore::new());
//!     store.seed(vec![record], SeedMode::Reset).await?;
//!
//!     let engine = TransactionEngine::new(store.clone());
//!     let outcome = engine.execute(ResourceId::new(1), Quantity::new(1)).await?;
//!     assert!(outcome.is_applied());
//! }
//! ```

use chrono::{DateTime, Utc};
use tally_core::environment::{Clock, Upstream};

pub mod store;

/// Mock implementations of environment traits.
pub mod mocks {
    use super::{Clock, DateTime, Upstream, Utc};
    use std::future::Future;
    use std::pin::Pin;

    /// Fixed clock for deterministic tests
    ///
    /// Always returns the same time, making receipt timestamps reproducible.
    ///
    /// # Example
    ///
    /// ```
    /// use tally_testing::mocks::FixedClock;
    /// use tally_core::environment::Clock;
    /// use chrono::Utc;
    ///
    /// let clock = FixedClock::new(Utc::now());
    /// assert_eq!(clock.now(), clock.now());
    /// ```
    #[derive(Debug, Clone)]
    pub struct FixedClock {
        time: DateTime<Utc>,
    }

    impl FixedClock {
        /// Create a new fixed clock with the given time
        #[must_use]
        pub const fn new(time: DateTime<Utc>) -> Self {
            Self { time }
        }
    }

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            self.time
        }
    }

    /// Create a default fixed clock for tests (2025-01-01 00:00:00 UTC)
    ///
    /// # Panics
    ///
    /// This function will panic if the hardcoded timestamp fails to parse,
    /// which should never happen in practice.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn test_clock() -> FixedClock {
        FixedClock::new(
            DateTime::parse_from_rfc3339("2025-01-01T00:00:00Z")
                .expect("hardcoded timestamp should always parse")
                .with_timezone(&Utc),
        )
    }

    /// Upstream that answers immediately without touching the timer.
    #[derive(Debug, Clone, Copy, Default)]
    pub struct NoLatency;

    impl Upstream for NoLatency {
        fn call(&self) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
            Box::pin(std::future::ready(()))
        }
    }
}

// Re-export commonly used items
pub use mocks::{FixedClock, NoLatency, test_clock};
pub use store::{InMemoryResourceStore, RecordLock, ScriptedStore};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_clock() {
        let clock = test_clock();
        let time1 = clock.now();
        let time2 = clock.now();
        assert_eq!(time1, time2);
        assert_eq!(time1.to_rfc3339(), "2025-01-01T00:00:00+00:00");
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_latency_does_not_advance_time() {
        let start = tokio::time::Instant::now();
        NoLatency.call().await;
        assert_eq!(start.elapsed(), std::time::Duration::ZERO);
    }
}
