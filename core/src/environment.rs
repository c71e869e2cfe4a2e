//! Environment traits - injected dependencies.
//!
//! External effects the engine depends on are abstracted behind traits so
//! tests can replace them with deterministic versions.

use chrono::{DateTime, Utc};
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

/// Clock trait - abstracts time operations for testability
///
/// # Examples
///
/// ```ignore
/// // Test - fixed time for deterministic tests
/// struct FixedClock { time: DateTime<Utc> }
/// impl Clock for FixedClock {
///     fn now(&self) -> DateTime<Utc> {
///         self.time
///     }
/// }
/// ```
pub trait Clock: Send + Sync {
    /// Get the current time
    fn now(&self) -> DateTime<Utc>;
}

/// Production clock backed by the system time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A call to an external dependency made before each decrement.
///
/// Implementations must suspend only the calling task: the engine holds no
/// store lock while awaiting it, so concurrent transactions overlap in wall
/// clock time rather than queueing behind each other.
pub trait Upstream: Send + Sync {
    /// Perform the upstream call.
    fn call(&self) -> Pin<Box<dyn Future<Output = ()> + Send + '_>>;
}

/// Upstream stand-in that waits a fixed latency on the async timer.
#[derive(Debug, Clone, Copy)]
pub struct SimulatedUpstream {
    latency: Duration,
}

impl SimulatedUpstream {
    /// Create an upstream that takes `latency` to answer.
    #[must_use]
    pub const fn new(latency: Duration) -> Self {
        Self { latency }
    }

    /// The configured latency.
    #[must_use]
    pub const fn latency(&self) -> Duration {
        self.latency
    }
}

impl Upstream for SimulatedUpstream {
    fn call(&self) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
        let latency = self.latency;
        Box::pin(async move {
            if !latency.is_zero() {
                tokio::time::sleep(latency).await;
            }
        })
    }
}
