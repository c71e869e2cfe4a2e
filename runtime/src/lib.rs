//! # Tally Runtime
//!
//! Runtime for transactions against contended counted resources.
//!
//! - [`TransactionEngine`]: validate → upstream call → conditional decrement
//!   with contention retry → classified [`TransactionOutcome`](tally_core::TransactionOutcome)
//! - [`retry`]: bounded exponential backoff that only retries contention
//! - [`metrics`]: Prometheus exporter and metric descriptions
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use tally_core::{Quantity, ResourceId};
//! use tally_runtime::{RetryPolicy, TransactionEngine};
//!
//! let engine = TransactionEngine::new(Arc::new(store))
//!     .with_retry_policy(RetryPolicy::builder().max_attempts(3).build());
//!
//! let outcome = engine.execute(ResourceId::new(1), Quantity::new(1)).await?;
//! println!("{}", outcome.disposition());
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod engine;
pub mod metrics;
pub mod retry;

pub use engine::{EngineError, TransactionEngine};
pub use retry::{Attempt, RetryOutcome, RetryPolicy, RetryPolicyBuilder, retry_on_contention};
