//! `PostgreSQL` resource store for Tally.
//!
//! This crate provides the production [`ResourceStore`](tally_core::ResourceStore)
//! backed by `PostgreSQL` through sqlx:
//!
//! - Conditional decrement and receipt insert in one SQL transaction
//! - Row-lock waits bounded by a transaction-local `lock_timeout`; a timed-out
//!   wait is reported as contention rather than an error
//! - Idempotent seeding and embedded migrations
//!
//! # Example
//!
//! ```ignore
//! use tally_postgres::PostgresResourceStore;
//!
//! async fn example() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = PostgresResourceStore::connect("postgres://localhost/tally").await?;
//!     store.migrate().await?;
//!     Ok(())
//! }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod store;

pub use store::{DEFAULT_LOCK_TIMEOUT, PostgresResourceStore};
