//! # Tally Core
//!
//! Core traits and types for transactions against a contended, counted resource.
//!
//! A counted resource is a single non-negative quantity (an account balance, a
//! ticket stock) that many concurrent callers race to decrement. This crate
//! defines the vocabulary every other crate in the workspace speaks:
//!
//! - **Resource records**: [`ResourceRecord`], identified by [`ResourceId`], holding a [`Quantity`]
//! - **Receipts**: [`Receipt`], the immutable proof that one decrement was applied
//! - **Resource store**: [`ResourceStore`], the single conditional-decrement primitive
//! - **Outcomes**: [`TransactionOutcome`] and the caller-facing [`Disposition`]
//! - **Environment**: injectable [`Clock`](environment::Clock) and
//!   [`Upstream`](environment::Upstream) dependencies
//!
//! ## Architecture
//!
//! ```text
//! caller ──► TransactionEngine (tally-runtime)
//!              │  validate ─► InvalidRequest
//!              │  Upstream::call()        (suspends, holds no lock)
//!              │  retry_on_contention ──► ResourceStore::decrement
//!              │                             Applied | Rejected | ContentionBlocked
//!              ▼
//!            TransactionOutcome ─► Disposition ─► HTTP status (tally-web)
//! ```
//!
//! Nothing in this crate performs I/O. Storage backends live in `tally-postgres`
//! (production) and `tally-testing` (in-memory).

pub mod environment;
pub mod outcome;
pub mod resource;
pub mod store;

// Re-export commonly used types
pub use chrono::{DateTime, Utc};
pub use outcome::{Disposition, InvalidRequest, TransactionOutcome};
pub use resource::{Quantity, Receipt, ReceiptId, ResourceId, ResourceRecord};
pub use store::{DecrementOutcome, Rejection, ResourceStore, SeedMode, StoreError, StoreFuture};
