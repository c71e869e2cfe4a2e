//! Resource store trait and the conditional-decrement contract.
//!
//! The store is the only component allowed to mutate a resource's quantity,
//! and it does so through exactly one primitive: [`ResourceStore::decrement`].
//!
//! # Contract
//!
//! `decrement(id, amount)` atomically checks `quantity >= amount` and, when it
//! holds, subtracts `amount` and writes a [`Receipt`] in the same atomic unit.
//! It reports one of three outcomes:
//!
//! - [`DecrementOutcome::Applied`]: the condition held, the quantity was
//!   reduced and exactly one receipt was written
//! - [`DecrementOutcome::Rejected`]: the condition failed (or the record does
//!   not exist); nothing was written
//! - [`DecrementOutcome::ContentionBlocked`]: exclusive access to the record
//!   could not be obtained within the store's own short wait; the condition
//!   was never evaluated and nothing was written
//!
//! `ContentionBlocked` means "could not even test the condition", which is
//! why it is the only outcome a caller may retry without risk of a double
//! decrement.
//!
//! # Cancellation
//!
//! Implementations must make dropping the returned future safe at every await
//! point: either nothing has been written yet, or the decrement and its
//! receipt have already been committed together.
//!
//! # Implementations
//!
//! - `PostgresResourceStore` (in `tally-postgres`): production implementation
//! - `InMemoryResourceStore` (in `tally-testing`): per-record locking for tests

use crate::resource::{Quantity, Receipt, ResourceId, ResourceRecord};
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

/// Boxed future returned by [`ResourceStore`] methods.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, StoreError>> + Send + 'a>>;

/// Result of a single conditional-decrement attempt.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DecrementOutcome {
    /// The decrement was applied and its receipt recorded.
    Applied {
        /// Quantity left after the decrement.
        remaining: Quantity,
        /// Receipt written in the same atomic unit.
        receipt: Receipt,
    },

    /// The condition was evaluated and failed. Authoritative, never retried.
    Rejected(Rejection),

    /// Exclusive access could not be obtained; the condition was not evaluated.
    ContentionBlocked,
}

/// Why a decrement was authoritatively refused.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Rejection {
    /// No record with the requested id exists.
    NotFound,
    /// The record holds less than the requested amount.
    Insufficient {
        /// Quantity the record held when the condition was evaluated.
        available: Quantity,
    },
}

impl std::fmt::Display for Rejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotFound => write!(f, "resource not found"),
            Self::Insufficient { available } => {
                write!(f, "insufficient quantity (available: {available})")
            },
        }
    }
}

/// How [`ResourceStore::seed`] treats records that already exist.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum SeedMode {
    /// Insert missing records, leave existing quantities untouched.
    #[default]
    InsertMissing,
    /// Insert missing records and force existing ones back to the seeded quantity.
    Reset,
}

/// Storage failures unrelated to lock contention.
///
/// These are never retried by the engine; they surface as an internal error.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Database connection or query failed.
    #[error("Database error: {0}")]
    Database(String),

    /// A stored value violates an invariant (e.g. a negative quantity column).
    #[error("Corrupt record: {0}")]
    Corrupt(String),
}

/// Storage abstraction for counted resources and their receipts.
///
/// # Thread Safety
///
/// Implementations must be `Send + Sync`; one handle is shared by every
/// concurrent request.
///
/// # Dyn Compatibility
///
/// Methods return [`StoreFuture`] instead of using `async fn` so the engine
/// can hold an `Arc<dyn ResourceStore>` and tests can swap implementations.
pub trait ResourceStore: Send + Sync {
    /// Conditionally decrement `id` by `amount`, recording a receipt when applied.
    ///
    /// `amount` must be non-zero; callers validate this before reaching the store.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] only for failures that are neither a rejection nor
    /// contention (connection loss, corrupt rows).
    fn decrement(&self, id: ResourceId, amount: Quantity) -> StoreFuture<'_, DecrementOutcome>;

    /// Load a record by id.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the read fails.
    fn get(&self, id: ResourceId) -> StoreFuture<'_, Option<ResourceRecord>>;

    /// Load all receipts for a resource, oldest first.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the read fails.
    fn receipts(&self, id: ResourceId) -> StoreFuture<'_, Vec<Receipt>>;

    /// Populate initial records. Idempotent for [`SeedMode::InsertMissing`].
    ///
    /// Returns the number of records inserted or reset.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the write fails.
    fn seed(&self, records: Vec<ResourceRecord>, mode: SeedMode) -> StoreFuture<'_, usize>;
}
