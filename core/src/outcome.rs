//! Transaction outcomes and their caller-visible classification.
//!
//! Every transaction starts `Pending` and ends in exactly one terminal
//! [`TransactionOutcome`]:
//!
//! ```text
//!                 ┌─► InvalidRequest   (before any store access)
//!                 ├─► Applied          (store: condition held)
//!  Pending ───────┼─► Rejected         (store: condition failed / not found)
//!                 └─► Busy             (retry budget exhausted on contention)
//! ```
//!
//! Outcomes are values returned from every layer; the pending state is the
//! engine's in-flight future and has no representation of its own.

use crate::resource::{Quantity, Receipt};
use crate::store::Rejection;

/// Why a request was refused before reaching the store.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum InvalidRequest {
    /// The amount was zero or negative.
    NonPositiveAmount,
    /// The amount could not be represented (not finite, too precise, too large).
    MalformedAmount(String),
}

impl std::fmt::Display for InvalidRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NonPositiveAmount => write!(f, "Amount must be positive"),
            Self::MalformedAmount(reason) => write!(f, "Malformed amount: {reason}"),
        }
    }
}

/// Terminal result of one transaction.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TransactionOutcome {
    /// The decrement was applied.
    Applied {
        /// Quantity left on the resource.
        remaining: Quantity,
        /// Receipt recorded with the decrement.
        receipt: Receipt,
    },

    /// The store authoritatively refused the decrement.
    Rejected(Rejection),

    /// Every attempt met lock contention. Safe for the caller to retry later.
    Busy {
        /// Number of store attempts made before giving up.
        attempts: u32,
    },

    /// The request was malformed and never reached the store.
    InvalidRequest(InvalidRequest),
}

impl TransactionOutcome {
    /// Caller-visible classification of this outcome.
    #[must_use]
    pub const fn disposition(&self) -> Disposition {
        match self {
            Self::Applied { .. } => Disposition::Success,
            Self::Rejected(Rejection::NotFound) => Disposition::NotFound,
            Self::Rejected(Rejection::Insufficient { .. }) => Disposition::InsufficientResource,
            Self::Busy { .. } => Disposition::Busy,
            Self::InvalidRequest(_) => Disposition::InvalidRequest,
        }
    }

    /// Returns `true` if the decrement was applied.
    #[must_use]
    pub const fn is_applied(&self) -> bool {
        matches!(self, Self::Applied { .. })
    }
}

/// Closed set of caller-visible dispositions.
///
/// `Busy` and `InsufficientResource` are deliberately distinct: only the
/// former may be retried by a client.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Disposition {
    /// Decrement applied.
    Success,
    /// No such resource (client fault).
    NotFound,
    /// Not enough quantity (client fault, authoritative).
    InsufficientResource,
    /// Transient contention; the engine already retried internally.
    Busy,
    /// Malformed input (client fault).
    InvalidRequest,
}

impl Disposition {
    /// Whether a client may retry the same request later.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Busy)
    }

    /// Stable label used in logs and metrics.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "applied",
            Self::NotFound => "not_found",
            Self::InsufficientResource => "insufficient",
            Self::Busy => "busy",
            Self::InvalidRequest => "invalid",
        }
    }
}

impl std::fmt::Display for Disposition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
