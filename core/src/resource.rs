//! Resource records, quantities and receipts.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Largest integer an `f64` represents exactly (2^53).
const MAX_EXACT_F64: f64 = 9_007_199_254_740_992.0;

/// Relative error allowed between a scaled amount and its whole number of minor units.
const SCALE_TOLERANCE: f64 = 1e-9;

/// Largest decimal scale accepted by [`Quantity::from_decimal`].
pub const MAX_SCALE: u32 = 9;

/// Identifier of a counted resource (an account, an inventory item).
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ResourceId(i64);

impl ResourceId {
    /// Creates a `ResourceId` from its numeric value
    #[must_use]
    pub const fn new(id: i64) -> Self {
        Self(id)
    }

    /// Returns the numeric value
    #[must_use]
    pub const fn as_i64(&self) -> i64 {
        self.0
    }
}

impl From<i64> for ResourceId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for ResourceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A non-negative amount in minor units.
///
/// Inventory counts use scale 0 (one unit is one ticket); currency uses
/// scale 2 (one unit is one cent). Being unsigned, a `Quantity` can never be
/// negative, and subtraction is only exposed as [`Quantity::checked_sub`].
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct Quantity(u64);

impl Quantity {
    /// Zero units
    pub const ZERO: Self = Self(0);

    /// Creates a quantity from minor units
    #[must_use]
    pub const fn new(units: u64) -> Self {
        Self(units)
    }

    /// Returns the amount in minor units
    #[must_use]
    pub const fn units(&self) -> u64 {
        self.0
    }

    /// Checks if this amount is zero
    #[must_use]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// Subtracts `rhs`, returning `None` instead of going below zero.
    #[must_use]
    pub const fn checked_sub(self, rhs: Self) -> Option<Self> {
        match self.0.checked_sub(rhs.0) {
            Some(units) => Some(Self(units)),
            None => None,
        }
    }

    /// Adds `rhs`, returning `None` on overflow.
    #[must_use]
    pub const fn checked_add(self, rhs: Self) -> Option<Self> {
        match self.0.checked_add(rhs.0) {
            Some(units) => Some(Self(units)),
            None => None,
        }
    }

    /// Converts a decimal amount (e.g. `12.34` at scale 2) into minor units.
    ///
    /// Returns `None` when the value is not finite, not strictly positive,
    /// has more decimal places than `scale` (`1.5` at scale 0, `12.345` at
    /// scale 2), exceeds the exactly representable range, or `scale` is
    /// larger than [`MAX_SCALE`]. Amounts are never rounded.
    #[must_use]
    pub fn from_decimal(value: f64, scale: u32) -> Option<Self> {
        if scale > MAX_SCALE || !value.is_finite() || value <= 0.0 {
            return None;
        }

        let factor = 10_f64.powi(i32::try_from(scale).ok()?);
        let exact = value * factor;
        let scaled = exact.round();
        if scaled < 1.0 || scaled > MAX_EXACT_F64 {
            return None;
        }
        // Tolerates binary representation error only (19.99 * 100 = 1998.9999...)
        if (exact - scaled).abs() > scaled * SCALE_TOLERANCE {
            return None;
        }

        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        // Range checked above: 1 <= scaled <= 2^53
        Some(Self(scaled as u64))
    }

    /// Renders the amount as a decimal at the given scale.
    #[must_use]
    #[allow(clippy::cast_precision_loss)] // Display only
    pub fn to_decimal(&self, scale: u32) -> f64 {
        let factor = 10_f64.powi(i32::try_from(scale.min(MAX_SCALE)).unwrap_or(0));
        self.0 as f64 / factor
    }
}

impl std::fmt::Display for Quantity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A counted resource.
///
/// `quantity` is only ever mutated through
/// [`ResourceStore::decrement`](crate::store::ResourceStore::decrement)
/// (and initial seeding).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceRecord {
    /// Record identifier
    pub id: ResourceId,
    /// Human-readable name (username, item name)
    pub name: String,
    /// Remaining quantity in minor units
    pub quantity: Quantity,
}

impl ResourceRecord {
    /// Creates a new record
    #[must_use]
    pub fn new(id: ResourceId, name: impl Into<String>, quantity: Quantity) -> Self {
        Self {
            id,
            name: name.into(),
            quantity,
        }
    }
}

/// Sequence number assigned to a receipt by the store.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ReceiptId(i64);

impl ReceiptId {
    /// Creates a `ReceiptId` from its numeric value
    #[must_use]
    pub const fn new(id: i64) -> Self {
        Self(id)
    }

    /// Returns the numeric value
    #[must_use]
    pub const fn as_i64(&self) -> i64 {
        self.0
    }
}

impl std::fmt::Display for ReceiptId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Immutable record of one applied decrement.
///
/// Written in the same atomic unit as the decrement it documents, so for
/// every resource `initial - quantity == sum(receipt.amount)`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Receipt {
    /// Store-assigned sequence number
    pub id: ReceiptId,
    /// Resource that was decremented
    pub resource_id: ResourceId,
    /// Amount taken (always positive)
    pub amount: Quantity,
    /// When the decrement was applied
    pub timestamp: DateTime<Utc>,
}
