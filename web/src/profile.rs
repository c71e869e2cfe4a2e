//! Domain framing of the shared transaction contract.
//!
//! The engine produces the same outcomes for a balance ledger and for a
//! ticket inventory. The profile decides how those outcomes are presented:
//! the decimal scale of amounts, the name of the remaining-quantity field, and
//! whether running out is a 400 ("insufficient funds") or a 410 ("sold out").

use crate::error::AppError;
use serde::Serialize;
use tally_core::{Quantity, ResourceId};

/// How quantities and refusals are presented for one deployment.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Profile {
    /// Account balances in cents; insufficient funds is a 400.
    Ledger,
    /// Whole-unit stock; selling out is a 410.
    Inventory,
}

impl Profile {
    /// Decimal places of request and response amounts.
    #[must_use]
    pub const fn scale(self) -> u32 {
        match self {
            Self::Ledger => 2,
            Self::Inventory => 0,
        }
    }

    /// Noun used in not-found messages.
    #[must_use]
    pub const fn resource_label(self) -> &'static str {
        match self {
            Self::Ledger => "User",
            Self::Inventory => "Item",
        }
    }

    /// Render a quantity for a response body.
    #[must_use]
    pub fn amount(self, quantity: Quantity) -> Amount {
        match self {
            Self::Ledger => Amount::Decimal(quantity.to_decimal(self.scale())),
            Self::Inventory => Amount::Units(quantity.units()),
        }
    }

    /// Error for a resource that does not exist.
    #[must_use]
    pub fn not_found(self, id: ResourceId) -> AppError {
        AppError::not_found(self.resource_label(), id)
    }

    /// Error for a resource holding less than the requested amount.
    #[must_use]
    pub fn insufficient(self) -> AppError {
        match self {
            Self::Ledger => AppError::insufficient("Insufficient funds"),
            Self::Inventory => AppError::gone("Item sold out"),
        }
    }
}

/// A quantity as it appears in JSON: an integer count or a decimal.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Amount {
    /// Whole units
    Units(u64),
    /// Decimal at the profile's scale
    Decimal(f64),
}
