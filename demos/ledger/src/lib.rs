//! Balance ledger service.
//!
//! Accounts hold balances in cents. `POST /transaction` debits an account
//! through the shared transaction engine; an overdraft is refused with
//! `400 Insufficient funds` and never applied, however many debits race.
//!
//! The service seeds four demo accounts on start without touching balances
//! that already exist, so restarts keep the ledger intact.

pub mod config;

use tally_core::{Quantity, ResourceId, ResourceRecord};

/// Demo accounts: `(id, username, balance in cents)`.
pub const SEED_ACCOUNTS: [(i64, &str, u64); 4] = [
    (1, "alice", 10_000),
    (2, "bob", 5_000),
    (3, "admin", 999_900),
    (4, "charlie", 1_000),
];

/// Records for [`SEED_ACCOUNTS`].
#[must_use]
pub fn seed_accounts() -> Vec<ResourceRecord> {
    SEED_ACCOUNTS
        .iter()
        .map(|&(id, name, cents)| {
            ResourceRecord::new(ResourceId::new(id), name, Quantity::new(cents))
        })
        .collect()
}
