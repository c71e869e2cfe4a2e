//! HTTP request handlers.

pub mod health;
pub mod resource;
pub mod transaction;

// Re-export common handler utilities
pub use health::{health_check, readiness};
pub use resource::{ResourceResponse, get_resource, load_resource};
pub use transaction::{TransactionRequest, TransactionResponse, applied, post_transaction};
