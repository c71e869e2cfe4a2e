//! Application state for Axum handlers.

use crate::profile::Profile;
use tally_runtime::TransactionEngine;

/// Application state shared across all HTTP handlers.
///
/// Cloning is cheap: the engine shares its store and upstream handles.
///
/// # Examples
///
/// ```ignore
/// let engine = TransactionEngine::new(Arc::new(store));
/// let app = tally_web::router(AppState::new(engine, Profile::Ledger));
/// ```
#[derive(Clone, Debug)]
pub struct AppState {
    /// Engine executing every transaction
    pub engine: TransactionEngine,
    /// Presentation of amounts and refusals
    pub profile: Profile,
}

impl AppState {
    /// Create a new application state.
    #[must_use]
    pub fn new(engine: TransactionEngine, profile: Profile) -> Self {
        Self { engine, profile }
    }
}
