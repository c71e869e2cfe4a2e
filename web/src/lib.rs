//! Axum integration for the Tally transaction engine.
//!
//! The engine knows nothing about HTTP. This crate is the thin shell around
//! it: it parses requests, invokes [`TransactionEngine`](tally_runtime::TransactionEngine)
//! and maps each [`TransactionOutcome`](tally_core::TransactionOutcome) to a
//! status code.
//!
//! # Request Flow
//!
//! 1. **Request id** assigned by [`middleware::request_id_layer`]
//! 2. **Parse** the JSON body; malformed input is a 400 before the engine runs
//! 3. **Execute** through the engine (upstream call, decrement, retry)
//! 4. **Map** the outcome through the deployment's [`Profile`]
//!
//! # Example
//!
//! ```ignore
//! use tally_web::{AppState, Profile, router};
//!
//! let app = router(AppState::new(engine, Profile::Ledger));
//! let listener = tokio::net::TcpListener::bind("0.0.0.0:8000").await?;
//! tally_web::server::serve(listener, app, Duration::from_secs(30)).await?;
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod error;
pub mod handlers;
pub mod middleware;
pub mod profile;
pub mod routes;
pub mod server;
pub mod state;

// Re-export key types for convenience
pub use error::AppError;
pub use middleware::{REQUEST_ID_HEADER, RequestId, request_id_layer};
pub use profile::{Amount, Profile};
pub use routes::{api_routes, router, with_request_tracing};
pub use state::AppState;

/// Result type alias for web handlers.
pub type WebResult<T> = Result<T, AppError>;
