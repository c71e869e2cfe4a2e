//! Ticket inventory service.
//!
//! A single item is on sale with a fixed stock. Many buyers race on
//! `POST /buy_ticket`; exactly the seeded stock is sold and every other
//! buyer gets `410 Item sold out`. The generic `POST /transaction` and
//! `GET /resources/:id` endpoints are served alongside, with the inventory
//! profile.
//!
//! The `proof_of_correctness` binary drives the running service and checks
//! that it neither oversells nor undersells.

pub mod config;
pub mod inventory;

use axum::Router;
use tally_web::{AppState, Profile, api_routes, with_request_tracing};

pub use inventory::{TicketingState, ticket_routes};

/// Full application router: ticket routes, generic API routes, tracing.
#[must_use]
pub fn app(state: TicketingState) -> Router {
    let api = api_routes(AppState::new(state.engine.clone(), Profile::Inventory));
    with_request_tracing(api.merge(ticket_routes(state)))
}
