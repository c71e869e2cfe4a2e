//! Ticket purchase and inventory endpoints.
//!
//! `POST /buy_ticket` always takes exactly one unit of the configured item.
//! Selling out is final (410); contention that outlasts the retry budget is
//! a retryable 503, which the load harness uses to tell the two apart.

use axum::{Json, Router, extract::State, routing::get, routing::post};
use serde::Serialize;
use tally_core::{Quantity, ResourceId};
use tally_runtime::TransactionEngine;
use tally_web::handlers::{ResourceResponse, applied, load_resource};
use tally_web::{Amount, Profile, WebResult};
use tracing::info;

/// State of the ticket routes.
#[derive(Clone, Debug)]
pub struct TicketingState {
    /// Engine executing purchases
    pub engine: TransactionEngine,
    /// Item sold by `POST /buy_ticket`
    pub item_id: ResourceId,
}

impl TicketingState {
    /// Create the ticket route state.
    #[must_use]
    pub const fn new(engine: TransactionEngine, item_id: ResourceId) -> Self {
        Self { engine, item_id }
    }
}

/// Response body of a successful purchase.
#[derive(Debug, Clone, Serialize)]
pub struct PurchaseResponse {
    /// Always `"Purchase successful"`
    pub message: &'static str,
    /// Tickets left after this purchase
    pub remaining_quantity: Amount,
    /// Receipt of the purchase
    pub receipt_id: i64,
}

/// Buy one ticket.
///
/// # Endpoint
///
/// ```text
/// POST /buy_ticket
/// ```
///
/// # Errors
///
/// 410 once sold out, 503 when the item stays contended, 404 if the item was
/// never seeded, 500 on storage failure.
pub async fn buy_ticket(
    State(state): State<TicketingState>,
) -> WebResult<Json<PurchaseResponse>> {
    let outcome = state.engine.execute(state.item_id, Quantity::new(1)).await?;
    let (remaining, receipt) = applied(Profile::Inventory, state.item_id, outcome)?;

    info!(
        item_id = %state.item_id,
        receipt_id = %receipt.id,
        remaining = remaining.units(),
        "Ticket sold"
    );

    Ok(Json(PurchaseResponse {
        message: "Purchase successful",
        remaining_quantity: Profile::Inventory.amount(remaining),
        receipt_id: receipt.id.as_i64(),
    }))
}

/// Current stock of the item on sale.
///
/// # Endpoint
///
/// ```text
/// GET /inventory
/// ```
///
/// # Errors
///
/// 404 if the item was never seeded, 500 on storage failure.
pub async fn get_inventory(
    State(state): State<TicketingState>,
) -> WebResult<Json<ResourceResponse>> {
    let response = load_resource(
        state.engine.store().as_ref(),
        Profile::Inventory,
        state.item_id,
    )
    .await?;
    Ok(Json(response))
}

/// Ticket routes, with their state applied.
pub fn ticket_routes(state: TicketingState) -> Router {
    Router::new()
        .route("/buy_ticket", post(buy_ticket))
        .route("/inventory", get(get_inventory))
        .with_state(state)
}
