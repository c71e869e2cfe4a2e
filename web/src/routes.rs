//! Router assembly.

use crate::handlers::{get_resource, health_check, post_transaction, readiness};
use crate::middleware::request_id_layer;
use crate::state::AppState;
use axum::{
    Router,
    routing::{get, post},
};
use tower_http::trace::TraceLayer;

/// Build the transaction API router.
///
/// # Routes
///
/// - `POST /transaction`
/// - `GET /resources/:id`
/// - `GET /health`, `GET /health/ready`
///
/// Every route runs behind the request-id layer and HTTP tracing.
pub fn router(state: AppState) -> Router {
    with_request_tracing(api_routes(state))
}

/// The transaction API routes without middleware.
///
/// Use this to merge extra routes before applying [`with_request_tracing`]
/// once over the combined router.
pub fn api_routes(state: AppState) -> Router {
    Router::new()
        .route("/transaction", post(post_transaction))
        .route("/resources/:id", get(get_resource))
        .route("/health", get(health_check))
        .route("/health/ready", get(readiness))
        .with_state(state)
}

/// Wrap a router in HTTP tracing and the request-id layer.
///
/// The request-id layer is outermost, so the HTTP trace span is nested in
/// the `http_request` span carrying the id.
pub fn with_request_tracing(router: Router) -> Router {
    router
        .layer(TraceLayer::new_for_http())
        .layer(request_id_layer())
}
