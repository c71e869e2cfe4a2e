//! `GET /resources/:id`: read a resource's current quantity.

use crate::WebResult;
use crate::error::AppError;
use crate::profile::{Amount, Profile};
use crate::state::AppState;
use axum::{
    Json,
    extract::{Path, State},
};
use serde::Serialize;
use tally_core::{ResourceId, ResourceRecord, ResourceStore};

/// A resource as returned over HTTP.
#[derive(Debug, Clone, Serialize)]
pub struct ResourceResponse {
    /// Resource id
    pub id: i64,
    /// Human-readable name
    pub name: String,
    /// Current quantity in the profile's units
    pub quantity: Amount,
}

impl ResourceResponse {
    /// Render a record for the given profile.
    #[must_use]
    pub fn new(profile: Profile, record: ResourceRecord) -> Self {
        Self {
            id: record.id.as_i64(),
            name: record.name,
            quantity: profile.amount(record.quantity),
        }
    }
}

/// Load a record, mapping absence to the profile's 404.
///
/// # Errors
///
/// Returns 404 if the record does not exist and 500 if the read fails.
pub async fn load_resource(
    store: &dyn ResourceStore,
    profile: Profile,
    id: ResourceId,
) -> WebResult<ResourceResponse> {
    let record = store
        .get(id)
        .await
        .map_err(|e| AppError::internal("Failed to load resource").with_source(e.into()))?
        .ok_or_else(|| profile.not_found(id))?;

    Ok(ResourceResponse::new(profile, record))
}

/// Get one resource.
///
/// # Endpoint
///
/// ```text
/// GET /resources/:id
/// ```
///
/// # Errors
///
/// Returns 404 if the record does not exist and 500 if the read fails.
pub async fn get_resource(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> WebResult<Json<ResourceResponse>> {
    let response = load_resource(
        state.engine.store().as_ref(),
        state.profile,
        ResourceId::new(id),
    )
    .await?;
    Ok(Json(response))
}
