//! `POST /transaction`: the public transaction operation.
//!
//! # Status taxonomy
//!
//! | Outcome                         | Status            |
//! |---------------------------------|-------------------|
//! | `Applied`                       | 200               |
//! | `Rejected(NotFound)`            | 404               |
//! | `Rejected(Insufficient)`        | 400 or 410 (profile) |
//! | `InvalidRequest` / bad JSON     | 400               |
//! | `Busy`                          | 503 (retryable)   |
//! | storage failure                 | 500               |

use crate::WebResult;
use crate::error::AppError;
use crate::profile::{Amount, Profile};
use crate::state::AppState;
use axum::{
    Json,
    extract::{State, rejection::JsonRejection},
};
use serde::{Deserialize, Serialize};
use tally_core::{Quantity, Receipt, Rejection, ResourceId, TransactionOutcome};

/// Request body of `POST /transaction`.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TransactionRequest {
    /// Resource to decrement (`user_id` is accepted for ledger clients)
    #[serde(alias = "user_id")]
    pub resource_id: i64,
    /// Amount to take, in the profile's decimal units
    pub amount: f64,
}

/// Response body of a successful transaction.
#[derive(Debug, Clone, Serialize)]
pub struct TransactionResponse {
    /// Always `"processed"`
    pub status: &'static str,
    /// Amount taken
    pub deducted: Amount,
    /// Balance left (ledger profile)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remaining_balance: Option<Amount>,
    /// Stock left (inventory profile)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remaining_quantity: Option<Amount>,
    /// Receipt written with the decrement
    pub receipt_id: i64,
}

impl TransactionResponse {
    /// Build the response for an applied transaction.
    #[must_use]
    pub fn new(profile: Profile, receipt: &Receipt, remaining: Quantity) -> Self {
        let remaining_amount = profile.amount(remaining);
        let (remaining_balance, remaining_quantity) = match profile {
            Profile::Ledger => (Some(remaining_amount), None),
            Profile::Inventory => (None, Some(remaining_amount)),
        };
        Self {
            status: "processed",
            deducted: profile.amount(receipt.amount),
            remaining_balance,
            remaining_quantity,
            receipt_id: receipt.id.as_i64(),
        }
    }
}

/// Execute a transaction.
///
/// # Endpoint
///
/// ```text
/// POST /transaction
/// { "resource_id": 1, "amount": 12.5 }
/// ```
///
/// # Errors
///
/// Returns an [`AppError`] for every outcome other than `Applied`; see the
/// module-level status table.
pub async fn post_transaction(
    State(state): State<AppState>,
    payload: Result<Json<TransactionRequest>, JsonRejection>,
) -> WebResult<Json<TransactionResponse>> {
    let Json(request) = payload.map_err(|rejection| AppError::bad_request(rejection.body_text()))?;
    let resource_id = ResourceId::new(request.resource_id);

    let outcome = state
        .engine
        .execute_decimal(resource_id, request.amount, state.profile.scale())
        .await?;

    let (remaining, receipt) = applied(state.profile, resource_id, outcome)?;
    Ok(Json(TransactionResponse::new(
        state.profile,
        &receipt,
        remaining,
    )))
}

/// Unwrap an `Applied` outcome, converting every other outcome to its HTTP error.
///
/// # Errors
///
/// Returns the profile's error for `Rejected`, 503 for `Busy` and 400 for
/// `InvalidRequest`.
pub fn applied(
    profile: Profile,
    resource_id: ResourceId,
    outcome: TransactionOutcome,
) -> WebResult<(Quantity, Receipt)> {
    match outcome {
        TransactionOutcome::Applied { remaining, receipt } => Ok((remaining, receipt)),
        TransactionOutcome::Rejected(Rejection::NotFound) => Err(profile.not_found(resource_id)),
        TransactionOutcome::Rejected(Rejection::Insufficient { .. }) => {
            Err(profile.insufficient())
        },
        TransactionOutcome::Busy { .. } => Err(AppError::unavailable("System busy, please retry")),
        TransactionOutcome::InvalidRequest(reason) => {
            Err(AppError::bad_request(reason.to_string()))
        },
    }
}
