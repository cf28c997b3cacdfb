//! Payment verification endpoint.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use checkout::ReconcileOutcome;
use serde::{Deserialize, Serialize};
use store::Store;

use super::AppState;
use crate::auth::AuthUser;
use crate::error::ApiError;

#[derive(Deserialize)]
pub struct VerifyRequest {
    #[serde(default)]
    pub session_id: String,
}

#[derive(Serialize)]
pub struct VerifyResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order_id: Option<String>,
    pub already_existing: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<&'static str>,
}

impl From<ReconcileOutcome> for VerifyResponse {
    fn from(outcome: ReconcileOutcome) -> Self {
        let message = match outcome {
            ReconcileOutcome::OrderPlaced { .. } => None,
            ReconcileOutcome::NotBagCheckout => Some("Session is not a bag checkout"),
        };

        Self {
            success: true,
            order_id: outcome.order_id().map(|id| id.to_string()),
            already_existing: outcome.already_existing(),
            message,
        }
    }
}

/// POST /checkout/verify — reconcile a paid session into its order.
///
/// Called by the success page after the processor redirect; any number of
/// calls for the same session yield the same order.
#[tracing::instrument(skip(state, payload))]
pub async fn verify<S: Store + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    AuthUser(user_id): AuthUser,
    payload: Result<Json<VerifyRequest>, JsonRejection>,
) -> Result<Json<VerifyResponse>, ApiError> {
    let Json(req) = payload?;

    let outcome = state.reconciler.reconcile(&req.session_id).await?;
    tracing::info!(%user_id, order_id = ?outcome.order_id(), "checkout verified");

    Ok(Json(outcome.into()))
}
