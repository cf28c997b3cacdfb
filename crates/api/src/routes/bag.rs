//! Bag endpoints: add, remove, fetch and start checkout.

use std::sync::Arc;

use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use common::{BagItemId, UserId};
use domain::Money;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use store::{Bag, BagItem, FabricSelection, NewBagItem, ShippingAddress, Store};

use super::AppState;
use crate::auth::AuthUser;
use crate::error::ApiError;

// -- Request types --

#[derive(Deserialize)]
pub struct AddItemRequest {
    pub tailor_id: UserId,
    pub design_id: String,
    pub design_name: Option<String>,
    /// Stitching price in major currency units.
    pub price: Decimal,
    pub fabric: Option<FabricSelection>,
    pub color: Option<String>,
    pub style: Option<String>,
    pub tailor_notes: Option<String>,
    pub measurement_id: Option<String>,
}

impl AddItemRequest {
    fn into_new_item(self) -> NewBagItem {
        let design_name = self
            .design_name
            .filter(|name| !name.trim().is_empty())
            .unwrap_or_else(|| self.design_id.clone());

        NewBagItem {
            design_id: self.design_id,
            design_name,
            price: self.price,
            fabric: self.fabric,
            color: self.color,
            style: self.style,
            tailor_notes: self.tailor_notes,
            measurement_id: self.measurement_id,
        }
    }
}

#[derive(Deserialize)]
pub struct CheckoutRequest {
    #[serde(default)]
    pub shipping_address: ShippingAddress,
}

// -- Response types --

#[derive(Serialize)]
pub struct AddItemResponse {
    pub success: bool,
    pub bag_id: String,
    pub item: BagItem,
    pub bag_created: bool,
}

#[derive(Serialize)]
pub struct BagResponse {
    pub success: bool,
    pub bag: Option<Bag>,
    pub items: Vec<BagItem>,
    pub subtotal_cents: i64,
}

#[derive(Serialize)]
pub struct RemoveItemResponse {
    pub success: bool,
}

#[derive(Serialize)]
pub struct CheckoutResponse {
    pub success: bool,
    pub session_id: String,
    pub url: String,
    pub bag_id: String,
    pub total_cents: i64,
}

// -- Handlers --

/// POST /bag/add — add a configured design to the caller's open bag.
#[tracing::instrument(skip(state, payload))]
pub async fn add<S: Store + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    AuthUser(user_id): AuthUser,
    payload: Result<Json<AddItemRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<AddItemResponse>), ApiError> {
    let Json(req) = payload?;
    let tailor_id = req.tailor_id;

    let added = state
        .bags
        .add_item(user_id, tailor_id, req.into_new_item())
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(AddItemResponse {
            success: true,
            bag_id: added.bag.id.to_string(),
            item: added.item,
            bag_created: added.bag_created,
        }),
    ))
}

/// DELETE /bag/items/:id — remove an item from the caller's open bag.
#[tracing::instrument(skip(state))]
pub async fn remove_item<S: Store + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    AuthUser(user_id): AuthUser,
    Path(id): Path<String>,
) -> Result<Json<RemoveItemResponse>, ApiError> {
    let item_id = BagItemId::parse(&id)
        .map_err(|e| ApiError::BadRequest(format!("Invalid bag item ID: {e}")))?;

    state.bags.remove_item(user_id, item_id).await?;

    Ok(Json(RemoveItemResponse { success: true }))
}

/// GET /bag — the caller's open bag, or `bag: null`.
#[tracing::instrument(skip(state))]
pub async fn get<S: Store + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    AuthUser(user_id): AuthUser,
) -> Result<Json<BagResponse>, ApiError> {
    let response = match state.bags.get_bag(user_id).await? {
        Some(view) => BagResponse {
            success: true,
            bag: Some(view.bag),
            items: view.items,
            subtotal_cents: view.subtotal.cents(),
        },
        None => BagResponse {
            success: true,
            bag: None,
            items: Vec::new(),
            subtotal_cents: Money::zero().cents(),
        },
    };

    Ok(Json(response))
}

/// POST /bag/checkout — create a payment session for the caller's open bag.
#[tracing::instrument(skip(state, payload))]
pub async fn checkout<S: Store + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    AuthUser(user_id): AuthUser,
    payload: Result<Json<CheckoutRequest>, JsonRejection>,
) -> Result<Json<CheckoutResponse>, ApiError> {
    let Json(req) = payload?;

    let session = state
        .initiator
        .start_checkout(user_id, &req.shipping_address)
        .await?;

    Ok(Json(CheckoutResponse {
        success: true,
        session_id: session.session_id,
        url: session.url,
        bag_id: session.bag_id.to_string(),
        total_cents: session.total.cents(),
    }))
}
