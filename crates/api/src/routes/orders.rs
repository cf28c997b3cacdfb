//! Order read endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use common::OrderId;
use domain::OrderDetails;
use serde::Serialize;
use store::{Order, OrderItem, ShippingAddress, Store};

use super::AppState;
use crate::auth::AuthUser;
use crate::error::ApiError;

// -- Response types --

#[derive(Serialize)]
pub struct OrderResponse {
    pub id: String,
    pub user_id: String,
    pub tailor_id: String,
    pub bag_id: String,
    pub status: String,
    pub total_cents: i64,
    pub shipping_address: ShippingAddress,
    pub created_at: String,
}

impl From<Order> for OrderResponse {
    fn from(order: Order) -> Self {
        Self {
            id: order.id.to_string(),
            user_id: order.user_id.to_string(),
            tailor_id: order.tailor_id.to_string(),
            bag_id: order.bag_id.to_string(),
            status: order.status.to_string(),
            total_cents: order.total_cents,
            shipping_address: order.shipping_address,
            created_at: order.created_at.to_rfc3339(),
        }
    }
}

#[derive(Serialize)]
pub struct OrderDetailsResponse {
    pub success: bool,
    pub order: OrderResponse,
    pub items: Vec<OrderItem>,
}

#[derive(Serialize)]
pub struct OrderListResponse {
    pub success: bool,
    pub orders: Vec<OrderResponse>,
}

// -- Handlers --

/// GET /orders/:id — an order with its items, for its customer or tailor.
#[tracing::instrument(skip(state))]
pub async fn get<S: Store + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    AuthUser(user_id): AuthUser,
    Path(id): Path<String>,
) -> Result<Json<OrderDetailsResponse>, ApiError> {
    let order_id = OrderId::parse(&id)
        .map_err(|e| ApiError::BadRequest(format!("Invalid order ID: {e}")))?;

    let OrderDetails { order, items } = state.orders.get_for_viewer(user_id, order_id).await?;

    Ok(Json(OrderDetailsResponse {
        success: true,
        order: order.into(),
        items,
    }))
}

/// GET /orders — the caller's orders, newest first.
#[tracing::instrument(skip(state))]
pub async fn list<S: Store + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    AuthUser(user_id): AuthUser,
) -> Result<Json<OrderListResponse>, ApiError> {
    let orders = state.orders.list_for_user(user_id).await?;

    Ok(Json(OrderListResponse {
        success: true,
        orders: orders.into_iter().map(OrderResponse::from).collect(),
    }))
}
