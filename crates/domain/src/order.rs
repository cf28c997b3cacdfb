//! Read access to placed orders.

use serde::Serialize;
use store::{Order, OrderId, OrderItem, Store, StoreExt, UserId};

use crate::error::DomainError;

/// An order with its item snapshots.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrderDetails {
    pub order: Order,
    pub items: Vec<OrderItem>,
}

/// Order lookups scoped to the requesting user.
#[derive(Clone)]
pub struct OrderQueries<S: Store> {
    store: S,
}

impl<S: Store> OrderQueries<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Loads an order visible to the viewer.
    ///
    /// An order is visible to its customer and to its tailor. Anyone else gets
    /// the same not-found error as for a missing order.
    #[tracing::instrument(skip(self))]
    pub async fn get_for_viewer(
        &self,
        viewer: UserId,
        order_id: OrderId,
    ) -> Result<OrderDetails, DomainError> {
        let not_found = || DomainError::NotFound {
            entity: "Order",
            id: order_id.to_string(),
        };

        let (order, items) = self
            .store
            .load_order_with_items(order_id)
            .await?
            .ok_or_else(not_found)?;

        if order.user_id != viewer && order.tailor_id != viewer {
            return Err(not_found());
        }

        Ok(OrderDetails { order, items })
    }

    /// Lists the user's orders as a customer, newest first.
    #[tracing::instrument(skip(self))]
    pub async fn list_for_user(&self, user_id: UserId) -> Result<Vec<Order>, DomainError> {
        Ok(self.store.list_orders_for_user(user_id).await?)
    }
}
