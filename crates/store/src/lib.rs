//! Storage contract for the storefront.
//!
//! The [`Store`] trait is the narrow interface the checkout core uses to reach
//! the relational backend. Two implementations are provided: an in-memory
//! store for tests and local runs, and a PostgreSQL store backed by `sqlx`.
//!
//! Correctness of checkout relies on three uniqueness rules every backend
//! enforces atomically:
//! - one order per bag ([`ORDERS_BAG_ID_KEY`])
//! - one open bag per user ([`BAGS_ONE_OPEN_PER_USER`])
//! - one order item per source bag item ([`ORDER_ITEMS_SOURCE_KEY`])

pub mod error;
pub mod memory;
pub mod model;
pub mod postgres;
pub mod store;

pub use common::{BagId, BagItemId, OrderId, OrderItemId, UserId};
pub use error::{Result, StoreError};
pub use memory::InMemoryStore;
pub use model::{
    Bag, BagItem, BagStatus, FabricSelection, NewBagItem, NewOrder, Order, OrderItem, OrderStatus,
    Profile, ProfileRole, ShippingAddress,
};
pub use postgres::PostgresStore;
pub use store::{Store, StoreExt};

/// Constraint guarding the one-order-per-bag invariant.
pub const ORDERS_BAG_ID_KEY: &str = "orders_bag_id_key";

/// Partial unique index allowing a single open bag per user.
pub const BAGS_ONE_OPEN_PER_USER: &str = "bags_one_open_per_user";

/// Constraint making order item copies idempotent.
pub const ORDER_ITEMS_SOURCE_KEY: &str = "order_items_order_id_bag_item_id_key";
