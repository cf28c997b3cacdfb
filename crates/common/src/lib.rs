//! Shared identifier types used across the storefront crates.

mod ids;

pub use ids::{BagId, BagItemId, OrderId, OrderItemId, UserId};
