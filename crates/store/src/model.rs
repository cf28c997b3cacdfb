//! Records persisted by the store.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{BagId, BagItemId, OrderId, OrderItemId, StoreError, UserId};

/// Lifecycle status of a bag.
///
/// ```text
/// Open ──► CheckedOut
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum BagStatus {
    /// Items can be added and removed.
    #[default]
    Open,

    /// An order was created from this bag (terminal state).
    CheckedOut,
}

impl BagStatus {
    /// Returns the status as stored and serialized.
    pub fn as_str(&self) -> &'static str {
        match self {
            BagStatus::Open => "open",
            BagStatus::CheckedOut => "checked_out",
        }
    }
}

impl std::fmt::Display for BagStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for BagStatus {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "open" => Ok(BagStatus::Open),
            "checked_out" => Ok(BagStatus::CheckedOut),
            other => Err(StoreError::InvalidData(format!("unknown bag status '{other}'"))),
        }
    }
}

/// Status of an order.
///
/// Orders are created `Pending`; the later states are driven by fulfillment
/// workflows outside this service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    #[default]
    Pending,
    Accepted,
    Shipped,
    Delivered,
    Cancelled,
}

impl OrderStatus {
    /// Returns the status as stored and serialized.
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Accepted => "accepted",
            OrderStatus::Shipped => "shipped",
            OrderStatus::Delivered => "delivered",
            OrderStatus::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for OrderStatus {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(OrderStatus::Pending),
            "accepted" => Ok(OrderStatus::Accepted),
            "shipped" => Ok(OrderStatus::Shipped),
            "delivered" => Ok(OrderStatus::Delivered),
            "cancelled" => Ok(OrderStatus::Cancelled),
            other => Err(StoreError::InvalidData(format!(
                "unknown order status '{other}'"
            ))),
        }
    }
}

/// A user's in-progress cart for one tailor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bag {
    pub id: BagId,
    pub user_id: UserId,
    pub tailor_id: UserId,
    pub status: BagStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fabric chosen for a bag item, priced per yard.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FabricSelection {
    pub fabric_id: String,
    #[serde(default)]
    pub price_per_yard: Option<Decimal>,
    #[serde(default)]
    pub yards: Option<Decimal>,
}

/// Fields supplied when adding a configured design to a bag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewBagItem {
    pub design_id: String,
    pub design_name: String,
    /// Stitching price in major currency units.
    pub price: Decimal,
    pub fabric: Option<FabricSelection>,
    pub color: Option<String>,
    pub style: Option<String>,
    pub tailor_notes: Option<String>,
    pub measurement_id: Option<String>,
}

/// One configured product line within a bag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BagItem {
    pub id: BagItemId,
    pub bag_id: BagId,
    pub design_id: String,
    pub design_name: String,
    pub price: Decimal,
    pub fabric: Option<FabricSelection>,
    pub color: Option<String>,
    pub style: Option<String>,
    pub tailor_notes: Option<String>,
    pub measurement_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Destination for a placed order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ShippingAddress {
    #[serde(default)]
    pub street: String,
    #[serde(default)]
    pub city: String,
    #[serde(default)]
    pub state: String,
    #[serde(default)]
    pub postal_code: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
}

/// Fields supplied when creating an order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewOrder {
    pub user_id: UserId,
    pub tailor_id: UserId,
    pub bag_id: BagId,
    pub session_id: String,
    pub total_cents: i64,
    pub shipping_address: ShippingAddress,
}

/// The durable post-payment record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub user_id: UserId,
    pub tailor_id: UserId,
    pub bag_id: BagId,
    pub session_id: String,
    pub status: OrderStatus,
    pub total_cents: i64,
    pub shipping_address: ShippingAddress,
    pub created_at: DateTime<Utc>,
}

/// Snapshot of a bag item taken when its order was created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderItem {
    pub id: OrderItemId,
    pub order_id: OrderId,
    /// The bag item this line was copied from.
    pub bag_item_id: BagItemId,
    pub design_id: String,
    pub design_name: String,
    pub price: Decimal,
    pub fabric: Option<FabricSelection>,
    pub color: Option<String>,
    pub style: Option<String>,
    pub tailor_notes: Option<String>,
    pub measurement_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl OrderItem {
    /// Copies a bag item into a new order line.
    pub fn snapshot(order_id: OrderId, item: &BagItem) -> Self {
        Self {
            id: OrderItemId::new(),
            order_id,
            bag_item_id: item.id,
            design_id: item.design_id.clone(),
            design_name: item.design_name.clone(),
            price: item.price,
            fabric: item.fabric.clone(),
            color: item.color.clone(),
            style: item.style.clone(),
            tailor_notes: item.tailor_notes.clone(),
            measurement_id: item.measurement_id.clone(),
            created_at: Utc::now(),
        }
    }
}

/// Role a profile plays in the storefront.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProfileRole {
    Customer,
    Tailor,
}

impl ProfileRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProfileRole::Customer => "customer",
            ProfileRole::Tailor => "tailor",
        }
    }
}

impl std::str::FromStr for ProfileRole {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "customer" => Ok(ProfileRole::Customer),
            "tailor" => Ok(ProfileRole::Tailor),
            other => Err(StoreError::InvalidData(format!(
                "unknown profile role '{other}'"
            ))),
        }
    }
}

/// Contact details for a customer or tailor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub id: UserId,
    pub full_name: String,
    pub email: String,
    pub role: ProfileRole,
}
