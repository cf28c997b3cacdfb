use async_trait::async_trait;

use crate::{
    Bag, BagId, BagItem, BagItemId, BagStatus, NewBagItem, NewOrder, Order, OrderId, OrderItem,
    Profile, Result, UserId,
};

/// Core trait for storage backends.
///
/// A store exposes create/read/update/delete over bags, bag items, orders,
/// order items and profiles. All implementations must be thread-safe
/// (Send + Sync) and must enforce the uniqueness rules documented at the
/// crate root atomically, reporting a lost race as
/// [`StoreError::UniqueViolation`](crate::StoreError::UniqueViolation).
#[async_trait]
pub trait Store: Send + Sync {
    // -- Bags --

    /// Returns the user's open bag, if any.
    async fn find_open_bag(&self, user_id: UserId) -> Result<Option<Bag>>;

    /// Creates an open bag for the user and tailor.
    ///
    /// Fails with a unique violation of
    /// [`BAGS_ONE_OPEN_PER_USER`](crate::BAGS_ONE_OPEN_PER_USER) if the user
    /// already has an open bag.
    async fn create_bag(&self, user_id: UserId, tailor_id: UserId) -> Result<Bag>;

    /// Loads a bag by ID regardless of status.
    async fn get_bag(&self, bag_id: BagId) -> Result<Option<Bag>>;

    /// Sets the status of a bag. Setting the current status again is a no-op.
    async fn set_bag_status(&self, bag_id: BagId, status: BagStatus) -> Result<()>;

    // -- Bag items --

    /// Adds an item to an open bag. Fails with `NotFound` if the bag is
    /// missing or already checked out.
    async fn insert_bag_item(&self, bag_id: BagId, item: NewBagItem) -> Result<BagItem>;

    /// Lists a bag's items, oldest first.
    async fn list_bag_items(&self, bag_id: BagId) -> Result<Vec<BagItem>>;

    /// Deletes an item from a bag. Returns false if no such item was in the bag.
    async fn delete_bag_item(&self, bag_id: BagId, item_id: BagItemId) -> Result<bool>;

    // -- Orders --

    /// Inserts a new pending order.
    ///
    /// Fails with a unique violation of
    /// [`ORDERS_BAG_ID_KEY`](crate::ORDERS_BAG_ID_KEY) if an order already
    /// exists for the bag.
    async fn insert_order(&self, order: NewOrder) -> Result<Order>;

    /// Loads an order by ID.
    async fn get_order(&self, order_id: OrderId) -> Result<Option<Order>>;

    /// Loads the order created from a bag, if any.
    async fn find_order_by_bag(&self, bag_id: BagId) -> Result<Option<Order>>;

    /// Lists a customer's orders, newest first.
    async fn list_orders_for_user(&self, user_id: UserId) -> Result<Vec<Order>>;

    // -- Order items --

    /// Copies bag items into an order.
    ///
    /// Items already copied for the same (order, bag item) pair are skipped,
    /// so calling this again after a partial failure completes the copy.
    /// Returns the number of newly inserted lines.
    async fn insert_order_items(&self, order_id: OrderId, items: &[BagItem]) -> Result<usize>;

    /// Lists an order's items, oldest first.
    async fn list_order_items(&self, order_id: OrderId) -> Result<Vec<OrderItem>>;

    // -- Profiles --

    /// Loads a profile by user ID.
    async fn get_profile(&self, user_id: UserId) -> Result<Option<Profile>>;

    /// Inserts or replaces a profile.
    async fn upsert_profile(&self, profile: Profile) -> Result<()>;
}

/// Extension trait providing convenience methods for stores.
#[async_trait]
pub trait StoreExt: Store {
    /// Loads a bag together with its items.
    async fn load_bag_with_items(&self, bag_id: BagId) -> Result<Option<(Bag, Vec<BagItem>)>> {
        match self.get_bag(bag_id).await? {
            Some(bag) => {
                let items = self.list_bag_items(bag_id).await?;
                Ok(Some((bag, items)))
            }
            None => Ok(None),
        }
    }

    /// Loads an order together with its items.
    async fn load_order_with_items(
        &self,
        order_id: OrderId,
    ) -> Result<Option<(Order, Vec<OrderItem>)>> {
        match self.get_order(order_id).await? {
            Some(order) => {
                let items = self.list_order_items(order_id).await?;
                Ok(Some((order, items)))
            }
            None => Ok(None),
        }
    }
}

// Blanket implementation for all Store implementations
impl<T: Store + ?Sized> StoreExt for T {}
