use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use crate::{
    BAGS_ONE_OPEN_PER_USER, Bag, BagId, BagItem, BagItemId, BagStatus, NewBagItem, NewOrder,
    ORDERS_BAG_ID_KEY, Order, OrderId, OrderItem, OrderStatus, Profile, Result, StoreError, UserId,
    store::Store,
};

#[derive(Debug, Default)]
struct Tables {
    bags: HashMap<BagId, Bag>,
    bag_items: Vec<BagItem>,
    orders: HashMap<OrderId, Order>,
    order_items: Vec<OrderItem>,
    profiles: HashMap<UserId, Profile>,
    /// Number of order item inserts allowed before an injected failure.
    order_items_before_failure: Option<usize>,
}

/// In-memory store implementation for testing and local runs.
///
/// Every write takes the table lock for its whole check-then-insert, which
/// gives the same atomic uniqueness behavior as the PostgreSQL constraints.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    tables: Arc<RwLock<Tables>>,
}

impl InMemoryStore {
    /// Creates a new empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the total number of bags stored.
    pub async fn bag_count(&self) -> usize {
        self.tables.read().await.bags.len()
    }

    /// Returns the total number of bag items stored.
    pub async fn bag_item_count(&self) -> usize {
        self.tables.read().await.bag_items.len()
    }

    /// Returns the total number of orders stored.
    pub async fn order_count(&self) -> usize {
        self.tables.read().await.orders.len()
    }

    /// Returns the number of orders referencing a bag.
    pub async fn order_count_for_bag(&self, bag_id: BagId) -> usize {
        self.tables
            .read()
            .await
            .orders
            .values()
            .filter(|o| o.bag_id == bag_id)
            .count()
    }

    /// Makes order item inserts fail once `n` more lines have been written.
    pub async fn fail_order_items_after(&self, n: usize) {
        self.tables.write().await.order_items_before_failure = Some(n);
    }

    /// Removes any injected failures.
    pub async fn clear_faults(&self) {
        self.tables.write().await.order_items_before_failure = None;
    }

    /// Clears all records and injected failures.
    pub async fn clear(&self) {
        *self.tables.write().await = Tables::default();
    }
}

#[async_trait]
impl Store for InMemoryStore {
    async fn find_open_bag(&self, user_id: UserId) -> Result<Option<Bag>> {
        let tables = self.tables.read().await;
        Ok(tables
            .bags
            .values()
            .find(|b| b.user_id == user_id && b.status == BagStatus::Open)
            .cloned())
    }

    async fn create_bag(&self, user_id: UserId, tailor_id: UserId) -> Result<Bag> {
        let mut tables = self.tables.write().await;

        if tables
            .bags
            .values()
            .any(|b| b.user_id == user_id && b.status == BagStatus::Open)
        {
            return Err(StoreError::UniqueViolation {
                constraint: BAGS_ONE_OPEN_PER_USER.to_string(),
            });
        }

        let now = Utc::now();
        let bag = Bag {
            id: BagId::new(),
            user_id,
            tailor_id,
            status: BagStatus::Open,
            created_at: now,
            updated_at: now,
        };
        tables.bags.insert(bag.id, bag.clone());
        Ok(bag)
    }

    async fn get_bag(&self, bag_id: BagId) -> Result<Option<Bag>> {
        Ok(self.tables.read().await.bags.get(&bag_id).cloned())
    }

    async fn set_bag_status(&self, bag_id: BagId, status: BagStatus) -> Result<()> {
        let mut tables = self.tables.write().await;
        let bag = tables.bags.get_mut(&bag_id).ok_or(StoreError::NotFound {
            entity: "Bag",
            id: bag_id.to_string(),
        })?;
        if bag.status != status {
            bag.status = status;
            bag.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn insert_bag_item(&self, bag_id: BagId, item: NewBagItem) -> Result<BagItem> {
        let mut tables = self.tables.write().await;

        let open = matches!(tables.bags.get(&bag_id), Some(bag) if bag.status == BagStatus::Open);
        if !open {
            return Err(StoreError::NotFound {
                entity: "Bag",
                id: bag_id.to_string(),
            });
        }

        let row = BagItem {
            id: BagItemId::new(),
            bag_id,
            design_id: item.design_id,
            design_name: item.design_name,
            price: item.price,
            fabric: item.fabric,
            color: item.color,
            style: item.style,
            tailor_notes: item.tailor_notes,
            measurement_id: item.measurement_id,
            created_at: Utc::now(),
        };
        tables.bag_items.push(row.clone());
        Ok(row)
    }

    async fn list_bag_items(&self, bag_id: BagId) -> Result<Vec<BagItem>> {
        let tables = self.tables.read().await;
        Ok(tables
            .bag_items
            .iter()
            .filter(|i| i.bag_id == bag_id)
            .cloned()
            .collect())
    }

    async fn delete_bag_item(&self, bag_id: BagId, item_id: BagItemId) -> Result<bool> {
        let mut tables = self.tables.write().await;
        let before = tables.bag_items.len();
        tables
            .bag_items
            .retain(|i| !(i.id == item_id && i.bag_id == bag_id));
        Ok(tables.bag_items.len() != before)
    }

    async fn insert_order(&self, order: NewOrder) -> Result<Order> {
        let mut tables = self.tables.write().await;

        // Unique constraint simulation on orders.bag_id
        if tables.orders.values().any(|o| o.bag_id == order.bag_id) {
            return Err(StoreError::UniqueViolation {
                constraint: ORDERS_BAG_ID_KEY.to_string(),
            });
        }

        let row = Order {
            id: OrderId::new(),
            user_id: order.user_id,
            tailor_id: order.tailor_id,
            bag_id: order.bag_id,
            session_id: order.session_id,
            status: OrderStatus::Pending,
            total_cents: order.total_cents,
            shipping_address: order.shipping_address,
            created_at: Utc::now(),
        };
        tables.orders.insert(row.id, row.clone());
        Ok(row)
    }

    async fn get_order(&self, order_id: OrderId) -> Result<Option<Order>> {
        Ok(self.tables.read().await.orders.get(&order_id).cloned())
    }

    async fn find_order_by_bag(&self, bag_id: BagId) -> Result<Option<Order>> {
        let tables = self.tables.read().await;
        Ok(tables.orders.values().find(|o| o.bag_id == bag_id).cloned())
    }

    async fn list_orders_for_user(&self, user_id: UserId) -> Result<Vec<Order>> {
        let tables = self.tables.read().await;
        let mut orders: Vec<_> = tables
            .orders
            .values()
            .filter(|o| o.user_id == user_id)
            .cloned()
            .collect();
        orders.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(orders)
    }

    async fn insert_order_items(&self, order_id: OrderId, items: &[BagItem]) -> Result<usize> {
        let mut tables = self.tables.write().await;

        if !tables.orders.contains_key(&order_id) {
            return Err(StoreError::NotFound {
                entity: "Order",
                id: order_id.to_string(),
            });
        }

        let mut inserted = 0;
        for item in items {
            let exists = tables
                .order_items
                .iter()
                .any(|l| l.order_id == order_id && l.bag_item_id == item.id);
            if exists {
                continue;
            }

            // Lines written before the failure stay, like a non-transactional backend.
            match tables.order_items_before_failure {
                Some(0) => {
                    return Err(StoreError::Unavailable(
                        "injected order item failure".to_string(),
                    ));
                }
                Some(n) => tables.order_items_before_failure = Some(n - 1),
                None => {}
            }

            tables.order_items.push(OrderItem::snapshot(order_id, item));
            inserted += 1;
        }
        Ok(inserted)
    }

    async fn list_order_items(&self, order_id: OrderId) -> Result<Vec<OrderItem>> {
        let tables = self.tables.read().await;
        Ok(tables
            .order_items
            .iter()
            .filter(|l| l.order_id == order_id)
            .cloned()
            .collect())
    }

    async fn get_profile(&self, user_id: UserId) -> Result<Option<Profile>> {
        Ok(self.tables.read().await.profiles.get(&user_id).cloned())
    }

    async fn upsert_profile(&self, profile: Profile) -> Result<()> {
        self.tables
            .write()
            .await
            .profiles
            .insert(profile.id, profile);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ShippingAddress;
    use rust_decimal::Decimal;

    fn new_item(design: &str) -> NewBagItem {
        NewBagItem {
            design_id: design.to_string(),
            design_name: format!("Design {design}"),
            price: Decimal::new(2000, 2),
            fabric: None,
            color: None,
            style: None,
            tailor_notes: None,
            measurement_id: None,
        }
    }

    fn new_order(bag: &Bag) -> NewOrder {
        NewOrder {
            user_id: bag.user_id,
            tailor_id: bag.tailor_id,
            bag_id: bag.id,
            session_id: "cs_test_1".to_string(),
            total_cents: 2000,
            shipping_address: ShippingAddress::default(),
        }
    }

    #[tokio::test]
    async fn create_and_find_open_bag() {
        let store = InMemoryStore::new();
        let user = UserId::new();
        let tailor = UserId::new();

        let bag = store.create_bag(user, tailor).await.unwrap();
        let found = store.find_open_bag(user).await.unwrap().unwrap();

        assert_eq!(found.id, bag.id);
        assert_eq!(found.tailor_id, tailor);
        assert_eq!(found.status, BagStatus::Open);
    }

    #[tokio::test]
    async fn second_open_bag_is_rejected() {
        let store = InMemoryStore::new();
        let user = UserId::new();
        store.create_bag(user, UserId::new()).await.unwrap();

        let err = store.create_bag(user, UserId::new()).await.unwrap_err();
        assert!(err.is_unique_violation_of(BAGS_ONE_OPEN_PER_USER));
        assert_eq!(store.bag_count().await, 1);
    }

    #[tokio::test]
    async fn checked_out_bag_frees_the_open_slot() {
        let store = InMemoryStore::new();
        let user = UserId::new();
        let bag = store.create_bag(user, UserId::new()).await.unwrap();
        store
            .set_bag_status(bag.id, BagStatus::CheckedOut)
            .await
            .unwrap();

        assert!(store.find_open_bag(user).await.unwrap().is_none());
        assert!(store.create_bag(user, UserId::new()).await.is_ok());
    }

    #[tokio::test]
    async fn insert_item_requires_bag() {
        let store = InMemoryStore::new();
        let err = store
            .insert_bag_item(BagId::new(), new_item("D-1"))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound { entity: "Bag", .. }));
    }

    #[tokio::test]
    async fn checked_out_bag_accepts_no_items() {
        let store = InMemoryStore::new();
        let bag = store.create_bag(UserId::new(), UserId::new()).await.unwrap();
        store.insert_bag_item(bag.id, new_item("D-1")).await.unwrap();
        store
            .set_bag_status(bag.id, BagStatus::CheckedOut)
            .await
            .unwrap();

        let err = store
            .insert_bag_item(bag.id, new_item("D-2"))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound { entity: "Bag", .. }));
        assert_eq!(store.list_bag_items(bag.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn delete_item_only_within_bag() {
        let store = InMemoryStore::new();
        let bag = store.create_bag(UserId::new(), UserId::new()).await.unwrap();
        let item = store.insert_bag_item(bag.id, new_item("D-1")).await.unwrap();

        assert!(!store.delete_bag_item(BagId::new(), item.id).await.unwrap());
        assert!(store.delete_bag_item(bag.id, item.id).await.unwrap());
        assert!(store.list_bag_items(bag.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn one_order_per_bag() {
        let store = InMemoryStore::new();
        let bag = store.create_bag(UserId::new(), UserId::new()).await.unwrap();

        let order = store.insert_order(new_order(&bag)).await.unwrap();
        assert_eq!(order.status, OrderStatus::Pending);

        let err = store.insert_order(new_order(&bag)).await.unwrap_err();
        assert!(err.is_unique_violation_of(ORDERS_BAG_ID_KEY));
        assert_eq!(store.order_count_for_bag(bag.id).await, 1);
    }

    #[tokio::test]
    async fn order_items_copy_is_idempotent() {
        let store = InMemoryStore::new();
        let bag = store.create_bag(UserId::new(), UserId::new()).await.unwrap();
        let a = store.insert_bag_item(bag.id, new_item("D-1")).await.unwrap();
        let b = store.insert_bag_item(bag.id, new_item("D-2")).await.unwrap();
        let order = store.insert_order(new_order(&bag)).await.unwrap();

        let items = vec![a, b];
        assert_eq!(store.insert_order_items(order.id, &items).await.unwrap(), 2);
        assert_eq!(store.insert_order_items(order.id, &items).await.unwrap(), 0);
        assert_eq!(store.list_order_items(order.id).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn injected_failure_leaves_partial_copy() {
        let store = InMemoryStore::new();
        let bag = store.create_bag(UserId::new(), UserId::new()).await.unwrap();
        let a = store.insert_bag_item(bag.id, new_item("D-1")).await.unwrap();
        let b = store.insert_bag_item(bag.id, new_item("D-2")).await.unwrap();
        let order = store.insert_order(new_order(&bag)).await.unwrap();
        let items = vec![a, b];

        store.fail_order_items_after(1).await;
        let err = store.insert_order_items(order.id, &items).await.unwrap_err();
        assert!(err.is_retryable());
        assert_eq!(store.list_order_items(order.id).await.unwrap().len(), 1);

        store.clear_faults().await;
        assert_eq!(store.insert_order_items(order.id, &items).await.unwrap(), 1);
        assert_eq!(store.list_order_items(order.id).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn orders_listed_newest_first() {
        let store = InMemoryStore::new();
        let user = UserId::new();

        let first = store.create_bag(user, UserId::new()).await.unwrap();
        let o1 = store.insert_order(new_order(&first)).await.unwrap();
        store
            .set_bag_status(first.id, BagStatus::CheckedOut)
            .await
            .unwrap();
        let second = store.create_bag(user, UserId::new()).await.unwrap();
        let o2 = store.insert_order(new_order(&second)).await.unwrap();

        let orders = store.list_orders_for_user(user).await.unwrap();
        assert_eq!(orders.len(), 2);
        assert!(orders[0].created_at >= orders[1].created_at);
        assert!(orders.iter().any(|o| o.id == o1.id));
        assert!(orders.iter().any(|o| o.id == o2.id));
    }

    #[tokio::test]
    async fn profile_upsert_replaces() {
        let store = InMemoryStore::new();
        let id = UserId::new();
        let mut profile = Profile {
            id,
            full_name: "Amara Obi".to_string(),
            email: "amara@example.com".to_string(),
            role: crate::ProfileRole::Customer,
        };
        store.upsert_profile(profile.clone()).await.unwrap();
        profile.email = "amara@new.example.com".to_string();
        store.upsert_profile(profile.clone()).await.unwrap();

        assert_eq!(store.get_profile(id).await.unwrap(), Some(profile));
    }
}
