//! Bag service: add, remove and fetch items in a user's open bag.

use serde::Serialize;
use store::{BAGS_ONE_OPEN_PER_USER, Bag, BagItem, BagItemId, NewBagItem, Store, UserId};

use crate::error::{BagError, DomainError};
use crate::money::Money;
use crate::pricing::{line_amount, price_items};

/// The open bag with its items and current subtotal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BagView {
    pub bag: Bag,
    pub items: Vec<BagItem>,
    pub subtotal: Money,
}

/// Result of adding an item to a bag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AddedItem {
    pub bag: Bag,
    pub item: BagItem,
    /// Whether the bag was created by this call.
    pub bag_created: bool,
}

/// Service for managing a user's open bag.
///
/// A user holds at most one open bag, and an open bag belongs to a single
/// tailor. Both rules are checked before any write so a rejected add leaves
/// no rows behind.
#[derive(Clone)]
pub struct BagService<S: Store> {
    store: S,
}

impl<S: Store> BagService<S> {
    /// Creates a new bag service over the given store.
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Returns a reference to the underlying store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Adds a configured design to the user's open bag, creating the bag if
    /// none is open.
    #[tracing::instrument(skip(self, item), fields(design_id = %item.design_id))]
    pub async fn add_item(
        &self,
        user_id: UserId,
        tailor_id: UserId,
        item: NewBagItem,
    ) -> Result<AddedItem, DomainError> {
        if item.design_id.trim().is_empty() {
            return Err(BagError::DesignRequired.into());
        }
        line_amount(item.price, item.fabric.as_ref())?;

        let (bag, bag_created) = self.resolve_open_bag(user_id, tailor_id).await?;
        let item = self.store.insert_bag_item(bag.id, item).await?;

        metrics::counter!("bag_items_added_total").increment(1);
        tracing::info!(bag_id = %bag.id, item_id = %item.id, bag_created, "item added to bag");

        Ok(AddedItem {
            bag,
            item,
            bag_created,
        })
    }

    /// Removes an item from the user's open bag.
    #[tracing::instrument(skip(self))]
    pub async fn remove_item(
        &self,
        user_id: UserId,
        item_id: BagItemId,
    ) -> Result<(), DomainError> {
        let bag = self
            .store
            .find_open_bag(user_id)
            .await?
            .ok_or(BagError::NoOpenBag)?;

        if !self.store.delete_bag_item(bag.id, item_id).await? {
            return Err(BagError::ItemNotFound { item_id }.into());
        }

        tracing::info!(bag_id = %bag.id, %item_id, "item removed from bag");
        Ok(())
    }

    /// Returns the user's open bag with its items, or None if no bag is open.
    #[tracing::instrument(skip(self))]
    pub async fn get_bag(&self, user_id: UserId) -> Result<Option<BagView>, DomainError> {
        let Some(bag) = self.store.find_open_bag(user_id).await? else {
            return Ok(None);
        };
        let items = self.store.list_bag_items(bag.id).await?;
        let subtotal = price_items(&items)?.total;

        Ok(Some(BagView {
            bag,
            items,
            subtotal,
        }))
    }

    async fn resolve_open_bag(
        &self,
        user_id: UserId,
        tailor_id: UserId,
    ) -> Result<(Bag, bool), DomainError> {
        if let Some(bag) = self.store.find_open_bag(user_id).await? {
            return ensure_same_tailor(bag, tailor_id).map(|bag| (bag, false));
        }

        match self.store.create_bag(user_id, tailor_id).await {
            Ok(bag) => Ok((bag, true)),
            Err(e) if e.is_unique_violation_of(BAGS_ONE_OPEN_PER_USER) => {
                // A concurrent add created the bag first.
                let bag = self
                    .store
                    .find_open_bag(user_id)
                    .await?
                    .ok_or(DomainError::Store(e))?;
                ensure_same_tailor(bag, tailor_id).map(|bag| (bag, false))
            }
            Err(e) => Err(e.into()),
        }
    }
}

fn ensure_same_tailor(bag: Bag, tailor_id: UserId) -> Result<Bag, DomainError> {
    if bag.tailor_id != tailor_id {
        return Err(BagError::TailorMismatch {
            open_tailor: bag.tailor_id,
            requested_tailor: tailor_id,
        }
        .into());
    }
    Ok(bag)
}
