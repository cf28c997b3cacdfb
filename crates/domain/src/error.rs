//! Domain error types.

use common::{BagItemId, UserId};
use rust_decimal::Decimal;
use store::StoreError;
use thiserror::Error;

/// Errors raised by the pricing calculator.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PricingError {
    /// A price or quantity was negative.
    #[error("Invalid {field}: {value} (must not be negative)")]
    NegativeAmount { field: &'static str, value: Decimal },

    /// The computed amount does not fit in minor units.
    #[error("Amount for {field} is out of range")]
    Overflow { field: &'static str },

    /// A value has more than two decimal places.
    #[error("Invalid {field}: {value} (at most 2 decimal places)")]
    TooPrecise { field: &'static str, value: Decimal },

    /// A value exceeds what a bag item can store.
    #[error("Invalid {field}: {value} (must be less than {limit})")]
    TooLarge {
        field: &'static str,
        value: Decimal,
        limit: Decimal,
    },
}

/// Errors raised by bag rules.
#[derive(Debug, Error)]
pub enum BagError {
    /// The user already has an open bag with a different tailor.
    #[error(
        "Your bag already holds items from another tailor ({open_tailor}); check out or empty it before adding items from {requested_tailor}"
    )]
    TailorMismatch {
        open_tailor: UserId,
        requested_tailor: UserId,
    },

    /// The user has no open bag.
    #[error("No open bag")]
    NoOpenBag,

    /// The item is not in the user's open bag.
    #[error("Bag item not found: {item_id}")]
    ItemNotFound { item_id: BagItemId },

    /// The item has no design reference.
    #[error("Design ID is required")]
    DesignRequired,

    /// The bag has no items.
    #[error("Bag is empty")]
    Empty,
}

/// Errors that can occur during domain operations.
#[derive(Debug, Error)]
pub enum DomainError {
    /// An error occurred in the store.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// A bag rule was violated.
    #[error("Bag error: {0}")]
    Bag(BagError),

    /// A price could not be computed.
    #[error("Pricing error: {0}")]
    Pricing(#[from] PricingError),

    /// The shipping address is missing required fields.
    #[error("Shipping address is missing: {}", missing.join(", "))]
    InvalidAddress { missing: Vec<&'static str> },

    /// The requested record does not exist or is not visible to the caller.
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },
}

impl From<BagError> for DomainError {
    fn from(e: BagError) -> Self {
        DomainError::Bag(e)
    }
}
