//! Domain layer for the tailoring storefront.
//!
//! This crate provides:
//! - Pricing of bag items in minor currency units
//! - Bag rules (one open bag per user, one tailor per bag)
//! - Shipping address validation
//! - Order queries scoped to the customer and tailor

pub mod address;
pub mod bag;
pub mod error;
pub mod money;
pub mod order;
pub mod pricing;

pub use address::validate_shipping_address;
pub use bag::{AddedItem, BagService, BagView};
pub use error::{BagError, DomainError, PricingError};
pub use money::Money;
pub use order::{OrderDetails, OrderQueries};
pub use pricing::{PriceBreakdown, PricedLine, describe, item_amount, line_amount, price_items};
