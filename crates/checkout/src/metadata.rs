//! Checkout intent carried in payment session metadata.
//!
//! The metadata written at session creation is the only record of what the
//! session pays for. It must be enough to create the order later without
//! reading any other pending-checkout state.

use std::collections::HashMap;

use common::{BagId, UserId};
use store::ShippingAddress;

use crate::error::CheckoutError;

pub const BAG_ID_KEY: &str = "bag_id";
pub const USER_ID_KEY: &str = "user_id";
pub const TAILOR_ID_KEY: &str = "tailor_id";
pub const SHIPPING_ADDRESS_KEY: &str = "shipping_address";

/// What a bag checkout session pays for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutMetadata {
    pub bag_id: BagId,
    pub user_id: UserId,
    pub tailor_id: UserId,
    pub shipping_address: ShippingAddress,
}

impl CheckoutMetadata {
    /// Serializes into processor metadata. The address is stored as JSON.
    pub fn to_map(&self) -> Result<HashMap<String, String>, CheckoutError> {
        let address = serde_json::to_string(&self.shipping_address)
            .map_err(|e| CheckoutError::InvalidMetadata(format!("shipping address: {e}")))?;

        Ok(HashMap::from([
            (BAG_ID_KEY.to_string(), self.bag_id.to_string()),
            (USER_ID_KEY.to_string(), self.user_id.to_string()),
            (TAILOR_ID_KEY.to_string(), self.tailor_id.to_string()),
            (SHIPPING_ADDRESS_KEY.to_string(), address),
        ]))
    }

    /// Reads the intent back from processor metadata.
    ///
    /// Returns `Ok(None)` when there is no bag reference, meaning the session
    /// is not a bag checkout. A bag reference with missing or malformed
    /// companions is an error.
    pub fn from_map(metadata: &HashMap<String, String>) -> Result<Option<Self>, CheckoutError> {
        let Some(raw_bag_id) = metadata
            .get(BAG_ID_KEY)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
        else {
            return Ok(None);
        };

        let bag_id = BagId::parse(raw_bag_id).map_err(|e| invalid(BAG_ID_KEY, e))?;
        let user_id = UserId::parse(required(metadata, USER_ID_KEY)?)
            .map_err(|e| invalid(USER_ID_KEY, e))?;
        let tailor_id = UserId::parse(required(metadata, TAILOR_ID_KEY)?)
            .map_err(|e| invalid(TAILOR_ID_KEY, e))?;
        let shipping_address = serde_json::from_str(required(metadata, SHIPPING_ADDRESS_KEY)?)
            .map_err(|e| invalid(SHIPPING_ADDRESS_KEY, e))?;

        Ok(Some(Self {
            bag_id,
            user_id,
            tailor_id,
            shipping_address,
        }))
    }
}

fn required<'a>(
    metadata: &'a HashMap<String, String>,
    key: &'static str,
) -> Result<&'a str, CheckoutError> {
    metadata
        .get(key)
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| CheckoutError::InvalidMetadata(format!("missing {key}")))
}

fn invalid(key: &'static str, e: impl std::fmt::Display) -> CheckoutError {
    CheckoutError::InvalidMetadata(format!("malformed {key}: {e}"))
}
