//! Shipping address validation.

use store::ShippingAddress;

use crate::error::DomainError;

/// Checks that every required field is present and returns a trimmed copy.
///
/// Street, city, state and postal code must be non-empty after trimming.
/// A blank country is dropped.
pub fn validate_shipping_address(
    address: &ShippingAddress,
) -> Result<ShippingAddress, DomainError> {
    let trimmed = ShippingAddress {
        street: address.street.trim().to_string(),
        city: address.city.trim().to_string(),
        state: address.state.trim().to_string(),
        postal_code: address.postal_code.trim().to_string(),
        country: address
            .country
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .map(str::to_string),
    };

    let missing: Vec<&'static str> = [
        ("street", &trimmed.street),
        ("city", &trimmed.city),
        ("state", &trimmed.state),
        ("postal_code", &trimmed.postal_code),
    ]
    .into_iter()
    .filter(|(_, value)| value.is_empty())
    .map(|(name, _)| name)
    .collect();

    if !missing.is_empty() {
        return Err(DomainError::InvalidAddress { missing });
    }

    Ok(trimmed)
}
