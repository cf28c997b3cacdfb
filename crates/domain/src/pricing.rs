//! Pricing calculator for bag items.
//!
//! A line's amount is the stitching price plus fabric cost (price per yard
//! times yards), with absent values counting as zero. Amounts are converted to
//! minor units by multiplying by 100 and rounding half away from zero. The
//! total is the sum of the rounded lines, so it always matches what the
//! processor charges line by line.
//!
//! Inputs carry at most two decimal places and stay below the storage
//! column limits: prices and fabric price per yard below 10^10, yards below
//! 10^6.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::Serialize;
use store::{BagItem, BagItemId, FabricSelection};

use crate::error::PricingError;
use crate::money::Money;

/// One payable line derived from a bag item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PricedLine {
    pub bag_item_id: BagItemId,
    pub description: String,
    pub unit_amount: Money,
}

/// Payable lines and their total.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PriceBreakdown {
    pub lines: Vec<PricedLine>,
    pub total: Money,
}

/// Upper bound (exclusive) for prices and fabric price per yard.
pub const MAX_PRICE: Decimal = Decimal::from_parts(1_410_065_408, 2, 0, false, 0);

/// Upper bound (exclusive) for fabric yards.
pub const MAX_YARDS: Decimal = Decimal::from_parts(1_000_000, 0, 0, false, 0);

fn checked_input(
    field: &'static str,
    value: Decimal,
    limit: Decimal,
) -> Result<Decimal, PricingError> {
    if value.is_sign_negative() && !value.is_zero() {
        return Err(PricingError::NegativeAmount { field, value });
    }
    if value.normalize().scale() > 2 {
        return Err(PricingError::TooPrecise { field, value });
    }
    if value >= limit {
        return Err(PricingError::TooLarge {
            field,
            value,
            limit,
        });
    }
    Ok(value)
}

/// Converts a major-unit amount to minor units, rounding half away from zero.
pub fn to_minor_units(field: &'static str, amount: Decimal) -> Result<Money, PricingError> {
    let scaled = amount
        .checked_mul(Decimal::ONE_HUNDRED)
        .ok_or(PricingError::Overflow { field })?;
    scaled
        .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
        .to_i64()
        .map(Money::from_cents)
        .ok_or(PricingError::Overflow { field })
}

/// Computes the major-unit amount for a stitching price and fabric choice.
pub fn line_amount(
    stitching_price: Decimal,
    fabric: Option<&FabricSelection>,
) -> Result<Decimal, PricingError> {
    let stitching = checked_input("price", stitching_price, MAX_PRICE)?;
    let (per_yard, yards) = match fabric {
        Some(f) => (
            checked_input(
                "fabric price per yard",
                f.price_per_yard.unwrap_or_default(),
                MAX_PRICE,
            )?,
            checked_input("fabric yards", f.yards.unwrap_or_default(), MAX_YARDS)?,
        ),
        None => (Decimal::ZERO, Decimal::ZERO),
    };

    per_yard
        .checked_mul(yards)
        .and_then(|fabric_cost| stitching.checked_add(fabric_cost))
        .ok_or(PricingError::Overflow { field: "price" })
}

/// Computes the payable minor-unit amount of one bag item.
pub fn item_amount(item: &BagItem) -> Result<Money, PricingError> {
    let amount = line_amount(item.price, item.fabric.as_ref())?;
    to_minor_units("price", amount)
}

/// Builds the human-readable description of a bag item.
pub fn describe(item: &BagItem) -> String {
    let mut details = Vec::new();
    if let Some(fabric) = &item.fabric {
        let mut part = format!("fabric {}", fabric.fabric_id);
        if let Some(yards) = fabric.yards {
            part.push_str(&format!(" x {} yd", yards.normalize()));
        }
        details.push(part);
    }
    if let Some(color) = &item.color {
        details.push(format!("color {color}"));
    }
    if let Some(style) = &item.style {
        details.push(format!("style {style}"));
    }

    if details.is_empty() {
        item.design_name.clone()
    } else {
        format!("{} ({})", item.design_name, details.join(", "))
    }
}

/// Prices every item and sums the rounded lines.
pub fn price_items(items: &[BagItem]) -> Result<PriceBreakdown, PricingError> {
    let mut lines = Vec::with_capacity(items.len());
    let mut total = Money::zero();

    for item in items {
        let unit_amount = item_amount(item)?;
        total = total
            .checked_add(unit_amount)
            .ok_or(PricingError::Overflow { field: "total" })?;
        lines.push(PricedLine {
            bag_item_id: item.id,
            description: describe(item),
            unit_amount,
        });
    }

    Ok(PriceBreakdown { lines, total })
}
