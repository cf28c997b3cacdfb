//! Payment session initiation.

use std::sync::Arc;

use common::{BagId, UserId};
use domain::{Money, price_items, validate_shipping_address};
use serde::Serialize;
use store::{ShippingAddress, Store};

use crate::error::{CheckoutError, Result};
use crate::metadata::CheckoutMetadata;
use crate::services::payment::{CreateSessionRequest, LineItem, PaymentProcessor};

/// Placeholder the processor substitutes with the real session ID.
pub const SESSION_ID_PLACEHOLDER: &str = "{CHECKOUT_SESSION_ID}";

/// Where the hosted payment page sends the customer back to.
#[derive(Debug, Clone)]
pub struct CheckoutSettings {
    /// ISO currency code used for every line.
    pub currency: String,
    /// Public storefront origin, without trailing slash.
    pub public_base_url: String,
}

impl CheckoutSettings {
    pub fn success_url(&self) -> String {
        format!(
            "{}/checkout/success?session_id={SESSION_ID_PLACEHOLDER}",
            self.public_base_url.trim_end_matches('/')
        )
    }

    pub fn cancel_url(&self) -> String {
        format!("{}/bag", self.public_base_url.trim_end_matches('/'))
    }
}

impl Default for CheckoutSettings {
    fn default() -> Self {
        Self {
            currency: "usd".to_string(),
            public_base_url: "http://localhost:3000".to_string(),
        }
    }
}

/// A created payment session the client should redirect to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CheckoutSession {
    pub session_id: String,
    pub url: String,
    pub bag_id: BagId,
    pub total: Money,
}

/// Creates hosted payment sessions for a user's open bag.
///
/// Nothing is written locally: the bag stays open until the reconciler sees
/// the payment completed.
pub struct PaymentSessionInitiator<S: Store> {
    store: S,
    payments: Arc<dyn PaymentProcessor>,
    settings: CheckoutSettings,
}

impl<S: Store> PaymentSessionInitiator<S> {
    pub fn new(store: S, payments: Arc<dyn PaymentProcessor>, settings: CheckoutSettings) -> Self {
        Self {
            store,
            payments,
            settings,
        }
    }

    /// Prices the caller's open bag and creates a payment session for it.
    ///
    /// The address, the bag and its items are all checked before the
    /// processor is called.
    #[tracing::instrument(skip(self, address))]
    pub async fn start_checkout(
        &self,
        user_id: UserId,
        address: &ShippingAddress,
    ) -> Result<CheckoutSession> {
        let shipping_address = validate_shipping_address(address)?;

        let bag = self
            .store
            .find_open_bag(user_id)
            .await?
            .ok_or(CheckoutError::NoOpenBag)?;
        let items = self.store.list_bag_items(bag.id).await?;
        if items.is_empty() {
            return Err(CheckoutError::EmptyBag);
        }

        let breakdown = price_items(&items).map_err(domain::DomainError::from)?;
        let metadata = CheckoutMetadata {
            bag_id: bag.id,
            user_id,
            tailor_id: bag.tailor_id,
            shipping_address,
        }
        .to_map()?;

        let customer_email = self
            .store
            .get_profile(user_id)
            .await?
            .map(|profile| profile.email)
            .filter(|email| !email.is_empty());

        let request = CreateSessionRequest {
            line_items: breakdown
                .lines
                .iter()
                .map(|line| LineItem {
                    description: line.description.clone(),
                    unit_amount: line.unit_amount.cents(),
                    quantity: 1,
                })
                .collect(),
            currency: self.settings.currency.clone(),
            success_url: self.settings.success_url(),
            cancel_url: self.settings.cancel_url(),
            metadata,
            customer_email,
        };

        let created = self.payments.create_session(request).await.inspect_err(|e| {
            tracing::error!(bag_id = %bag.id, error = %e, "failed to create payment session");
        })?;

        metrics::counter!("checkout_sessions_created_total").increment(1);
        tracing::info!(
            bag_id = %bag.id,
            session_id = %created.id,
            total_cents = breakdown.total.cents(),
            lines = breakdown.lines.len(),
            "payment session created"
        );

        Ok(CheckoutSession {
            session_id: created.id,
            url: created.url,
            bag_id: bag.id,
            total: breakdown.total,
        })
    }
}
