//! HTTP email API notifier.

use std::time::Duration;

use async_trait::async_trait;
use domain::Money;
use serde::Serialize;
use store::{Order, Profile};

use crate::error::NotificationError;
use crate::services::notification::{NotificationEvent, Notifier};

/// Connection settings for the email API.
#[derive(Clone)]
pub struct EmailConfig {
    pub api_key: String,
    /// Base URL; messages are posted to `{api_base}/emails`.
    pub api_base: String,
    pub from: String,
    pub timeout: Duration,
}

impl std::fmt::Debug for EmailConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmailConfig")
            .field("api_key", &"<redacted>")
            .field("api_base", &self.api_base)
            .field("from", &self.from)
            .field("timeout", &self.timeout)
            .finish()
    }
}

#[derive(Debug, Serialize, PartialEq)]
pub(crate) struct EmailMessage {
    pub from: String,
    pub to: Vec<String>,
    pub subject: String,
    pub text: String,
}

/// Sends one email to the customer and one to the tailor per event.
#[derive(Debug, Clone)]
pub struct HttpEmailNotifier {
    config: EmailConfig,
    client: reqwest::Client,
}

impl HttpEmailNotifier {
    pub fn new(config: EmailConfig) -> Result<Self, NotificationError> {
        let client = reqwest::Client::builder()
            .use_rustls_tls()
            .timeout(config.timeout)
            .build()
            .map_err(|e| NotificationError::Delivery(format!("failed to build HTTP client: {e}")))?;

        Ok(Self { config, client })
    }

    async fn post(&self, message: &EmailMessage) -> Result<(), NotificationError> {
        let url = format!("{}/emails", self.config.api_base.trim_end_matches('/'));
        let response = self
            .client
            .post(url)
            .bearer_auth(&self.config.api_key)
            .json(message)
            .send()
            .await
            .map_err(|e| NotificationError::Delivery(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(NotificationError::Delivery(format!("{status}: {body}")));
        }
        Ok(())
    }
}

pub(crate) fn compose(
    from: &str,
    event: NotificationEvent,
    order: &Order,
    customer: &Profile,
    tailor: &Profile,
) -> [EmailMessage; 2] {
    let subject = event.subject(order.id);
    let status_line = match event {
        NotificationEvent::OrderPlaced => "has been placed",
        NotificationEvent::OrderAccepted => "was accepted by the tailor",
        NotificationEvent::OrderShipped => "is on its way",
        NotificationEvent::OrderDelivered => "was delivered",
        NotificationEvent::OrderCancelled => "was cancelled",
    };
    let total = Money::from_cents(order.total_cents);

    let to_customer = EmailMessage {
        from: from.to_string(),
        to: vec![customer.email.clone()],
        subject: subject.clone(),
        text: format!(
            "Hi {},\n\nYour order {} with {} {}. Total: {}.\n",
            customer.full_name, order.id, tailor.full_name, status_line, total
        ),
    };
    let to_tailor = EmailMessage {
        from: from.to_string(),
        to: vec![tailor.email.clone()],
        subject,
        text: format!(
            "Hi {},\n\nOrder {} from {} {}. Total: {}.\nShip to: {}, {}, {} {}\n",
            tailor.full_name,
            order.id,
            customer.full_name,
            status_line,
            total,
            order.shipping_address.street,
            order.shipping_address.city,
            order.shipping_address.state,
            order.shipping_address.postal_code,
        ),
    };

    [to_customer, to_tailor]
}

#[async_trait]
impl Notifier for HttpEmailNotifier {
    #[tracing::instrument(skip_all, fields(%event, order_id = %order.id))]
    async fn send(
        &self,
        event: NotificationEvent,
        order: &Order,
        customer: &Profile,
        tailor: &Profile,
        _extra: &serde_json::Value,
    ) -> Result<(), NotificationError> {
        let mut failures = Vec::new();
        for message in compose(&self.config.from, event, order, customer, tailor) {
            if let Err(e) = self.post(&message).await {
                failures.push(format!("{}: {e}", message.to.join(",")));
            }
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(NotificationError::Delivery(failures.join("; ")))
        }
    }
}
