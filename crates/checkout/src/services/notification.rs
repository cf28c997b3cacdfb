//! Notifier trait, in-memory recorder and a logging fallback.

use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use serde::Serialize;
use store::{Order, OrderId, Profile};

use crate::error::NotificationError;

/// Order events customers and tailors are notified about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationEvent {
    OrderPlaced,
    OrderAccepted,
    OrderShipped,
    OrderDelivered,
    OrderCancelled,
}

impl NotificationEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationEvent::OrderPlaced => "order_placed",
            NotificationEvent::OrderAccepted => "order_accepted",
            NotificationEvent::OrderShipped => "order_shipped",
            NotificationEvent::OrderDelivered => "order_delivered",
            NotificationEvent::OrderCancelled => "order_cancelled",
        }
    }

    /// Email subject line for the event.
    pub fn subject(&self, order_id: OrderId) -> String {
        let what = match self {
            NotificationEvent::OrderPlaced => "placed",
            NotificationEvent::OrderAccepted => "accepted",
            NotificationEvent::OrderShipped => "shipped",
            NotificationEvent::OrderDelivered => "delivered",
            NotificationEvent::OrderCancelled => "cancelled",
        };
        format!("Order {order_id} {what}")
    }
}

impl std::fmt::Display for NotificationEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Trait for delivering order notifications.
///
/// Callers treat delivery as best effort: an error is logged, never
/// propagated into the outcome of the operation that triggered it.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(
        &self,
        event: NotificationEvent,
        order: &Order,
        customer: &Profile,
        tailor: &Profile,
        extra: &serde_json::Value,
    ) -> Result<(), NotificationError>;
}

/// A notification captured by [`InMemoryNotifier`].
#[derive(Debug, Clone, PartialEq)]
pub struct SentNotification {
    pub event: NotificationEvent,
    pub order_id: OrderId,
    pub customer_email: String,
    pub tailor_email: String,
    pub extra: serde_json::Value,
}

#[derive(Debug, Default)]
struct InMemoryNotifierState {
    sent: Vec<SentNotification>,
    fail_on_send: bool,
    attempts: usize,
}

/// In-memory notifier for testing.
#[derive(Debug, Clone, Default)]
pub struct InMemoryNotifier {
    state: Arc<RwLock<InMemoryNotifierState>>,
}

impl InMemoryNotifier {
    /// Creates a new in-memory notifier.
    pub fn new() -> Self {
        Self::default()
    }

    /// Configures the notifier to fail every send.
    pub fn set_fail_on_send(&self, fail: bool) {
        self.state.write().unwrap().fail_on_send = fail;
    }

    /// Returns the notifications delivered so far.
    pub fn sent(&self) -> Vec<SentNotification> {
        self.state.read().unwrap().sent.clone()
    }

    /// Returns the number of send attempts, including failed ones.
    pub fn attempts(&self) -> usize {
        self.state.read().unwrap().attempts
    }
}

#[async_trait]
impl Notifier for InMemoryNotifier {
    async fn send(
        &self,
        event: NotificationEvent,
        order: &Order,
        customer: &Profile,
        tailor: &Profile,
        extra: &serde_json::Value,
    ) -> Result<(), NotificationError> {
        let mut state = self.state.write().unwrap();
        state.attempts += 1;

        if state.fail_on_send {
            return Err(NotificationError::Delivery("Mailbox unavailable".to_string()));
        }

        state.sent.push(SentNotification {
            event,
            order_id: order.id,
            customer_email: customer.email.clone(),
            tailor_email: tailor.email.clone(),
            extra: extra.clone(),
        });
        Ok(())
    }
}

/// Notifier that only logs; used when no email provider is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(
        &self,
        event: NotificationEvent,
        order: &Order,
        customer: &Profile,
        tailor: &Profile,
        _extra: &serde_json::Value,
    ) -> Result<(), NotificationError> {
        tracing::info!(
            %event,
            order_id = %order.id,
            customer = %customer.email,
            tailor = %tailor.email,
            "notification not delivered, no email provider configured"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use store::{BagId, OrderStatus, ProfileRole, ShippingAddress, UserId};

    fn order() -> Order {
        Order {
            id: OrderId::new(),
            user_id: UserId::new(),
            tailor_id: UserId::new(),
            bag_id: BagId::new(),
            session_id: "cs_test_n".to_string(),
            status: OrderStatus::Pending,
            total_cents: 3500,
            shipping_address: ShippingAddress::default(),
            created_at: Utc::now(),
        }
    }

    fn profile(role: ProfileRole, email: &str) -> Profile {
        Profile {
            id: UserId::new(),
            full_name: "Test".to_string(),
            email: email.to_string(),
            role,
        }
    }

    #[tokio::test]
    async fn records_sent_notifications() {
        let notifier = InMemoryNotifier::new();
        let order = order();
        notifier
            .send(
                NotificationEvent::OrderPlaced,
                &order,
                &profile(ProfileRole::Customer, "c@example.com"),
                &profile(ProfileRole::Tailor, "t@example.com"),
                &serde_json::json!({ "item_count": 2 }),
            )
            .await
            .unwrap();

        let sent = notifier.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].event, NotificationEvent::OrderPlaced);
        assert_eq!(sent[0].order_id, order.id);
        assert_eq!(sent[0].tailor_email, "t@example.com");
    }

    #[tokio::test]
    async fn fail_on_send() {
        let notifier = InMemoryNotifier::new();
        notifier.set_fail_on_send(true);

        let result = notifier
            .send(
                NotificationEvent::OrderShipped,
                &order(),
                &profile(ProfileRole::Customer, "c@example.com"),
                &profile(ProfileRole::Tailor, "t@example.com"),
                &serde_json::Value::Null,
            )
            .await;
        assert!(matches!(result, Err(NotificationError::Delivery(_))));
        assert!(notifier.sent().is_empty());
        assert_eq!(notifier.attempts(), 1);
    }

    #[test]
    fn subjects_name_the_event() {
        let id = OrderId::new();
        assert_eq!(
            NotificationEvent::OrderPlaced.subject(id),
            format!("Order {id} placed")
        );
        assert_eq!(NotificationEvent::OrderCancelled.as_str(), "order_cancelled");
    }
}
