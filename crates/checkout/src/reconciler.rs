//! Checkout reconciliation: turns a paid session into exactly one order.
//!
//! A bag's `checked_out` flag and the existence of its order record the same
//! fact. The order is authoritative; the flag is set last so a crash between
//! the two leaves an open bag with an order, which the next call completes.
//! A checked-out bag without an order is reported as an anomaly and never
//! repaired automatically.

use std::sync::Arc;

use common::OrderId;
use serde::Serialize;
use store::{Bag, BagItem, BagStatus, NewOrder, ORDERS_BAG_ID_KEY, Order, Store};

use crate::error::{CheckoutError, NotificationError, Result};
use crate::guard::ProcessedSessions;
use crate::metadata::CheckoutMetadata;
use crate::services::notification::{NotificationEvent, Notifier};
use crate::services::payment::{PaymentProcessor, PaymentSession, PaymentStatus};

/// Result of a successful reconcile call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ReconcileOutcome {
    /// The session paid for a bag and its order exists.
    OrderPlaced {
        order_id: OrderId,
        /// False only for the call that created the order.
        already_existing: bool,
    },

    /// The session carries no bag reference; nothing to do.
    NotBagCheckout,
}

impl ReconcileOutcome {
    /// The order ID, if the session was a bag checkout.
    pub fn order_id(&self) -> Option<OrderId> {
        match self {
            ReconcileOutcome::OrderPlaced { order_id, .. } => Some(*order_id),
            ReconcileOutcome::NotBagCheckout => None,
        }
    }

    /// Whether the order existed before this call.
    pub fn already_existing(&self) -> bool {
        matches!(
            self,
            ReconcileOutcome::OrderPlaced {
                already_existing: true,
                ..
            }
        )
    }

    fn replayed(self) -> Self {
        match self {
            ReconcileOutcome::OrderPlaced { order_id, .. } => ReconcileOutcome::OrderPlaced {
                order_id,
                already_existing: true,
            },
            other => other,
        }
    }

    fn label(&self) -> &'static str {
        match self {
            ReconcileOutcome::OrderPlaced {
                already_existing: false,
                ..
            } => "created",
            ReconcileOutcome::OrderPlaced { .. } => "already_existing",
            ReconcileOutcome::NotBagCheckout => "not_bag_checkout",
        }
    }
}

/// Verifies payment sessions and materializes their orders.
///
/// Safe to call any number of times, concurrently, for the same session:
/// the storage constraint on `orders.bag_id` admits one order per bag and
/// every other caller converges on it.
pub struct CheckoutReconciler<S: Store> {
    store: S,
    payments: Arc<dyn PaymentProcessor>,
    notifier: Arc<dyn Notifier>,
    guard: Arc<ProcessedSessions>,
}

impl<S: Store> CheckoutReconciler<S> {
    pub fn new(
        store: S,
        payments: Arc<dyn PaymentProcessor>,
        notifier: Arc<dyn Notifier>,
        guard: Arc<ProcessedSessions>,
    ) -> Self {
        Self {
            store,
            payments,
            notifier,
            guard,
        }
    }

    /// Returns the de-duplication guard.
    pub fn guard(&self) -> &Arc<ProcessedSessions> {
        &self.guard
    }

    /// Reconciles a payment session with its bag.
    #[tracing::instrument(skip(self))]
    pub async fn reconcile(&self, session_id: &str) -> Result<ReconcileOutcome> {
        let start = std::time::Instant::now();
        let result = self.run(session_id.trim()).await;

        let outcome = match &result {
            Ok(outcome) => outcome.label(),
            Err(e) => e.kind(),
        };
        metrics::counter!("reconcile_total", "outcome" => outcome).increment(1);
        metrics::histogram!("reconcile_duration_seconds").record(start.elapsed().as_secs_f64());

        result
    }

    async fn run(&self, session_id: &str) -> Result<ReconcileOutcome> {
        if session_id.is_empty() {
            return Err(CheckoutError::MissingSessionId);
        }
        if !is_valid_session_id(session_id) {
            return Err(CheckoutError::InvalidSessionId(session_id.to_string()));
        }

        // 1. Recently processed: answer without calling the processor.
        if let Some(previous) = self.guard.get(session_id).await {
            metrics::counter!("reconcile_replays_total", "source" => "guard").increment(1);
            tracing::info!("session reconciled recently, returning recorded outcome");
            return Ok(previous.replayed());
        }

        // 2. Verify payment.
        let session = self.payments.retrieve_session(session_id).await?;
        if session.payment_status != PaymentStatus::Paid {
            tracing::info!(status = %session.payment_status, "payment not completed");
            return Err(CheckoutError::PaymentIncomplete {
                session_id: session_id.to_string(),
                status: session.payment_status,
            });
        }

        // 3. Extract intent.
        let Some(intent) = CheckoutMetadata::from_map(&session.metadata)? else {
            tracing::info!("session has no bag reference, nothing to reconcile");
            let outcome = ReconcileOutcome::NotBagCheckout;
            self.guard.record(session_id, outcome).await;
            return Ok(outcome);
        };

        // 4. Authoritative check: bag status and order existence.
        let bag = self
            .store
            .get_bag(intent.bag_id)
            .await?
            .ok_or(CheckoutError::BagNotFound(intent.bag_id))?;
        if bag.user_id != intent.user_id || bag.tailor_id != intent.tailor_id {
            return Err(CheckoutError::InvalidMetadata(format!(
                "bag {} does not belong to the session's customer and tailor",
                bag.id
            )));
        }

        let existing = self.store.find_order_by_bag(bag.id).await?;
        let outcome = match (bag.status, existing) {
            (BagStatus::CheckedOut, Some(order)) => {
                metrics::counter!("reconcile_replays_total", "source" => "store").increment(1);
                tracing::info!(order_id = %order.id, "order already exists for bag");
                ReconcileOutcome::OrderPlaced {
                    order_id: order.id,
                    already_existing: true,
                }
            }
            (BagStatus::CheckedOut, None) => {
                metrics::counter!("reconcile_anomalies_total").increment(1);
                tracing::error!(
                    bag_id = %bag.id,
                    %session_id,
                    "bag is checked out but has no order; manual remediation required"
                );
                return Err(CheckoutError::Anomaly {
                    bag_id: bag.id,
                    session_id: session_id.to_string(),
                });
            }
            (BagStatus::Open, Some(order)) => {
                tracing::warn!(
                    order_id = %order.id,
                    "order exists but bag is still open, completing checkout"
                );
                let items = self.store.list_bag_items(bag.id).await?;
                self.finish(&bag, &order, &items).await?;
                metrics::counter!("reconcile_replays_total", "source" => "resume").increment(1);
                ReconcileOutcome::OrderPlaced {
                    order_id: order.id,
                    already_existing: true,
                }
            }
            (BagStatus::Open, None) => self.place_order(&session, intent, &bag).await?,
        };

        // 10. Remember the outcome for near-duplicate calls.
        self.guard.record(session_id, outcome).await;
        Ok(outcome)
    }

    async fn place_order(
        &self,
        session: &PaymentSession,
        intent: CheckoutMetadata,
        bag: &Bag,
    ) -> Result<ReconcileOutcome> {
        // 5. Snapshot items.
        let items = self.store.list_bag_items(bag.id).await?;
        if items.is_empty() {
            return Err(CheckoutError::EmptyBag);
        }

        // 6. Create the order. The total is what the processor charged.
        let new_order = NewOrder {
            user_id: intent.user_id,
            tailor_id: intent.tailor_id,
            bag_id: bag.id,
            session_id: session.id.clone(),
            total_cents: session.amount_total,
            shipping_address: intent.shipping_address,
        };

        let (order, created) = match self.store.insert_order(new_order).await {
            Ok(order) => (order, true),
            Err(e) if e.is_unique_violation_of(ORDERS_BAG_ID_KEY) => {
                let order = self
                    .store
                    .find_order_by_bag(bag.id)
                    .await?
                    .ok_or(CheckoutError::Store(e))?;
                metrics::counter!("reconcile_replays_total", "source" => "race").increment(1);
                tracing::info!(order_id = %order.id, "lost order creation race, using winner");
                (order, false)
            }
            Err(e) => return Err(e.into()),
        };

        if created {
            metrics::counter!("orders_created_total").increment(1);
            tracing::info!(
                order_id = %order.id,
                bag_id = %bag.id,
                total_cents = order.total_cents,
                "order created"
            );
        }

        // 7-9. Items, notification, close bag.
        self.finish(bag, &order, &items).await?;

        Ok(ReconcileOutcome::OrderPlaced {
            order_id: order.id,
            already_existing: !created,
        })
    }

    /// Copies items, notifies and closes the bag.
    ///
    /// Only the call whose copy inserted item rows sends the order-placed
    /// notification. The copy is one batch per call, so a replay or a lost
    /// race inserts nothing, while a retry after a partial copy inserts the
    /// remaining lines and notifies once.
    async fn finish(&self, bag: &Bag, order: &Order, items: &[BagItem]) -> Result<()> {
        let inserted = match self.store.insert_order_items(order.id, items).await {
            Ok(inserted) => inserted,
            Err(source) => {
                tracing::error!(
                    order_id = %order.id,
                    error = %source,
                    "order items incomplete; order kept for follow-up"
                );
                return Err(CheckoutError::OrderItemsIncomplete {
                    order_id: order.id,
                    source,
                });
            }
        };
        tracing::debug!(order_id = %order.id, inserted, "order items ensured");

        if inserted > 0 {
            self.notify_order_placed(order, items.len()).await;
        }

        self.store.set_bag_status(bag.id, BagStatus::CheckedOut).await?;
        Ok(())
    }

    async fn notify_order_placed(&self, order: &Order, item_count: usize) {
        if let Err(e) = self.try_notify(order, item_count).await {
            metrics::counter!("notifications_failed_total").increment(1);
            tracing::warn!(order_id = %order.id, error = %e, "order notification failed");
        }
    }

    async fn try_notify(
        &self,
        order: &Order,
        item_count: usize,
    ) -> std::result::Result<(), NotificationError> {
        let lookup = |e: store::StoreError| NotificationError::Lookup(e.to_string());
        let customer = self
            .store
            .get_profile(order.user_id)
            .await
            .map_err(lookup)?
            .ok_or(NotificationError::MissingProfile { role: "customer" })?;
        let tailor = self
            .store
            .get_profile(order.tailor_id)
            .await
            .map_err(lookup)?
            .ok_or(NotificationError::MissingProfile { role: "tailor" })?;

        self.notifier
            .send(
                NotificationEvent::OrderPlaced,
                order,
                &customer,
                &tailor,
                &serde_json::json!({ "item_count": item_count }),
            )
            .await
    }
}

/// Processor session IDs are ASCII letters, digits and underscores.
fn is_valid_session_id(session_id: &str) -> bool {
    session_id
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_')
}
