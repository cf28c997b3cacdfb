//! HTTP route handlers.

pub mod bag;
pub mod checkout;
pub mod health;
pub mod metrics;
pub mod orders;

use ::checkout::{CheckoutReconciler, PaymentSessionInitiator};
use domain::{BagService, OrderQueries};
use store::Store;

/// Shared application state accessible from all handlers.
pub struct AppState<S: Store> {
    pub bags: BagService<S>,
    pub orders: OrderQueries<S>,
    pub initiator: PaymentSessionInitiator<S>,
    pub reconciler: CheckoutReconciler<S>,
    /// Name of the storage backend, reported by `/health`.
    pub storage: &'static str,
}
