//! Checkout error types.

use common::{BagId, OrderId};
use domain::DomainError;
use store::StoreError;
use thiserror::Error;

use crate::services::payment::PaymentStatus;

/// Errors returned by the payment processor.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PaymentError {
    /// The processor did not answer in time.
    #[error("Payment processor timed out: {0}")]
    Timeout(String),

    /// The processor could not be reached or failed on its side.
    #[error("Payment processor unavailable: {0}")]
    Unavailable(String),

    /// The processor rejected the request.
    #[error("Payment processor rejected the request ({status}): {message}")]
    Rejected { status: u16, message: String },

    /// No session exists for the reference.
    #[error("Payment session not found: {0}")]
    SessionNotFound(String),

    /// The processor answered with something we could not interpret.
    #[error("Invalid payment processor response: {0}")]
    InvalidResponse(String),
}

impl PaymentError {
    /// Returns true if calling again may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, PaymentError::Timeout(_) | PaymentError::Unavailable(_))
    }
}

/// Errors returned by a notifier.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NotificationError {
    /// The recipient's profile could not be found.
    #[error("No {role} profile for notification")]
    MissingProfile { role: &'static str },

    /// Looking up recipients failed.
    #[error("Recipient lookup failed: {0}")]
    Lookup(String),

    /// The message could not be delivered.
    #[error("Notification delivery failed: {0}")]
    Delivery(String),
}

/// Errors that can occur during checkout operations.
#[derive(Debug, Error)]
pub enum CheckoutError {
    /// A bag, pricing or address rule was violated.
    #[error(transparent)]
    Domain(#[from] DomainError),

    /// Storage error.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Payment processor error.
    #[error("Payment processor error: {0}")]
    Payment(#[from] PaymentError),

    /// The session reference was empty.
    #[error("Session ID is required")]
    MissingSessionId,

    /// The session reference contains characters no processor ID uses.
    #[error("Invalid session ID: {0}")]
    InvalidSessionId(String),

    /// The caller has no open bag to check out.
    #[error("No open bag to check out")]
    NoOpenBag,

    /// The bag has no items.
    #[error("Bag is empty")]
    EmptyBag,

    /// The bag referenced by the session does not exist.
    #[error("Bag not found: {0}")]
    BagNotFound(BagId),

    /// The processor does not report the session as paid.
    #[error("Payment not completed for session {session_id} (status: {status})")]
    PaymentIncomplete {
        session_id: String,
        status: PaymentStatus,
    },

    /// The session metadata references a bag but is incomplete or malformed.
    #[error("Invalid checkout metadata: {0}")]
    InvalidMetadata(String),

    /// The bag is checked out but no order exists for it.
    #[error("Bag {bag_id} is checked out but has no order (session {session_id})")]
    Anomaly { bag_id: BagId, session_id: String },

    /// The order row exists but copying its items failed.
    #[error("Order {order_id} was created but its items are incomplete: {source}")]
    OrderItemsIncomplete {
        order_id: OrderId,
        #[source]
        source: StoreError,
    },
}

impl CheckoutError {
    /// Short label used for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            CheckoutError::Domain(_) => "domain",
            CheckoutError::Store(_) => "store",
            CheckoutError::Payment(_) => "payment",
            CheckoutError::MissingSessionId
            | CheckoutError::InvalidSessionId(_)
            | CheckoutError::InvalidMetadata(_) => "invalid",
            CheckoutError::NoOpenBag | CheckoutError::BagNotFound(_) => "not_found",
            CheckoutError::EmptyBag => "empty_bag",
            CheckoutError::PaymentIncomplete { .. } => "payment_incomplete",
            CheckoutError::Anomaly { .. } => "anomaly",
            CheckoutError::OrderItemsIncomplete { .. } => "order_items_incomplete",
        }
    }

    /// Returns true if the same call may succeed when repeated later.
    pub fn is_retryable(&self) -> bool {
        match self {
            CheckoutError::Payment(e) => e.is_retryable(),
            CheckoutError::Store(e) => e.is_retryable(),
            CheckoutError::Domain(DomainError::Store(e)) => e.is_retryable(),
            CheckoutError::OrderItemsIncomplete { .. } => true,
            _ => false,
        }
    }
}

/// Convenience type alias for checkout results.
pub type Result<T> = std::result::Result<T, CheckoutError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeouts_are_retryable() {
        let err = CheckoutError::from(PaymentError::Timeout("15s elapsed".to_string()));
        assert!(err.is_retryable());
        assert_eq!(err.kind(), "payment");

        let err = CheckoutError::from(PaymentError::SessionNotFound("cs_x".to_string()));
        assert!(!err.is_retryable());
    }

    #[test]
    fn anomaly_message_names_bag_and_session() {
        let bag_id = BagId::new();
        let err = CheckoutError::Anomaly {
            bag_id,
            session_id: "cs_test_1".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains(&bag_id.to_string()));
        assert!(msg.contains("cs_test_1"));
        assert_eq!(err.kind(), "anomaly");
    }

    #[test]
    fn incomplete_payment_reports_status() {
        let err = CheckoutError::PaymentIncomplete {
            session_id: "cs_test_2".to_string(),
            status: PaymentStatus::Unpaid,
        };
        assert_eq!(
            err.to_string(),
            "Payment not completed for session cs_test_2 (status: unpaid)"
        );
    }
}
