//! Checkout for the tailoring storefront.
//!
//! Two operations hand a bag to the payment processor and back:
//! 1. [`PaymentSessionInitiator`] prices the open bag and creates a hosted
//!    payment session carrying the bag, customer, tailor and shipping
//!    address as metadata.
//! 2. [`CheckoutReconciler`] verifies a session was paid and converts the bag
//!    into exactly one order, however often it is called.
//!
//! External collaborators (payment processor, notifier) sit behind traits
//! with in-memory implementations for tests.

pub mod error;
pub mod guard;
pub mod initiator;
pub mod metadata;
pub mod reconciler;
pub mod services;

pub use error::{CheckoutError, NotificationError, PaymentError, Result};
pub use guard::{DEFAULT_WINDOW, ProcessedSessions};
pub use initiator::{CheckoutSession, CheckoutSettings, PaymentSessionInitiator};
pub use metadata::CheckoutMetadata;
pub use reconciler::{CheckoutReconciler, ReconcileOutcome};
pub use services::{
    CreateSessionRequest, CreatedSession, EmailConfig, HttpEmailNotifier, InMemoryNotifier,
    InMemoryPaymentProcessor, LineItem, LogNotifier, NotificationEvent, Notifier, PaymentProcessor,
    PaymentSession, PaymentStatus, SentNotification, StripeConfig, StripePaymentProcessor,
};
