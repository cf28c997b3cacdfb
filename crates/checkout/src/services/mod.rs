//! External collaborators: the payment processor and the notifier.

pub mod email;
pub mod notification;
pub mod payment;
pub mod stripe;

pub use email::{EmailConfig, HttpEmailNotifier};
pub use notification::{
    InMemoryNotifier, LogNotifier, NotificationEvent, Notifier, SentNotification,
};
pub use payment::{
    CreateSessionRequest, CreatedSession, InMemoryPaymentProcessor, LineItem, PaymentProcessor,
    PaymentSession, PaymentStatus,
};
pub use stripe::{StripeConfig, StripePaymentProcessor};
