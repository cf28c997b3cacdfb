//! API error types with HTTP response mapping.

use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use checkout::{CheckoutError, NotificationError, PaymentError};
use domain::{BagError, DomainError};
use store::StoreError;
use thiserror::Error;

/// Errors that prevent the server from starting.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("payment processor setup failed: {0}")]
    Payment(#[from] PaymentError),

    #[error("notifier setup failed: {0}")]
    Notification(#[from] NotificationError),

    #[error("storage setup failed: {0}")]
    Store(#[from] StoreError),

    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("server error: {0}")]
    Serve(#[source] std::io::Error),
}

/// API-level error type that maps to HTTP responses.
#[derive(Debug)]
pub enum ApiError {
    /// Resource not found.
    NotFound(String),
    /// Bad request from the client.
    BadRequest(String),
    /// No authenticated user on the request.
    Unauthorized(String),
    /// Domain logic error.
    Domain(DomainError),
    /// Checkout or reconciliation error.
    Checkout(CheckoutError),
    /// Internal server error.
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg),
            ApiError::Domain(err) => domain_error_to_response(err),
            ApiError::Checkout(err) => checkout_error_to_response(err),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };

        if status.is_server_error() {
            tracing::error!(status = status.as_u16(), error = %message, "request failed");
        }
        metrics::counter!("http_errors_total", "status" => status.as_str().to_owned())
            .increment(1);

        let body = serde_json::json!({ "error": message });
        (status, axum::Json(body)).into_response()
    }
}

fn domain_error_to_response(err: DomainError) -> (StatusCode, String) {
    match &err {
        DomainError::Bag(bag_err) => match bag_err {
            BagError::NoOpenBag | BagError::ItemNotFound { .. } => {
                (StatusCode::NOT_FOUND, err.to_string())
            }
            BagError::TailorMismatch { .. } | BagError::DesignRequired | BagError::Empty => {
                (StatusCode::BAD_REQUEST, err.to_string())
            }
        },
        DomainError::Pricing(_) | DomainError::InvalidAddress { .. } => {
            (StatusCode::BAD_REQUEST, err.to_string())
        }
        DomainError::NotFound { .. } => (StatusCode::NOT_FOUND, err.to_string()),
        DomainError::Store(store_err) => store_error_status(store_err, err.to_string()),
    }
}

fn checkout_error_to_response(err: CheckoutError) -> (StatusCode, String) {
    match err {
        CheckoutError::Domain(domain_err) => domain_error_to_response(domain_err),
        CheckoutError::Store(ref store_err) => store_error_status(store_err, err.to_string()),
        CheckoutError::Payment(ref payment_err) => {
            let status = match payment_err {
                e if e.is_retryable() => StatusCode::BAD_GATEWAY,
                PaymentError::SessionNotFound(_) => StatusCode::NOT_FOUND,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            };
            (status, err.to_string())
        }
        CheckoutError::MissingSessionId
        | CheckoutError::InvalidSessionId(_)
        | CheckoutError::InvalidMetadata(_)
        | CheckoutError::EmptyBag
        | CheckoutError::PaymentIncomplete { .. } => (StatusCode::BAD_REQUEST, err.to_string()),
        CheckoutError::NoOpenBag | CheckoutError::BagNotFound(_) => {
            (StatusCode::NOT_FOUND, err.to_string())
        }
        CheckoutError::Anomaly { .. } | CheckoutError::OrderItemsIncomplete { .. } => {
            (StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
        }
    }
}

fn store_error_status(err: &StoreError, message: String) -> (StatusCode, String) {
    match err {
        StoreError::UniqueViolation { .. } => (StatusCode::CONFLICT, message),
        StoreError::NotFound { .. } => (StatusCode::NOT_FOUND, message),
        _ => (StatusCode::INTERNAL_SERVER_ERROR, message),
    }
}

impl From<DomainError> for ApiError {
    fn from(err: DomainError) -> Self {
        ApiError::Domain(err)
    }
}

impl From<CheckoutError> for ApiError {
    fn from(err: CheckoutError) -> Self {
        ApiError::Checkout(err)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}
