//! HTTP API server for the tailoring storefront.
//!
//! Provides bag, checkout and order endpoints over the checkout core, with
//! structured logging (tracing) and Prometheus metrics.

pub mod auth;
pub mod config;
pub mod error;
pub mod routes;

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::routing::{delete, get, post};
use checkout::{
    CheckoutReconciler, CheckoutSettings, EmailConfig, HttpEmailNotifier, InMemoryPaymentProcessor,
    LogNotifier, Notifier, PaymentProcessor, PaymentSessionInitiator, ProcessedSessions,
    StripeConfig, StripePaymentProcessor,
};
use domain::{BagService, OrderQueries};
use metrics_exporter_prometheus::PrometheusHandle;
use store::Store;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub use config::{Config, LogFormat};
pub use error::{ApiError, StartupError};
pub use routes::AppState;

/// External collaborators the checkout core talks to.
#[derive(Clone)]
pub struct Services {
    pub payments: Arc<dyn PaymentProcessor>,
    pub notifier: Arc<dyn Notifier>,
    pub settings: CheckoutSettings,
    pub dedup_window: Duration,
}

impl Services {
    /// In-memory payment processor and a logging notifier.
    pub fn in_memory(payments: InMemoryPaymentProcessor) -> Self {
        Self {
            payments: Arc::new(payments),
            notifier: Arc::new(LogNotifier),
            settings: CheckoutSettings::default(),
            dedup_window: checkout::DEFAULT_WINDOW,
        }
    }

    /// Selects implementations from configuration.
    ///
    /// Without a Stripe key the in-memory processor is used; without an
    /// email key notifications are only logged.
    pub fn from_config(config: &Config) -> Result<Self, StartupError> {
        let payments: Arc<dyn PaymentProcessor> = match &config.stripe_secret_key {
            Some(secret_key) => Arc::new(StripePaymentProcessor::new(StripeConfig {
                secret_key: secret_key.clone(),
                api_base: config.stripe_api_base.clone(),
                timeout: config.upstream_timeout,
            })?),
            None => {
                tracing::warn!("STRIPE_SECRET_KEY not set, using in-memory payment processor");
                Arc::new(InMemoryPaymentProcessor::new())
            }
        };

        let notifier: Arc<dyn Notifier> = match &config.email_api_key {
            Some(api_key) => Arc::new(HttpEmailNotifier::new(EmailConfig {
                api_key: api_key.clone(),
                api_base: config.email_api_base.clone(),
                from: config.email_from.clone(),
                timeout: config.upstream_timeout,
            })?),
            None => {
                tracing::info!("EMAIL_API_KEY not set, order notifications are logged only");
                Arc::new(LogNotifier)
            }
        };

        Ok(Self {
            payments,
            notifier,
            settings: CheckoutSettings {
                currency: config.checkout_currency.clone(),
                public_base_url: config.public_base_url.clone(),
            },
            dedup_window: config.dedup_window,
        })
    }
}

/// Creates the Axum application router with all routes and shared state.
pub fn create_app<S: Store + Clone + 'static>(
    state: Arc<AppState<S>>,
    metrics_handle: PrometheusHandle,
) -> Router {
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::render))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::health::check::<S>))
        .route("/bag", get(routes::bag::get::<S>))
        .route("/bag/add", post(routes::bag::add::<S>))
        .route("/bag/items/{id}", delete(routes::bag::remove_item::<S>))
        .route("/bag/checkout", post(routes::bag::checkout::<S>))
        .route("/checkout/verify", post(routes::checkout::verify::<S>))
        .route("/orders", get(routes::orders::list::<S>))
        .route("/orders/{id}", get(routes::orders::get::<S>))
        .with_state(state)
        .merge(metrics_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}

/// Builds the application state over a store and its collaborators.
pub fn create_state<S: Store + Clone + 'static>(
    store: S,
    services: Services,
    storage: &'static str,
) -> Arc<AppState<S>> {
    let guard = Arc::new(ProcessedSessions::new(services.dedup_window));

    Arc::new(AppState {
        bags: BagService::new(store.clone()),
        orders: OrderQueries::new(store.clone()),
        initiator: PaymentSessionInitiator::new(
            store.clone(),
            services.payments.clone(),
            services.settings,
        ),
        reconciler: CheckoutReconciler::new(store, services.payments, services.notifier, guard),
        storage,
    })
}

/// Creates application state with the in-memory payment processor.
pub fn create_default_state<S: Store + Clone + 'static>(store: S) -> Arc<AppState<S>> {
    create_state(
        store,
        Services::in_memory(InMemoryPaymentProcessor::new()),
        "memory",
    )
}
