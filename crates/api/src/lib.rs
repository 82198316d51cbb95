//! HTTP host for storefront checkout.
//!
//! Exposes checkout, order lookup and fulfillment endpoints, with
//! structured logging (tracing) and Prometheus metrics.

pub mod config;
pub mod error;
pub mod routes;
pub mod state;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use checkout::{
    CheckoutConfig, Collaborators, InMemoryCartStore, InMemoryLoyaltyProgram,
    InMemoryPaymentGateway, InMemoryRecoveryStore, InMemoryUrlLauncher, PaymentGateway,
    RecoveryStore,
};
use ledger::{InMemoryOrderLedger, OrderLedger};
use metrics_exporter_prometheus::PrometheusHandle;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use state::AppState;

/// Creates the Axum application router with all routes and shared state.
pub fn create_app(state: Arc<AppState>, metrics_handle: PrometheusHandle) -> Router {
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::get))
        .with_state(routes::metrics::MetricsState {
            handle: metrics_handle,
            app: state.clone(),
        });

    Router::new()
        .route("/health", get(routes::health::check))
        .route("/checkout", post(routes::checkout::start))
        .route(
            "/checkout/{customer_id}",
            axum::routing::delete(routes::checkout::close),
        )
        .route("/checkout/{customer_id}/events", get(routes::checkout::events))
        .route("/checkout/{customer_id}/leave", post(routes::checkout::leave))
        .route("/orders/{id}", get(routes::orders::get))
        .route("/orders/{id}/attempts", get(routes::orders::attempts))
        .route(
            "/orders/{id}/payment-status",
            get(routes::orders::payment_status),
        )
        .route(
            "/orders/{id}/status",
            axum::routing::patch(routes::orders::update_status),
        )
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

/// Collaborators for a storefront without real cart, loyalty or device
/// integrations.
pub fn local_collaborators(
    ledger: Arc<dyn OrderLedger>,
    gateway: Arc<dyn PaymentGateway>,
    recovery: Arc<dyn RecoveryStore>,
) -> Collaborators {
    Collaborators {
        ledger,
        gateway,
        cart: Arc::new(InMemoryCartStore::new()),
        loyalty: Arc::new(InMemoryLoyaltyProgram::new()),
        launcher: Arc::new(InMemoryUrlLauncher::unable()),
        recovery,
    }
}

/// Creates a fully in-memory application state around the sandbox gateway.
pub fn create_default_state(checkout_config: CheckoutConfig) -> Arc<AppState> {
    let collaborators = local_collaborators(
        Arc::new(InMemoryOrderLedger::new()),
        Arc::new(InMemoryPaymentGateway::sandbox()),
        Arc::new(InMemoryRecoveryStore::new()),
    );
    Arc::new(AppState::new(collaborators, checkout_config))
}
