//! Prometheus metrics endpoint.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use metrics_exporter_prometheus::PrometheusHandle;

use crate::state::AppState;

#[derive(Clone)]
pub struct MetricsState {
    pub handle: PrometheusHandle,
    pub app: Arc<AppState>,
}

/// GET /metrics — refreshes the session gauges, then renders every metric
/// in Prometheus text format.
pub async fn get(State(state): State<MetricsState>) -> impl IntoResponse {
    metrics::gauge!("checkout_sessions_open").set(state.app.session_count() as f64);
    metrics::gauge!("checkout_payments_in_flight").set(state.app.payments_in_flight() as f64);

    (
        StatusCode::OK,
        [(
            axum::http::header::CONTENT_TYPE,
            "text/plain; version=0.0.4; charset=utf-8",
        )],
        state.handle.render(),
    )
}
