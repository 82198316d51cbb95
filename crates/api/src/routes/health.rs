//! Health check endpoint.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use serde::Serialize;

use crate::state::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    /// Open checkout screens.
    pub sessions: usize,
    /// Checkouts still waiting on the gateway.
    pub payments_in_flight: usize,
}

/// GET /health — liveness plus a view of in-flight payments.
pub async fn check(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        sessions: state.session_count(),
        payments_in_flight: state.payments_in_flight(),
    })
}
