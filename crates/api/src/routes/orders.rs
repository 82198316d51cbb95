//! Order lookup and fulfillment endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use checkout::StatusReport;
use common::OrderId;
use domain::{Order, OrderPatch, OrderStatus, PaymentAttempt};
use ledger::LedgerExt;
use serde::Deserialize;

use crate::error::ApiError;
use crate::state::AppState;

// -- Request types --

#[derive(Deserialize)]
pub struct UpdateStatusRequest {
    /// Status name, matched case-insensitively.
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub staff_notes: Option<String>,
}

// -- Handlers --

/// GET /orders/:id — load an order from the ledger.
#[tracing::instrument(skip(state))]
pub async fn get(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Order>, ApiError> {
    let order_id = parse_order_id(&id)?;
    let order = state
        .ledger()
        .get_order(order_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Order {id} not found")))?;
    Ok(Json(order))
}

/// GET /orders/:id/attempts — payment attempts recorded for an order.
#[tracing::instrument(skip(state))]
pub async fn attempts(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Vec<PaymentAttempt>>, ApiError> {
    let order_id = parse_order_id(&id)?;
    state.ledger().require_order(order_id).await?;
    Ok(Json(state.ledger().attempts_for(order_id).await?))
}

/// GET /orders/:id/payment-status — ledger and gateway views of the
/// payment, side by side. Read-only.
#[tracing::instrument(skip(state))]
pub async fn payment_status(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<StatusReport>, ApiError> {
    let order_id = parse_order_id(&id)?;
    let order = state.ledger().require_order(order_id).await?;
    let session = state.session(&order.customer_id);
    Ok(Json(session.orchestrator.check_status(order_id).await?))
}

/// PATCH /orders/:id/status — advance fulfillment or edit staff notes.
#[tracing::instrument(skip(state, req))]
pub async fn update_status(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(req): Json<UpdateStatusRequest>,
) -> Result<Json<Order>, ApiError> {
    let order_id = parse_order_id(&id)?;
    let status = req
        .status
        .as_deref()
        .map(OrderStatus::parse)
        .transpose()
        .map_err(|e| ApiError::BadRequest(e.to_string()))?;

    let patch = OrderPatch {
        status,
        staff_notes: req.staff_notes,
    };
    let order = state.ledger().update_order(order_id, patch).await?;

    tracing::info!(order_id = %order.id, status = %order.status, "order updated");
    Ok(Json(order))
}

fn parse_order_id(id: &str) -> Result<OrderId, ApiError> {
    id.parse()
        .map_err(|e| ApiError::BadRequest(format!("Invalid ID format: {e}")))
}
