//! Checkout endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use checkout::{
    ActiveAttempt, CardDetails, CheckoutRequest, CheckoutResult, HostEvent, LeaveDecision,
    PaymentInstrument,
};
use domain::{CustomerId, NewOrder};
use serde::{Deserialize, Serialize};

use crate::error::ApiError;
use crate::state::AppState;

// -- Request types --

/// Payment details; card fields never leave this request.
#[derive(Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum PaymentRequest {
    Cash,
    Upi {
        #[serde(default)]
        vpa: Option<String>,
    },
    Card {
        number: String,
        cvv: String,
        expiry_month: u8,
        expiry_year: u16,
        holder_name: String,
    },
    Wallet {
        provider: String,
    },
}

impl From<PaymentRequest> for PaymentInstrument {
    fn from(req: PaymentRequest) -> Self {
        match req {
            PaymentRequest::Cash => PaymentInstrument::Cash,
            PaymentRequest::Upi { vpa } => PaymentInstrument::Upi { vpa },
            PaymentRequest::Card {
                number,
                cvv,
                expiry_month,
                expiry_year,
                holder_name,
            } => PaymentInstrument::Card(CardDetails::new(
                number,
                cvv,
                expiry_month,
                expiry_year,
                holder_name,
            )),
            PaymentRequest::Wallet { provider } => PaymentInstrument::Wallet { provider },
        }
    }
}

#[derive(Deserialize)]
pub struct CheckoutBody {
    pub order: NewOrder,
    /// Falls back to the order's payment mode when absent.
    #[serde(default)]
    pub payment: Option<PaymentRequest>,
}

#[derive(Deserialize)]
pub struct LeaveBody {
    #[serde(default)]
    pub confirm: bool,
}

// -- Response types --

#[derive(Serialize)]
pub struct SessionResponse {
    pub customer_id: CustomerId,
    pub active_attempt: Option<ActiveAttempt>,
    pub events: Vec<HostEvent>,
}

#[derive(Serialize)]
pub struct LeaveResponse {
    pub decision: LeaveDecision,
    pub abandoned: Option<ActiveAttempt>,
}

// -- Handlers --

/// POST /checkout — run a checkout to its result.
#[tracing::instrument(skip(state, body))]
pub async fn start(
    State(state): State<Arc<AppState>>,
    Json(body): Json<CheckoutBody>,
) -> Result<Json<CheckoutResult>, ApiError> {
    let instrument = match body.payment {
        Some(payment) => PaymentInstrument::from(payment),
        None => PaymentInstrument::for_mode(body.order.payment_mode).ok_or_else(|| {
            ApiError::BadRequest("Card payments need card details".to_string())
        })?,
    };

    let session = state.session(&body.order.customer_id);
    let result = session
        .orchestrator
        .checkout(CheckoutRequest {
            order: body.order,
            instrument,
        })
        .await?;

    Ok(Json(result))
}

/// GET /checkout/:customer_id/events — callbacks received by the
/// customer's checkout screen.
#[tracing::instrument(skip(state))]
pub async fn events(
    State(state): State<Arc<AppState>>,
    Path(customer_id): Path<String>,
) -> Result<Json<SessionResponse>, ApiError> {
    let customer_id = CustomerId::new(customer_id);
    let session = state
        .existing_session(&customer_id)
        .ok_or_else(|| ApiError::NotFound(format!("No checkout for customer {customer_id}")))?;

    Ok(Json(SessionResponse {
        active_attempt: session.orchestrator.active_attempt(),
        events: session.host.events(),
        customer_id,
    }))
}

/// POST /checkout/:customer_id/leave — ask to navigate away, or confirm it.
#[tracing::instrument(skip(state, body))]
pub async fn leave(
    State(state): State<Arc<AppState>>,
    Path(customer_id): Path<String>,
    Json(body): Json<LeaveBody>,
) -> Result<Json<LeaveResponse>, ApiError> {
    let customer_id = CustomerId::new(customer_id);
    let Some(session) = state.existing_session(&customer_id) else {
        return Ok(Json(LeaveResponse {
            decision: LeaveDecision::Allowed,
            abandoned: None,
        }));
    };

    if body.confirm {
        return Ok(Json(LeaveResponse {
            decision: LeaveDecision::Allowed,
            abandoned: session.orchestrator.confirm_leave(),
        }));
    }

    Ok(Json(LeaveResponse {
        decision: session.orchestrator.request_leave(),
        abandoned: None,
    }))
}

/// DELETE /checkout/:customer_id — the checkout screen closed.
#[tracing::instrument(skip(state))]
pub async fn close(
    State(state): State<Arc<AppState>>,
    Path(customer_id): Path<String>,
) -> StatusCode {
    match state.end_session(&CustomerId::new(customer_id)) {
        Some(_) => StatusCode::NO_CONTENT,
        None => StatusCode::NOT_FOUND,
    }
}
