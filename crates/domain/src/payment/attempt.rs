//! Payment attempts: one gateway-side transaction per checkout.

use chrono::{DateTime, Utc};
use common::OrderId;
use serde::{Deserialize, Serialize};

use crate::order::{Money, OrderError, PaymentMode};

/// Merchant-side transaction identifier sent to the gateway.
///
/// Unique per checkout attempt and stable for its whole lifetime; status
/// polling is keyed on it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MerchantTransactionId(String);

impl MerchantTransactionId {
    /// Wraps an existing identifier.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for MerchantTransactionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for MerchantTransactionId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Status of a single payment attempt.
///
/// State transitions:
/// ```text
/// Pending ──┬──► Success
///           ├──► Failed
///           ├──► Cancelled
///           └──► Timeout
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AttemptStatus {
    #[default]
    Pending,
    Success,
    Failed,
    Cancelled,
    Timeout,
}

impl AttemptStatus {
    /// Maps a gateway status string, ignoring case.
    ///
    /// `COMPLETED` is the gateway's synonym for `SUCCESS`. `TIMEOUT` is never
    /// reported by the gateway; it is produced locally by the poller.
    pub fn from_gateway(value: &str) -> Result<Self, OrderError> {
        match value.trim().to_ascii_uppercase().as_str() {
            "PENDING" => Ok(AttemptStatus::Pending),
            "SUCCESS" | "COMPLETED" => Ok(AttemptStatus::Success),
            "FAILED" => Ok(AttemptStatus::Failed),
            "CANCELLED" => Ok(AttemptStatus::Cancelled),
            _ => Err(OrderError::UnknownStatus {
                value: value.to_string(),
            }),
        }
    }

    /// Returns true if this is a terminal state.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, AttemptStatus::Pending)
    }

    /// Transitions are monotonic: only `Pending` may move, and never back
    /// to `Pending`.
    pub fn can_transition_to(&self, next: AttemptStatus) -> bool {
        matches!(self, AttemptStatus::Pending) && next != AttemptStatus::Pending
    }

    /// Returns the state name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            AttemptStatus::Pending => "PENDING",
            AttemptStatus::Success => "SUCCESS",
            AttemptStatus::Failed => "FAILED",
            AttemptStatus::Cancelled => "CANCELLED",
            AttemptStatus::Timeout => "TIMEOUT",
        }
    }
}

impl std::fmt::Display for AttemptStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One gateway-side transaction tied to an order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentAttempt {
    pub merchant_transaction_id: MerchantTransactionId,
    pub order_id: OrderId,
    /// Assigned by the gateway once known.
    pub gateway_transaction_id: Option<String>,
    pub amount: Money,
    pub currency: String,
    pub method: PaymentMode,
    pub status: AttemptStatus,
    /// Last raw gateway payload, kept for support investigations.
    pub raw_response: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PaymentAttempt {
    /// Creates a pending attempt.
    pub fn pending(
        merchant_transaction_id: MerchantTransactionId,
        order_id: OrderId,
        amount: Money,
        currency: impl Into<String>,
        method: PaymentMode,
    ) -> Self {
        let now = Utc::now();
        Self {
            merchant_transaction_id,
            order_id,
            gateway_transaction_id: None,
            amount,
            currency: currency.into(),
            method,
            status: AttemptStatus::Pending,
            raw_response: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Moves the attempt to `next`, rejecting non-monotonic transitions.
    pub fn transition(&mut self, next: AttemptStatus) -> Result<(), OrderError> {
        if !self.status.can_transition_to(next) {
            return Err(OrderError::InvalidAttemptTransition {
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        self.updated_at = Utc::now();
        Ok(())
    }
}
