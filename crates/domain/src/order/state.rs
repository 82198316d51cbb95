//! Order and payment status state machines.

use serde::{Deserialize, Serialize};

use super::OrderError;

/// Fulfillment status of an order.
///
/// State transitions:
/// ```text
/// Pending ──► Confirmed ──► Preparing ──► Ready ──► Served
///    │
///    └──► Cancelled
/// ```
/// Only payment settlement moves an order out of `Pending`; the later
/// stages belong to the shop floor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum OrderStatus {
    /// Order recorded, payment not settled yet.
    #[default]
    Pending,

    /// Payment settled, order accepted by the shop.
    Confirmed,

    /// Barista is preparing the order.
    Preparing,

    /// Ready for pickup or serving.
    Ready,

    /// Handed over (terminal state).
    Served,

    /// Order cancelled (terminal state).
    Cancelled,
}

impl OrderStatus {
    const PROGRESSION: [OrderStatus; 5] = [
        OrderStatus::Pending,
        OrderStatus::Confirmed,
        OrderStatus::Preparing,
        OrderStatus::Ready,
        OrderStatus::Served,
    ];

    /// Returns true if payment settlement may still change this status.
    pub fn awaits_payment(&self) -> bool {
        matches!(self, OrderStatus::Pending)
    }

    /// Returns true if the order is already in a fulfillment stage.
    pub fn is_fulfillment_stage(&self) -> bool {
        matches!(
            self,
            OrderStatus::Confirmed | OrderStatus::Preparing | OrderStatus::Ready | OrderStatus::Served
        )
    }

    /// Returns true if this is a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Served | OrderStatus::Cancelled)
    }

    /// Position in the progress tracker shown to the customer.
    ///
    /// `Cancelled` is not on the tracker and has no index.
    pub fn progress_index(&self) -> Option<usize> {
        Self::PROGRESSION.iter().position(|s| s == self)
    }

    /// Returns true if fulfillment may move from `self` to `next`.
    ///
    /// Only single forward steps between fulfillment stages are allowed.
    pub fn can_advance_to(&self, next: OrderStatus) -> bool {
        match (self.progress_index(), next.progress_index()) {
            (Some(from), Some(to)) => self.is_fulfillment_stage() && to == from + 1,
            _ => false,
        }
    }

    /// Parses a status name case-insensitively.
    ///
    /// Unknown names are an error rather than a silent fallback to `Pending`.
    pub fn parse(value: &str) -> Result<Self, OrderError> {
        match value.trim().to_ascii_lowercase().as_str() {
            "pending" | "order placed" => Ok(OrderStatus::Pending),
            "confirmed" => Ok(OrderStatus::Confirmed),
            "preparing" => Ok(OrderStatus::Preparing),
            "ready" => Ok(OrderStatus::Ready),
            "served" | "completed" => Ok(OrderStatus::Served),
            "cancelled" | "canceled" => Ok(OrderStatus::Cancelled),
            _ => Err(OrderError::UnknownStatus {
                value: value.to_string(),
            }),
        }
    }

    /// Returns the state name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "Pending",
            OrderStatus::Confirmed => "Confirmed",
            OrderStatus::Preparing => "Preparing",
            OrderStatus::Ready => "Ready",
            OrderStatus::Served => "Served",
            OrderStatus::Cancelled => "Cancelled",
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Payment status recorded on the order.
///
/// `Processing` is the only non-terminal value; once a terminal value is
/// written it never changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum PaymentStatus {
    /// Order recorded, gateway outcome not known yet.
    #[default]
    Processing,

    /// Money moved.
    Success,

    /// Gateway reported failure or the customer cancelled.
    Failed,

    /// Polling gave up before a terminal gateway status was seen.
    Timeout,
}

impl PaymentStatus {
    /// Returns true if this is a terminal state.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, PaymentStatus::Processing)
    }

    /// Returns the state name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Processing => "Processing",
            PaymentStatus::Success => "Success",
            PaymentStatus::Failed => "Failed",
            PaymentStatus::Timeout => "Timeout",
        }
    }

    /// Parses a stored status name.
    pub fn parse(value: &str) -> Result<Self, OrderError> {
        match value {
            "Processing" => Ok(PaymentStatus::Processing),
            "Success" => Ok(PaymentStatus::Success),
            "Failed" => Ok(PaymentStatus::Failed),
            "Timeout" => Ok(PaymentStatus::Timeout),
            _ => Err(OrderError::UnknownStatus {
                value: value.to_string(),
            }),
        }
    }
}

impl std::fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
