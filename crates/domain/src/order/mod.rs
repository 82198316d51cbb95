//! Orders and the rules that guard them.

mod new_order;
mod record;
mod state;
mod value_objects;

pub use new_order::{NewOrder, NewOrderBuilder};
pub use record::{LoyaltyDetails, Order, OrderPatch, OrderType, PaymentMode};
pub use state::{OrderStatus, PaymentStatus};
pub use value_objects::{CustomerId, LineItem, Money, ProductId};

use thiserror::Error;

use crate::payment::AttemptStatus;

/// Errors that can occur during order operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OrderError {
    /// Customer ID is required.
    #[error("Customer ID is required")]
    CustomerIdRequired,

    /// Display name is required.
    #[error("Display name is required")]
    DisplayNameRequired,

    /// Order has no items.
    #[error("Order has no items")]
    NoItems,

    /// Order total must be positive.
    #[error("Invalid amount: {amount} (must be greater than 0)")]
    InvalidAmount { amount: i64 },

    /// Invalid quantity.
    #[error("Invalid quantity for {product_id}: {quantity} (must be greater than 0)")]
    InvalidQuantity { product_id: String, quantity: u32 },

    /// Invalid price.
    #[error("Invalid price for {product_id}: {price} (must be greater than 0)")]
    InvalidPrice { product_id: String, price: i64 },

    /// Table numbers only apply to dine-in orders.
    #[error("Table number is not allowed for {order_type} orders")]
    TableNumberNotAllowed { order_type: OrderType },

    /// A status string that maps to no known status.
    #[error("Unknown status: '{value}'")]
    UnknownStatus { value: String },

    /// Payment already reached a terminal status.
    #[error("Payment already settled as {status}")]
    AlreadySettled { status: PaymentStatus },

    /// A settlement must carry a terminal payment status.
    #[error("Cannot settle payment with non-terminal status {status}")]
    InvalidSettlement { status: PaymentStatus },

    /// Fulfillment transition not allowed.
    #[error("Invalid status transition: cannot move from {from} to {to}")]
    InvalidStatusTransition { from: OrderStatus, to: OrderStatus },

    /// Attempt transition not allowed.
    #[error("Invalid attempt transition: cannot move from {from} to {to}")]
    InvalidAttemptTransition {
        from: AttemptStatus,
        to: AttemptStatus,
    },
}

impl OrderError {
    /// Returns true for errors caused by bad checkout input.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            OrderError::CustomerIdRequired
                | OrderError::DisplayNameRequired
                | OrderError::NoItems
                | OrderError::InvalidAmount { .. }
                | OrderError::InvalidQuantity { .. }
                | OrderError::InvalidPrice { .. }
                | OrderError::TableNumberNotAllowed { .. }
        )
    }
}
