//! Domain model for the storefront checkout.
//!
//! This crate holds the pure, I/O-free parts of checkout:
//! - Orders, line items and money
//! - Order and payment status state machines
//! - Payment attempts and the settlement written when one ends
//! - Intake validation for new orders

pub mod order;
pub mod payment;

pub use common::OrderId;
pub use order::{
    CustomerId, LineItem, LoyaltyDetails, Money, NewOrder, NewOrderBuilder, Order, OrderError,
    OrderPatch, OrderStatus, OrderType, PaymentMode, PaymentStatus, ProductId,
};
pub use payment::{AttemptStatus, MerchantTransactionId, PaymentAttempt, PaymentSettlement};
