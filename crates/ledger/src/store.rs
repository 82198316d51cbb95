use std::sync::Arc;

use async_trait::async_trait;
use domain::{Order, OrderPatch, PaymentAttempt, PaymentSettlement, PaymentStatus};

use crate::{LedgerError, OrderId, Result};

/// Core trait for order ledger implementations.
///
/// All implementations must be thread-safe (Send + Sync).
#[async_trait]
pub trait OrderLedger: Send + Sync {
    /// Persists a new order.
    ///
    /// Fails with `DuplicateOrder` if the id is already taken.
    async fn create_order(&self, order: Order) -> Result<OrderId>;

    /// Loads an order.
    ///
    /// Returns None if the order doesn't exist.
    async fn get_order(&self, order_id: OrderId) -> Result<Option<Order>>;

    /// Applies a fulfillment patch and returns the updated order.
    async fn update_order(&self, order_id: OrderId, patch: OrderPatch) -> Result<Order>;

    /// Settles the order's payment in a single transaction.
    ///
    /// Payment status, paid amount, payment id, timestamp and the attempt
    /// record are written together. Fails with
    /// `Order(OrderError::AlreadySettled)` if another settlement won.
    async fn settle_payment(&self, order_id: OrderId, settlement: PaymentSettlement)
    -> Result<Order>;

    /// Returns the payment attempts recorded for an order, oldest first.
    async fn attempts_for(&self, order_id: OrderId) -> Result<Vec<PaymentAttempt>>;
}

#[async_trait]
impl<T: OrderLedger + ?Sized> OrderLedger for Arc<T> {
    async fn create_order(&self, order: Order) -> Result<OrderId> {
        (**self).create_order(order).await
    }

    async fn get_order(&self, order_id: OrderId) -> Result<Option<Order>> {
        (**self).get_order(order_id).await
    }

    async fn update_order(&self, order_id: OrderId, patch: OrderPatch) -> Result<Order> {
        (**self).update_order(order_id, patch).await
    }

    async fn settle_payment(
        &self,
        order_id: OrderId,
        settlement: PaymentSettlement,
    ) -> Result<Order> {
        (**self).settle_payment(order_id, settlement).await
    }

    async fn attempts_for(&self, order_id: OrderId) -> Result<Vec<PaymentAttempt>> {
        (**self).attempts_for(order_id).await
    }
}

/// Extension trait providing convenience methods for ledgers.
#[async_trait]
pub trait LedgerExt: OrderLedger {
    /// Loads an order, failing with `OrderNotFound` if it is missing.
    async fn require_order(&self, order_id: OrderId) -> Result<Order> {
        self.get_order(order_id)
            .await?
            .ok_or(LedgerError::OrderNotFound(order_id))
    }

    /// Returns the current payment status of an order.
    async fn payment_status(&self, order_id: OrderId) -> Result<Option<PaymentStatus>> {
        Ok(self.get_order(order_id).await?.map(|o| o.payment_status))
    }
}

// Blanket implementation for all OrderLedger implementations
impl<T: OrderLedger + ?Sized> LedgerExt for T {}
