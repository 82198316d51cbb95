//! Order intake: validates checkout input and records the order before any
//! money moves.

use std::sync::Arc;

use common::OrderId;
use domain::{MerchantTransactionId, NewOrder, Order};
use ledger::OrderLedger;

use crate::error::{CheckoutError, Result};

/// Writes new orders to the ledger.
#[derive(Clone)]
pub struct OrderIntake {
    ledger: Arc<dyn OrderLedger>,
}

impl OrderIntake {
    pub fn new(ledger: Arc<dyn OrderLedger>) -> Self {
        Self { ledger }
    }

    /// Validates the input and records a `Pending`/`Processing` order.
    ///
    /// Invalid input fails with `Validation` and writes nothing.
    pub async fn create_order(
        &self,
        new_order: NewOrder,
        merchant_transaction_id: MerchantTransactionId,
    ) -> Result<OrderId> {
        Ok(self.place(new_order, merchant_transaction_id).await?.id)
    }

    /// Same as [`create_order`](Self::create_order), returning the stored order.
    #[tracing::instrument(
        skip(self, new_order),
        fields(customer_id = %new_order.customer_id, merchant_transaction_id = %merchant_transaction_id)
    )]
    pub async fn place(
        &self,
        new_order: NewOrder,
        merchant_transaction_id: MerchantTransactionId,
    ) -> Result<Order> {
        let order = new_order
            .into_order(OrderId::new(), merchant_transaction_id)
            .map_err(|e| {
                tracing::info!(error = %e, "order rejected at intake");
                CheckoutError::Validation(e)
            })?;

        self.ledger.create_order(order.clone()).await?;

        tracing::info!(order_id = %order.id, total = %order.total_amount, "order recorded");
        Ok(order)
    }
}
