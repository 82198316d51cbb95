use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use domain::{Order, OrderPatch, PaymentAttempt, PaymentSettlement};
use tokio::sync::RwLock;

use crate::{LedgerError, OrderId, Result, store::OrderLedger};

#[derive(Default)]
struct LedgerState {
    orders: HashMap<OrderId, Order>,
    attempts: HashMap<OrderId, Vec<PaymentAttempt>>,
}

/// In-memory order ledger.
///
/// Provides the same interface as the PostgreSQL implementation, plus
/// failure injection so the reconciler's retry and recovery paths can be
/// exercised.
#[derive(Clone, Default)]
pub struct InMemoryOrderLedger {
    state: Arc<RwLock<LedgerState>>,
    fail_on_create: Arc<AtomicBool>,
    failing_settlements: Arc<AtomicU32>,
    settle_calls: Arc<AtomicU32>,
    update_calls: Arc<AtomicU32>,
}

impl InMemoryOrderLedger {
    /// Creates a new empty ledger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every `create_order` call fail while set.
    pub fn set_fail_on_create(&self, fail: bool) {
        self.fail_on_create.store(fail, Ordering::SeqCst);
    }

    /// Makes the next `count` settlement writes fail with `Unavailable`.
    pub fn fail_next_settlements(&self, count: u32) {
        self.failing_settlements.store(count, Ordering::SeqCst);
    }

    /// Number of `settle_payment` calls received, failed ones included.
    pub fn settle_calls(&self) -> u32 {
        self.settle_calls.load(Ordering::SeqCst)
    }

    /// Number of `update_order` calls received.
    pub fn update_calls(&self) -> u32 {
        self.update_calls.load(Ordering::SeqCst)
    }

    /// Returns the number of stored orders.
    pub async fn order_count(&self) -> usize {
        self.state.read().await.orders.len()
    }

    fn take_injected_failure(&self) -> bool {
        self.failing_settlements
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl OrderLedger for InMemoryOrderLedger {
    async fn create_order(&self, order: Order) -> Result<OrderId> {
        if self.fail_on_create.load(Ordering::SeqCst) {
            return Err(LedgerError::Unavailable("injected create failure".to_string()));
        }

        let mut state = self.state.write().await;
        let order_id = order.id;
        if state.orders.contains_key(&order_id) {
            return Err(LedgerError::DuplicateOrder(order_id));
        }
        state.orders.insert(order_id, order);
        metrics::counter!("ledger_orders_created_total").increment(1);
        Ok(order_id)
    }

    async fn get_order(&self, order_id: OrderId) -> Result<Option<Order>> {
        Ok(self.state.read().await.orders.get(&order_id).cloned())
    }

    async fn update_order(&self, order_id: OrderId, patch: OrderPatch) -> Result<Order> {
        self.update_calls.fetch_add(1, Ordering::SeqCst);
        let mut state = self.state.write().await;
        let order = state
            .orders
            .get_mut(&order_id)
            .ok_or(LedgerError::OrderNotFound(order_id))?;

        // Work on a copy so a rejected patch leaves the stored order intact
        let mut updated = order.clone();
        updated.apply_patch(&patch, Utc::now())?;
        *order = updated.clone();
        Ok(updated)
    }

    async fn settle_payment(
        &self,
        order_id: OrderId,
        settlement: PaymentSettlement,
    ) -> Result<Order> {
        self.settle_calls.fetch_add(1, Ordering::SeqCst);
        if self.take_injected_failure() {
            return Err(LedgerError::Unavailable(
                "injected settlement failure".to_string(),
            ));
        }

        let mut state = self.state.write().await;
        let order = state
            .orders
            .get_mut(&order_id)
            .ok_or(LedgerError::OrderNotFound(order_id))?;

        let mut updated = order.clone();
        updated.settle_payment(&settlement)?;
        *order = updated.clone();

        let attempts = state.attempts.entry(order_id).or_default();
        match attempts
            .iter_mut()
            .find(|a| a.merchant_transaction_id == settlement.attempt.merchant_transaction_id)
        {
            Some(existing) => *existing = settlement.attempt,
            None => attempts.push(settlement.attempt),
        }

        Ok(updated)
    }

    async fn attempts_for(&self, order_id: OrderId) -> Result<Vec<PaymentAttempt>> {
        Ok(self
            .state
            .read()
            .await
            .attempts
            .get(&order_id)
            .cloned()
            .unwrap_or_default())
    }
}
