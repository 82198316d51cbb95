//! The order record as stored in the ledger.

use chrono::{DateTime, Utc};
use common::OrderId;
use serde::{Deserialize, Serialize};

use crate::payment::{MerchantTransactionId, PaymentSettlement};

use super::{CustomerId, LineItem, Money, OrderError, OrderStatus, PaymentStatus};

/// How the order is served.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderType {
    DineIn,
    Takeaway,
}

impl OrderType {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderType::DineIn => "dine_in",
            OrderType::Takeaway => "takeaway",
        }
    }
}

impl std::fmt::Display for OrderType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// How the customer pays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMode {
    /// Paid at the counter; no gateway involved.
    Cash,
    Card,
    Upi,
    Wallet,
}

impl PaymentMode {
    /// Returns true if this mode goes through the payment gateway.
    pub fn requires_gateway(&self) -> bool {
        !matches!(self, PaymentMode::Cash)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMode::Cash => "cash",
            PaymentMode::Card => "card",
            PaymentMode::Upi => "upi",
            PaymentMode::Wallet => "wallet",
        }
    }

    /// Parses a stored mode name.
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "cash" => Some(PaymentMode::Cash),
            "card" => Some(PaymentMode::Card),
            "upi" => Some(PaymentMode::Upi),
            "wallet" => Some(PaymentMode::Wallet),
            _ => None,
        }
    }
}

impl std::fmt::Display for PaymentMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Loyalty bookkeeping captured at checkout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct LoyaltyDetails {
    pub points_earned: u32,
    pub points_redeemed: u32,
    pub balance_before: u32,
    pub balance_after: u32,
}

/// Fulfillment-side changes to an order.
///
/// Deliberately has no payment fields: payment state is written only
/// through [`Order::settle_payment`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OrderPatch {
    #[serde(default)]
    pub status: Option<OrderStatus>,
    #[serde(default)]
    pub staff_notes: Option<String>,
}

impl OrderPatch {
    /// Patch advancing the fulfillment status.
    pub fn advance_to(status: OrderStatus) -> Self {
        Self {
            status: Some(status),
            staff_notes: None,
        }
    }
}

/// One checkout attempt and its fulfillment and payment state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub customer_id: CustomerId,
    pub display_name: String,
    pub items: Vec<LineItem>,
    pub total_amount: Money,
    pub order_type: OrderType,
    pub table_number: Option<u32>,
    pub payment_mode: PaymentMode,
    pub status: OrderStatus,
    pub payment_status: PaymentStatus,
    /// Merchant transaction id of the attempt created for this order.
    pub merchant_transaction_id: Option<MerchantTransactionId>,
    /// Gateway payment id, set when payment succeeds.
    pub payment_id: Option<String>,
    /// Amount confirmed by settlement.
    pub paid_amount: Option<Money>,
    pub loyalty: Option<LoyaltyDetails>,
    pub staff_notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    /// Applies a terminal payment outcome.
    ///
    /// Fails if the payment status is already terminal. Fulfillment-stage
    /// status and staff notes are left untouched; only a `Pending` order
    /// moves (to `Confirmed` on success, `Cancelled` on failure).
    pub fn settle_payment(&mut self, settlement: &PaymentSettlement) -> Result<(), OrderError> {
        if self.payment_status.is_terminal() {
            return Err(OrderError::AlreadySettled {
                status: self.payment_status,
            });
        }

        match settlement.status {
            PaymentStatus::Processing => {
                return Err(OrderError::InvalidSettlement {
                    status: settlement.status,
                });
            }
            PaymentStatus::Success => {
                self.payment_status = PaymentStatus::Success;
                self.paid_amount = Some(settlement.amount);
                self.payment_id = settlement.payment_id.clone();
                if self.status.awaits_payment() {
                    self.status = OrderStatus::Confirmed;
                }
            }
            PaymentStatus::Failed => {
                self.payment_status = PaymentStatus::Failed;
                if self.status.awaits_payment() {
                    self.status = OrderStatus::Cancelled;
                }
            }
            PaymentStatus::Timeout => {
                self.payment_status = PaymentStatus::Timeout;
            }
        }

        if self.merchant_transaction_id.is_none() {
            self.merchant_transaction_id =
                Some(settlement.attempt.merchant_transaction_id.clone());
        }
        self.updated_at = settlement.settled_at;
        Ok(())
    }

    /// Applies a fulfillment patch.
    pub fn apply_patch(&mut self, patch: &OrderPatch, at: DateTime<Utc>) -> Result<(), OrderError> {
        if let Some(next) = patch.status
            && next != self.status
        {
            if !self.status.can_advance_to(next) {
                return Err(OrderError::InvalidStatusTransition {
                    from: self.status,
                    to: next,
                });
            }
            self.status = next;
        }
        if let Some(notes) = &patch.staff_notes {
            self.staff_notes = Some(notes.clone());
        }
        self.updated_at = at;
        Ok(())
    }

    /// Sum of all line totals.
    pub fn items_total(&self) -> Money {
        self.items.iter().map(LineItem::line_total).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::order::NewOrder;
    use crate::payment::{AttemptStatus, PaymentAttempt};

    fn placed_order() -> Order {
        NewOrder::builder("uid-1", "Asha")
            .item(LineItem::new("latte", "Caffe Latte", 2, Money::from_minor(18000)))
            .payment_mode(PaymentMode::Upi)
            .build()
            .into_order(OrderId::new(), MerchantTransactionId::new("TXN1"))
            .unwrap()
    }

    fn settlement(order: &Order, status: AttemptStatus) -> PaymentSettlement {
        let mut attempt = PaymentAttempt::pending(
            MerchantTransactionId::new("TXN1"),
            order.id,
            order.total_amount,
            "INR",
            order.payment_mode,
        );
        attempt.transition(status).unwrap();
        PaymentSettlement::from_attempt(attempt, order.total_amount, Some("PG-1".to_string()))
            .unwrap()
    }

    #[test]
    fn test_success_confirms_pending_order() {
        let mut order = placed_order();
        order.settle_payment(&settlement(&order, AttemptStatus::Success)).unwrap();

        assert_eq!(order.payment_status, PaymentStatus::Success);
        assert_eq!(order.status, OrderStatus::Confirmed);
        assert_eq!(order.paid_amount, Some(Money::from_minor(36000)));
        assert_eq!(order.payment_id.as_deref(), Some("PG-1"));
    }

    #[test]
    fn test_success_keeps_fulfillment_stage() {
        let mut order = placed_order();
        order.status = OrderStatus::Preparing;
        order.staff_notes = Some("extra hot".to_string());

        order.settle_payment(&settlement(&order, AttemptStatus::Success)).unwrap();

        assert_eq!(order.status, OrderStatus::Preparing);
        assert_eq!(order.staff_notes.as_deref(), Some("extra hot"));
    }

    #[test]
    fn test_failure_and_cancellation_cancel_order() {
        for status in [AttemptStatus::Failed, AttemptStatus::Cancelled] {
            let mut order = placed_order();
            order.settle_payment(&settlement(&order, status)).unwrap();
            assert_eq!(order.payment_status, PaymentStatus::Failed);
            assert_eq!(order.status, OrderStatus::Cancelled);
            assert!(order.paid_amount.is_none());
        }
    }

    #[test]
    fn test_timeout_leaves_order_pending() {
        let mut order = placed_order();
        order.settle_payment(&settlement(&order, AttemptStatus::Timeout)).unwrap();
        assert_eq!(order.payment_status, PaymentStatus::Timeout);
        assert_eq!(order.status, OrderStatus::Pending);
    }

    #[test]
    fn test_terminal_payment_status_is_immutable() {
        let mut order = placed_order();
        order.settle_payment(&settlement(&order, AttemptStatus::Failed)).unwrap();

        let err = order
            .settle_payment(&settlement(&order, AttemptStatus::Success))
            .unwrap_err();
        assert!(matches!(
            err,
            OrderError::AlreadySettled {
                status: PaymentStatus::Failed
            }
        ));
        assert_eq!(order.payment_status, PaymentStatus::Failed);
    }

    #[test]
    fn test_patch_advances_one_step() {
        let mut order = placed_order();
        order.settle_payment(&settlement(&order, AttemptStatus::Success)).unwrap();

        order
            .apply_patch(&OrderPatch::advance_to(OrderStatus::Preparing), Utc::now())
            .unwrap();
        assert_eq!(order.status, OrderStatus::Preparing);

        let err = order
            .apply_patch(&OrderPatch::advance_to(OrderStatus::Served), Utc::now())
            .unwrap_err();
        assert!(matches!(err, OrderError::InvalidStatusTransition { .. }));
    }

    #[test]
    fn test_patch_cannot_confirm_unpaid_order() {
        let mut order = placed_order();
        let err = order
            .apply_patch(&OrderPatch::advance_to(OrderStatus::Confirmed), Utc::now())
            .unwrap_err();
        assert!(matches!(err, OrderError::InvalidStatusTransition { .. }));
    }

    #[test]
    fn test_patch_sets_staff_notes_only() {
        let mut order = placed_order();
        let patch = OrderPatch {
            status: None,
            staff_notes: Some("no sugar".to_string()),
        };
        order.apply_patch(&patch, Utc::now()).unwrap();
        assert_eq!(order.staff_notes.as_deref(), Some("no sugar"));
        assert_eq!(order.status, OrderStatus::Pending);
        assert_eq!(order.payment_status, PaymentStatus::Processing);
    }
}
