//! Checkout input and its validation.

use chrono::Utc;
use common::OrderId;
use serde::{Deserialize, Serialize};

use crate::payment::MerchantTransactionId;

use super::{
    CustomerId, LineItem, LoyaltyDetails, Money, Order, OrderError, OrderStatus, OrderType,
    PaymentMode, PaymentStatus,
};

/// Everything the client submits to place an order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewOrder {
    pub customer_id: CustomerId,
    pub display_name: String,
    pub items: Vec<LineItem>,
    pub total_amount: Money,
    pub order_type: OrderType,
    #[serde(default)]
    pub table_number: Option<u32>,
    pub payment_mode: PaymentMode,
    #[serde(default)]
    pub loyalty: Option<LoyaltyDetails>,
    #[serde(default)]
    pub staff_notes: Option<String>,
}

impl NewOrder {
    /// Starts a builder for a takeaway order paid by UPI.
    pub fn builder(
        customer_id: impl Into<CustomerId>,
        display_name: impl Into<String>,
    ) -> NewOrderBuilder {
        NewOrderBuilder {
            order: NewOrder {
                customer_id: customer_id.into(),
                display_name: display_name.into(),
                items: Vec::new(),
                total_amount: Money::zero(),
                order_type: OrderType::Takeaway,
                table_number: None,
                payment_mode: PaymentMode::Upi,
                loyalty: None,
                staff_notes: None,
            },
            explicit_total: None,
        }
    }

    /// Checks the intake constraints.
    pub fn validate(&self) -> Result<(), OrderError> {
        if self.customer_id.is_blank() {
            return Err(OrderError::CustomerIdRequired);
        }
        if self.display_name.trim().is_empty() {
            return Err(OrderError::DisplayNameRequired);
        }
        if self.items.is_empty() {
            return Err(OrderError::NoItems);
        }
        for item in &self.items {
            if item.quantity == 0 {
                return Err(OrderError::InvalidQuantity {
                    product_id: item.product_id.to_string(),
                    quantity: item.quantity,
                });
            }
            if !item.unit_price.is_positive() {
                return Err(OrderError::InvalidPrice {
                    product_id: item.product_id.to_string(),
                    price: item.unit_price.minor_units(),
                });
            }
        }
        if !self.total_amount.is_positive() {
            return Err(OrderError::InvalidAmount {
                amount: self.total_amount.minor_units(),
            });
        }
        if self.table_number.is_some() && self.order_type != OrderType::DineIn {
            return Err(OrderError::TableNumberNotAllowed {
                order_type: self.order_type,
            });
        }
        Ok(())
    }

    /// Validates and turns the input into a `Pending`/`Processing` order.
    pub fn into_order(
        self,
        id: OrderId,
        merchant_transaction_id: MerchantTransactionId,
    ) -> Result<Order, OrderError> {
        self.validate()?;
        let now = Utc::now();
        Ok(Order {
            id,
            customer_id: self.customer_id,
            display_name: self.display_name.trim().to_string(),
            items: self.items,
            total_amount: self.total_amount,
            order_type: self.order_type,
            table_number: self.table_number,
            payment_mode: self.payment_mode,
            status: OrderStatus::Pending,
            payment_status: PaymentStatus::Processing,
            merchant_transaction_id: Some(merchant_transaction_id),
            payment_id: None,
            paid_amount: None,
            loyalty: self.loyalty,
            staff_notes: self.staff_notes,
            created_at: now,
            updated_at: now,
        })
    }
}

/// Builder for [`NewOrder`]; the total defaults to the sum of the items.
#[derive(Debug, Clone)]
pub struct NewOrderBuilder {
    order: NewOrder,
    explicit_total: Option<Money>,
}

impl NewOrderBuilder {
    pub fn item(mut self, item: LineItem) -> Self {
        self.order.items.push(item);
        self
    }

    /// Overrides the computed total (e.g. after a loyalty discount).
    pub fn total(mut self, total: Money) -> Self {
        self.explicit_total = Some(total);
        self
    }

    pub fn dine_in(mut self, table_number: Option<u32>) -> Self {
        self.order.order_type = OrderType::DineIn;
        self.order.table_number = table_number;
        self
    }

    pub fn payment_mode(mut self, mode: PaymentMode) -> Self {
        self.order.payment_mode = mode;
        self
    }

    pub fn loyalty(mut self, loyalty: LoyaltyDetails) -> Self {
        self.order.loyalty = Some(loyalty);
        self
    }

    pub fn staff_notes(mut self, notes: impl Into<String>) -> Self {
        self.order.staff_notes = Some(notes.into());
        self
    }

    pub fn build(mut self) -> NewOrder {
        self.order.total_amount = self
            .explicit_total
            .unwrap_or_else(|| self.order.items.iter().map(LineItem::line_total).sum());
        self.order
    }
}
