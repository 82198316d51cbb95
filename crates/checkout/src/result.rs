//! User-visible checkout results.

use common::OrderId;
use domain::{MerchantTransactionId, Money, PaymentStatus};
use serde::Serialize;

/// Who to contact about a payment, and the reference to quote.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SupportContact {
    pub contact: String,
    pub reference: String,
}

impl SupportContact {
    /// Builds a contact quoting the order's short reference and, when
    /// known, the merchant transaction id.
    pub fn for_order(
        contact: &str,
        order_id: OrderId,
        merchant_transaction_id: Option<&MerchantTransactionId>,
    ) -> Self {
        let reference = match merchant_transaction_id {
            Some(txn) => format!("{} / {}", order_id.short_ref(), txn),
            None => order_id.short_ref(),
        };
        Self {
            contact: contact.to_string(),
            reference,
        }
    }
}

/// Outcome of a checkout, as presented to the customer.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum CheckoutResult {
    /// Paid and recorded. Navigate to the order status view.
    Confirmed {
        order_id: OrderId,
        amount: Money,
        payment_id: String,
    },

    /// Paid, but the order record could not be updated. The customer must
    /// not pay again.
    ConfirmedUnsaved {
        order_id: OrderId,
        amount: Money,
        payment_id: String,
        message: String,
        support: SupportContact,
    },

    /// No money moved.
    Failed {
        order_id: Option<OrderId>,
        reason: String,
        /// True when trying again is safe.
        retryable: bool,
        support: SupportContact,
    },

    /// The gateway may still complete the payment out of band.
    StatusUnknown {
        order_id: OrderId,
        merchant_transaction_id: MerchantTransactionId,
        message: String,
        support: SupportContact,
    },

    /// The customer left before the payment resolved. The order stays
    /// `Processing` for later reconciliation.
    Abandoned {
        order_id: OrderId,
        merchant_transaction_id: MerchantTransactionId,
    },

    /// The order's payment had already been settled; nothing changed.
    AlreadySettled {
        order_id: OrderId,
        payment_status: PaymentStatus,
    },
}

impl CheckoutResult {
    pub fn order_id(&self) -> Option<OrderId> {
        match self {
            CheckoutResult::Confirmed { order_id, .. }
            | CheckoutResult::ConfirmedUnsaved { order_id, .. }
            | CheckoutResult::StatusUnknown { order_id, .. }
            | CheckoutResult::Abandoned { order_id, .. }
            | CheckoutResult::AlreadySettled { order_id, .. } => Some(*order_id),
            CheckoutResult::Failed { order_id, .. } => *order_id,
        }
    }

    /// Returns true if the customer has paid.
    pub fn is_paid(&self) -> bool {
        matches!(
            self,
            CheckoutResult::Confirmed { .. } | CheckoutResult::ConfirmedUnsaved { .. }
        )
    }

    pub fn support(&self) -> Option<&SupportContact> {
        match self {
            CheckoutResult::ConfirmedUnsaved { support, .. }
            | CheckoutResult::Failed { support, .. }
            | CheckoutResult::StatusUnknown { support, .. } => Some(support),
            _ => None,
        }
    }

    /// Label used for metrics and logs.
    pub fn label(&self) -> &'static str {
        match self {
            CheckoutResult::Confirmed { .. } => "confirmed",
            CheckoutResult::ConfirmedUnsaved { .. } => "confirmed_unsaved",
            CheckoutResult::Failed { .. } => "failed",
            CheckoutResult::StatusUnknown { .. } => "status_unknown",
            CheckoutResult::Abandoned { .. } => "abandoned",
            CheckoutResult::AlreadySettled { .. } => "already_settled",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_support_reference_quotes_order_and_txn() {
        let order_id = OrderId::new();
        let txn = MerchantTransactionId::new("TXN123");
        let support = SupportContact::for_order("help@shop.test", order_id, Some(&txn));

        assert_eq!(support.reference, format!("{} / TXN123", order_id.short_ref()));
        assert_eq!(
            SupportContact::for_order("help@shop.test", order_id, None).reference,
            order_id.short_ref()
        );
    }

    #[test]
    fn test_serializes_with_outcome_tag() {
        let result = CheckoutResult::Confirmed {
            order_id: OrderId::new(),
            amount: Money::from_minor(18000),
            payment_id: "PAY-1".to_string(),
        };
        let json = serde_json::to_value(&result).unwrap();

        assert_eq!(json["outcome"], "confirmed");
        assert_eq!(json["amount"], 18000);
        assert!(result.is_paid());
        assert!(result.support().is_none());
    }
}
