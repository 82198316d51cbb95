//! Terminal payment outcome as written to the ledger.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::order::{Money, OrderError, PaymentStatus};

use super::{AttemptStatus, PaymentAttempt};

/// The multi-field write that settles an order's payment.
///
/// Ledgers apply it atomically: order payment status, paid amount, payment
/// id, timestamp and the attempt row change together or not at all.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentSettlement {
    pub status: PaymentStatus,
    pub amount: Money,
    pub payment_id: Option<String>,
    pub attempt: PaymentAttempt,
    pub settled_at: DateTime<Utc>,
}

impl PaymentSettlement {
    /// Builds a settlement from an attempt that reached a terminal status.
    pub fn from_attempt(
        attempt: PaymentAttempt,
        amount: Money,
        payment_id: Option<String>,
    ) -> Result<Self, OrderError> {
        let status = match attempt.status {
            AttemptStatus::Success => PaymentStatus::Success,
            AttemptStatus::Failed | AttemptStatus::Cancelled => PaymentStatus::Failed,
            AttemptStatus::Timeout => PaymentStatus::Timeout,
            AttemptStatus::Pending => {
                return Err(OrderError::InvalidSettlement {
                    status: PaymentStatus::Processing,
                });
            }
        };

        Ok(Self {
            status,
            amount,
            payment_id,
            attempt,
            settled_at: Utc::now(),
        })
    }
}

#[cfg(test)]
mod tests {
    use common::OrderId;

    use super::*;
    use crate::order::PaymentMode;
    use crate::payment::MerchantTransactionId;

    fn attempt(status: AttemptStatus) -> PaymentAttempt {
        let mut attempt = PaymentAttempt::pending(
            MerchantTransactionId::new("TXN9"),
            OrderId::new(),
            Money::from_minor(500),
            "INR",
            PaymentMode::Card,
        );
        if status != AttemptStatus::Pending {
            attempt.transition(status).unwrap();
        }
        attempt
    }

    #[test]
    fn test_status_mapping() {
        let cases = [
            (AttemptStatus::Success, PaymentStatus::Success),
            (AttemptStatus::Failed, PaymentStatus::Failed),
            (AttemptStatus::Cancelled, PaymentStatus::Failed),
            (AttemptStatus::Timeout, PaymentStatus::Timeout),
        ];
        for (attempt_status, expected) in cases {
            let settlement =
                PaymentSettlement::from_attempt(attempt(attempt_status), Money::from_minor(500), None)
                    .unwrap();
            assert_eq!(settlement.status, expected);
        }
    }

    #[test]
    fn test_pending_attempt_cannot_settle() {
        let result =
            PaymentSettlement::from_attempt(attempt(AttemptStatus::Pending), Money::from_minor(500), None);
        assert!(matches!(result, Err(OrderError::InvalidSettlement { .. })));
    }
}
