use domain::{OrderError, PaymentStatus};
use thiserror::Error;

use crate::OrderId;

/// Errors that can occur when interacting with the order ledger.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// The order does not exist.
    #[error("Order not found: {0}")]
    OrderNotFound(OrderId),

    /// An order with this id already exists.
    #[error("Order already exists: {0}")]
    DuplicateOrder(OrderId),

    /// The requested change violates an order rule.
    #[error("Order rule violated: {0}")]
    Order(#[from] OrderError),

    /// The ledger could not be reached or refused the write.
    #[error("Ledger unavailable: {0}")]
    Unavailable(String),

    /// Stored data no longer maps onto the domain model.
    #[error("Corrupt ledger data: {0}")]
    Corrupt(String),

    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A database migration error occurred.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// A serialization/deserialization error occurred.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl LedgerError {
    /// The status that won, if the write lost a race against an earlier
    /// settlement.
    pub fn settled_status(&self) -> Option<PaymentStatus> {
        match self {
            LedgerError::Order(OrderError::AlreadySettled { status }) => Some(*status),
            _ => None,
        }
    }

    /// Returns true if the write lost a race against an earlier settlement.
    pub fn is_already_settled(&self) -> bool {
        self.settled_status().is_some()
    }

    /// Returns true if repeating the same call may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            LedgerError::Unavailable(_) => true,
            LedgerError::Database(err) => !matches!(
                err,
                sqlx::Error::RowNotFound
                    | sqlx::Error::ColumnNotFound(_)
                    | sqlx::Error::ColumnDecode { .. }
                    | sqlx::Error::TypeNotFound { .. }
                    | sqlx::Error::Decode(_)
            ),
            _ => false,
        }
    }
}

/// Result type for ledger operations.
pub type Result<T> = std::result::Result<T, LedgerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_settled_status_of_lost_race() {
        let err = LedgerError::Order(OrderError::AlreadySettled {
            status: PaymentStatus::Failed,
        });
        assert_eq!(err.settled_status(), Some(PaymentStatus::Failed));
        assert!(err.is_already_settled());
        assert!(!err.is_transient());

        let other = LedgerError::Unavailable("connection refused".to_string());
        assert_eq!(other.settled_status(), None);
    }

    #[test]
    fn test_only_outages_are_transient() {
        assert!(LedgerError::Unavailable("pool exhausted".to_string()).is_transient());
        assert!(LedgerError::Database(sqlx::Error::PoolTimedOut).is_transient());
        assert!(!LedgerError::Corrupt("unknown payment method 'cheque'".to_string()).is_transient());
        assert!(!LedgerError::Database(sqlx::Error::RowNotFound).is_transient());
        assert!(!LedgerError::OrderNotFound(OrderId::new()).is_transient());
    }
}
