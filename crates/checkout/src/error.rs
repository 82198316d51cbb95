//! Checkout error types.

use std::time::Duration;

use common::OrderId;
use domain::OrderError;
use ledger::LedgerError;
use thiserror::Error;

use crate::gateway::GatewayError;

/// Errors that can occur during checkout.
#[derive(Debug, Error)]
pub enum CheckoutError {
    /// Bad input; the gateway was never contacted.
    #[error("Validation failed: {0}")]
    Validation(#[source] OrderError),

    /// The gateway refused the request, or its answer never arrived.
    #[error("Payment initiation failed: {0}")]
    Initiation(#[source] GatewayError),

    /// A status query failed outside of polling.
    #[error("Payment status query failed: {0}")]
    StatusQuery(#[source] GatewayError),

    /// The gateway reported a status outside the known set.
    #[error("Unexpected payment status: '{status}'")]
    UnexpectedStatus { status: String },

    /// A terminal success without the fields needed to settle it.
    #[error("Incomplete payment result for order {order_id}: missing {field}")]
    IncompleteResult {
        order_id: OrderId,
        field: &'static str,
    },

    /// The post-charge ledger write failed after every retry.
    #[error("Ledger write failed after {attempts} attempt(s): {source}")]
    LedgerWrite {
        attempts: u32,
        #[source]
        source: LedgerError,
    },

    /// Polling ended without a terminal status.
    #[error("Payment status unknown after {attempts} status check(s) in {elapsed:?}")]
    Timeout { attempts: u32, elapsed: Duration },

    /// A result arrived for an attempt that is no longer the active one.
    #[error("Ignored stale result for order {order_id} (epoch {epoch})")]
    StaleResultIgnored { order_id: OrderId, epoch: u64 },

    /// The ledger failed outside the retried settlement write.
    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),
}

impl CheckoutError {
    /// Returns true if no charge can have happened, so the customer may
    /// simply try again.
    pub fn is_retryable(&self) -> bool {
        match self {
            CheckoutError::Validation(_) => true,
            CheckoutError::Initiation(err) => err.is_definitive(),
            _ => false,
        }
    }
}

impl From<OrderError> for CheckoutError {
    fn from(err: OrderError) -> Self {
        CheckoutError::Validation(err)
    }
}

/// Convenience type alias for checkout results.
pub type Result<T> = std::result::Result<T, CheckoutError>;
