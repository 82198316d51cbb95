//! Payment attempts and settlements.

mod attempt;
mod settlement;

pub use attempt::{AttemptStatus, MerchantTransactionId, PaymentAttempt};
pub use settlement::PaymentSettlement;
