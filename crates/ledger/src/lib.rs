//! Order ledger: persisted orders and payment attempts.
//!
//! The ledger is the only place order state lives. Intake creates records,
//! the payment reconciler settles them, and fulfillment patches them.

pub mod error;
pub mod memory;
pub mod postgres;
pub mod store;

pub use common::OrderId;
pub use error::{LedgerError, Result};
pub use memory::InMemoryOrderLedger;
pub use postgres::PostgresOrderLedger;
pub use store::{LedgerExt, OrderLedger};
