//! Identifiers shared by every crate in the checkout workspace.

mod types;

pub use types::{OrderId, ParseOrderIdError};
