//! Hands a pending payment to the customer's payment app, if possible.

use std::sync::Arc;

use crate::initiator::PendingPayment;
use crate::ports::{CheckoutHost, UrlLauncher};

pub const COMPLETE_IN_APP_MESSAGE: &str =
    "Complete the payment in your payment app, then return here.";

/// How a pending payment continues.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteDecision {
    /// The payment app was opened; poll while the customer pays there.
    OpenedRedirect { url: String },
    /// No usable redirect; poll straight away.
    PollDirectly,
}

/// Routes pending payments. Never fails: every problem degrades to polling.
#[derive(Clone)]
pub struct CompletionRouter {
    launcher: Arc<dyn UrlLauncher>,
}

impl CompletionRouter {
    pub fn new(launcher: Arc<dyn UrlLauncher>) -> Self {
        Self { launcher }
    }

    #[tracing::instrument(skip_all, fields(merchant_transaction_id = %pending.merchant_transaction_id))]
    pub async fn route(&self, pending: &PendingPayment, host: &dyn CheckoutHost) -> RouteDecision {
        let Some(url) = pending.redirect_url.as_deref() else {
            return RouteDecision::PollDirectly;
        };

        if !self.launcher.can_open(url).await {
            tracing::info!("no handler for payment link, polling directly");
            return RouteDecision::PollDirectly;
        }

        match self.launcher.open(url).await {
            Ok(()) => {
                host.on_require_user_action(COMPLETE_IN_APP_MESSAGE);
                RouteDecision::OpenedRedirect {
                    url: url.to_string(),
                }
            }
            Err(err) => {
                tracing::warn!(error = %err, "failed to open payment link, polling directly");
                RouteDecision::PollDirectly
            }
        }
    }
}
