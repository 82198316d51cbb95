//! Payment initiation.

use std::sync::Arc;

use domain::{AttemptStatus, MerchantTransactionId, Money, Order};
use serde_json::Value;

use crate::config::CheckoutConfig;
use crate::error::{CheckoutError, Result};
use crate::gateway::{GatewayRequest, GatewayStatus, PaymentGateway, PaymentInstrument};
use crate::txn_id::TransactionIdGenerator;

/// A terminal (or locally timed out) payment outcome, ready to reconcile.
#[derive(Debug, Clone, PartialEq)]
pub struct PaymentOutcome {
    pub merchant_transaction_id: MerchantTransactionId,
    pub status: AttemptStatus,
    pub payment_id: Option<String>,
    pub gateway_transaction_id: Option<String>,
    /// Amount reported by the gateway, if any.
    pub amount: Option<Money>,
    pub raw: Option<Value>,
}

impl PaymentOutcome {
    /// Outcome from a gateway status answer.
    pub fn from_gateway(
        merchant_transaction_id: MerchantTransactionId,
        status: AttemptStatus,
        response: GatewayStatus,
    ) -> Self {
        Self {
            merchant_transaction_id,
            status,
            payment_id: response.payment_id,
            gateway_transaction_id: response.gateway_transaction_id,
            amount: response.amount,
            raw: Some(response.raw),
        }
    }

    /// Synthetic success for a counter payment.
    pub fn cash(merchant_transaction_id: MerchantTransactionId, amount: Money) -> Self {
        Self {
            payment_id: Some(format!("CASH-{merchant_transaction_id}")),
            merchant_transaction_id,
            status: AttemptStatus::Success,
            gateway_transaction_id: None,
            amount: Some(amount),
            raw: None,
        }
    }

    /// Polling gave up without a terminal status.
    pub fn timed_out(merchant_transaction_id: MerchantTransactionId) -> Self {
        Self::local(merchant_transaction_id, AttemptStatus::Timeout)
    }

    /// The gateway refused the submission; nothing was charged.
    pub fn rejected(merchant_transaction_id: MerchantTransactionId) -> Self {
        Self::local(merchant_transaction_id, AttemptStatus::Failed)
    }

    fn local(merchant_transaction_id: MerchantTransactionId, status: AttemptStatus) -> Self {
        Self {
            merchant_transaction_id,
            status,
            payment_id: None,
            gateway_transaction_id: None,
            amount: None,
            raw: None,
        }
    }
}

/// A submitted payment still waiting for the customer or the gateway.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingPayment {
    pub merchant_transaction_id: MerchantTransactionId,
    pub gateway_transaction_id: Option<String>,
    pub redirect_url: Option<String>,
}

/// What the gateway said to a payment submission.
#[derive(Debug, Clone, PartialEq)]
pub enum InitiationOutcome {
    Terminal(PaymentOutcome),
    Pending(PendingPayment),
}

/// Submits payments to the gateway. Submissions are never retried.
#[derive(Clone)]
pub struct PaymentInitiator {
    gateway: Arc<dyn PaymentGateway>,
    ids: TransactionIdGenerator,
    currency: String,
    redirect_url: String,
    callback_url: String,
}

impl PaymentInitiator {
    pub fn new(
        gateway: Arc<dyn PaymentGateway>,
        ids: TransactionIdGenerator,
        config: &CheckoutConfig,
    ) -> Self {
        Self {
            gateway,
            ids,
            currency: config.currency.clone(),
            redirect_url: config.redirect_url.clone(),
            callback_url: config.callback_url.clone(),
        }
    }

    /// Id for a new attempt: issued by the gateway if it issues them,
    /// generated locally otherwise.
    pub async fn next_transaction_id(&self) -> MerchantTransactionId {
        match self.gateway.issue_transaction_id().await {
            Some(id) => id,
            None => self.ids.generate(),
        }
    }

    /// Submits the payment for an order.
    #[tracing::instrument(skip(self, order, instrument), fields(order_id = %order.id, mode = %instrument.mode()))]
    pub async fn initiate(
        &self,
        order: &Order,
        instrument: PaymentInstrument,
    ) -> Result<InitiationOutcome> {
        let merchant_transaction_id = match &order.merchant_transaction_id {
            Some(id) => id.clone(),
            None => self.next_transaction_id().await,
        };

        let request = GatewayRequest {
            merchant_transaction_id: merchant_transaction_id.clone(),
            order_id: order.id,
            customer_id: order.customer_id.clone(),
            amount: order.total_amount,
            currency: self.currency.clone(),
            redirect_url: self.redirect_url.clone(),
            callback_url: self.callback_url.clone(),
            instrument,
        };

        let response = match self.gateway.initiate(request).await {
            Ok(response) => response,
            Err(err) => {
                metrics::counter!("payment_initiations_total", "outcome" => "error").increment(1);
                tracing::warn!(error = %err, "payment initiation failed");
                return Err(CheckoutError::Initiation(err));
            }
        };

        let status = AttemptStatus::from_gateway(&response.status).map_err(|_| {
            metrics::counter!("payment_initiations_total", "outcome" => "unexpected").increment(1);
            CheckoutError::UnexpectedStatus {
                status: response.status.clone(),
            }
        })?;

        let outcome = if status == AttemptStatus::Pending {
            InitiationOutcome::Pending(PendingPayment {
                merchant_transaction_id,
                gateway_transaction_id: response.gateway_transaction_id,
                redirect_url: response.redirect_url,
            })
        } else {
            InitiationOutcome::Terminal(PaymentOutcome {
                merchant_transaction_id,
                status,
                payment_id: response.payment_id,
                gateway_transaction_id: response.gateway_transaction_id,
                amount: None,
                raw: Some(response.raw),
            })
        };

        let label = match &outcome {
            InitiationOutcome::Pending(_) => "pending",
            InitiationOutcome::Terminal(_) => "terminal",
        };
        metrics::counter!("payment_initiations_total", "outcome" => label).increment(1);
        tracing::info!(status = %status, "payment initiated");
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use common::OrderId;
    use domain::{LineItem, NewOrder};

    use super::*;
    use crate::gateway::{GatewayError, InMemoryPaymentGateway};

    fn order() -> Order {
        NewOrder::builder("uid-1", "Asha")
            .item(LineItem::new("latte", "Caffe Latte", 1, Money::from_minor(18000)))
            .build()
            .into_order(OrderId::new(), MerchantTransactionId::new("TXN1"))
            .unwrap()
    }

    fn initiator(gateway: &InMemoryPaymentGateway) -> PaymentInitiator {
        PaymentInitiator::new(
            Arc::new(gateway.clone()),
            TransactionIdGenerator::default(),
            &CheckoutConfig::default(),
        )
    }

    #[tokio::test]
    async fn test_pending_with_redirect() {
        let gateway = InMemoryPaymentGateway::new();
        gateway.respond_to_initiation(InMemoryPaymentGateway::initiation(
            "pending",
            Some("upi://pay"),
        ));

        let outcome = initiator(&gateway)
            .initiate(&order(), PaymentInstrument::Upi { vpa: None })
            .await
            .unwrap();

        match outcome {
            InitiationOutcome::Pending(pending) => {
                assert_eq!(pending.merchant_transaction_id.as_str(), "TXN1");
                assert_eq!(pending.redirect_url.as_deref(), Some("upi://pay"));
            }
            other => panic!("expected pending, got {other:?}"),
        }
        assert_eq!(gateway.last_amount(), Some(Money::from_minor(18000)));
    }

    #[tokio::test]
    async fn test_completed_is_terminal_success() {
        let gateway = InMemoryPaymentGateway::new();
        let mut response = InMemoryPaymentGateway::initiation("COMPLETED", None);
        response.payment_id = Some("PAY-9".to_string());
        gateway.respond_to_initiation(response);

        let outcome = initiator(&gateway)
            .initiate(&order(), PaymentInstrument::Upi { vpa: None })
            .await
            .unwrap();

        match outcome {
            InitiationOutcome::Terminal(outcome) => {
                assert_eq!(outcome.status, AttemptStatus::Success);
                assert_eq!(outcome.payment_id.as_deref(), Some("PAY-9"));
            }
            other => panic!("expected terminal, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_unknown_status_is_unexpected() {
        let gateway = InMemoryPaymentGateway::new();
        gateway.respond_to_initiation(InMemoryPaymentGateway::initiation("AUTHORIZED", None));

        let err = initiator(&gateway)
            .initiate(&order(), PaymentInstrument::Upi { vpa: None })
            .await
            .unwrap_err();
        assert!(matches!(err, CheckoutError::UnexpectedStatus { status } if status == "AUTHORIZED"));
    }

    #[tokio::test]
    async fn test_transport_error_is_not_retried() {
        let gateway = InMemoryPaymentGateway::new();
        gateway.fail_initiation(GatewayError::Transport("connection refused".to_string()));

        let err = initiator(&gateway)
            .initiate(&order(), PaymentInstrument::Upi { vpa: None })
            .await
            .unwrap_err();

        assert!(matches!(err, CheckoutError::Initiation(_)));
        // The request may have reached the gateway
        assert!(!err.is_retryable());
        assert_eq!(gateway.initiate_calls(), 1);
    }

    #[tokio::test]
    async fn test_rejection_is_retryable() {
        let gateway = InMemoryPaymentGateway::new();
        gateway.fail_initiation(GatewayError::Rejected {
            code: "BAD_REQUEST".to_string(),
            message: "invalid VPA".to_string(),
        });

        let err = initiator(&gateway)
            .initiate(&order(), PaymentInstrument::Upi { vpa: None })
            .await
            .unwrap_err();

        assert!(err.is_retryable());
        assert_eq!(gateway.initiate_calls(), 1);
    }

    #[tokio::test]
    async fn test_gateway_issued_ids_take_precedence() {
        let gateway = InMemoryPaymentGateway::new();
        gateway.issue_ids(["GW-ISSUED-1"]);
        let initiator = initiator(&gateway);

        assert_eq!(initiator.next_transaction_id().await.as_str(), "GW-ISSUED-1");
        assert!(initiator.next_transaction_id().await.as_str().starts_with("TXN"));
    }

    #[test]
    fn test_cash_outcome() {
        let outcome = PaymentOutcome::cash(MerchantTransactionId::new("TXN5"), Money::from_minor(700));
        assert_eq!(outcome.status, AttemptStatus::Success);
        assert_eq!(outcome.payment_id.as_deref(), Some("CASH-TXN5"));
        assert_eq!(outcome.amount, Some(Money::from_minor(700)));
    }
}
