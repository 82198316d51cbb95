use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use domain::{MerchantTransactionId, Money};
use serde_json::json;

use super::{GatewayError, GatewayInitiation, GatewayRequest, GatewayStatus, PaymentGateway};

/// Scripted answer to a status query.
type StatusStep = Result<GatewayStatus, GatewayError>;

#[derive(Debug)]
struct FakeGatewayState {
    issued_ids: VecDeque<String>,
    initiation: Result<GatewayInitiation, GatewayError>,
    statuses: HashMap<String, VecDeque<StatusStep>>,
    settle_by_default: bool,
    status_latency: Duration,
    requests: Vec<GatewayRequest>,
    status_calls: HashMap<String, u32>,
    next_id: u32,
}

impl Default for FakeGatewayState {
    fn default() -> Self {
        Self {
            issued_ids: VecDeque::new(),
            initiation: Ok(InMemoryPaymentGateway::initiation("PENDING", None)),
            statuses: HashMap::new(),
            settle_by_default: false,
            status_latency: Duration::ZERO,
            requests: Vec::new(),
            status_calls: HashMap::new(),
            next_id: 0,
        }
    }
}

/// In-memory payment gateway.
///
/// Answers are scripted per merchant transaction id; the last scripted step
/// repeats. Unscripted transactions stay `PENDING`, or settle successfully
/// in sandbox mode.
#[derive(Debug, Clone, Default)]
pub struct InMemoryPaymentGateway {
    state: Arc<Mutex<FakeGatewayState>>,
}

impl InMemoryPaymentGateway {
    /// Creates a gateway whose payments stay pending until scripted.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a gateway that settles every unscripted payment successfully.
    pub fn sandbox() -> Self {
        let gateway = Self::default();
        gateway.lock().settle_by_default = true;
        gateway
    }

    fn lock(&self) -> MutexGuard<'_, FakeGatewayState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Builds an initiation response.
    pub fn initiation(status: &str, redirect_url: Option<&str>) -> GatewayInitiation {
        GatewayInitiation {
            status: status.to_string(),
            gateway_transaction_id: None,
            payment_id: None,
            redirect_url: redirect_url.map(str::to_string),
            raw: json!({ "state": status }),
        }
    }

    /// Builds a status response.
    pub fn status_response(status: &str, payment_id: Option<&str>) -> GatewayStatus {
        GatewayStatus {
            status: status.to_string(),
            gateway_transaction_id: payment_id.map(str::to_string),
            payment_id: payment_id.map(str::to_string),
            amount: None,
            raw: json!({ "state": status, "transactionId": payment_id }),
        }
    }

    /// Queues merchant transaction ids for the gateway to issue.
    pub fn issue_ids<I, S>(&self, ids: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.lock().issued_ids.extend(ids.into_iter().map(Into::into));
    }

    /// Sets the answer to every following initiation.
    pub fn respond_to_initiation(&self, response: GatewayInitiation) {
        self.lock().initiation = Ok(response);
    }

    /// Makes every following initiation fail.
    pub fn fail_initiation(&self, error: GatewayError) {
        self.lock().initiation = Err(error);
    }

    /// Appends status answers for a transaction.
    pub fn script_status(&self, merchant_transaction_id: &str, steps: Vec<StatusStep>) {
        self.lock()
            .statuses
            .entry(merchant_transaction_id.to_string())
            .or_default()
            .extend(steps);
    }

    /// Delays every status answer.
    pub fn set_status_latency(&self, latency: Duration) {
        self.lock().status_latency = latency;
    }

    /// Number of initiation calls received.
    pub fn initiate_calls(&self) -> usize {
        self.lock().requests.len()
    }

    /// Merchant transaction ids submitted so far, in order.
    pub fn initiated_transactions(&self) -> Vec<MerchantTransactionId> {
        self.lock()
            .requests
            .iter()
            .map(|r| r.merchant_transaction_id.clone())
            .collect()
    }

    /// Amount of the last submitted payment.
    pub fn last_amount(&self) -> Option<Money> {
        self.lock().requests.last().map(|r| r.amount)
    }

    /// Total number of status queries received.
    pub fn status_calls(&self) -> u32 {
        self.lock().status_calls.values().sum()
    }

    /// Number of status queries received for one transaction.
    pub fn status_calls_for(&self, merchant_transaction_id: &str) -> u32 {
        self.lock()
            .status_calls
            .get(merchant_transaction_id)
            .copied()
            .unwrap_or(0)
    }
}

#[async_trait]
impl PaymentGateway for InMemoryPaymentGateway {
    async fn initiate(&self, request: GatewayRequest) -> Result<GatewayInitiation, GatewayError> {
        let mut state = self.lock();
        state.next_id += 1;
        let gateway_transaction_id = format!("PG-{:06}", state.next_id);
        state.requests.push(request);

        let mut response = state.initiation.clone()?;
        response
            .gateway_transaction_id
            .get_or_insert(gateway_transaction_id);
        Ok(response)
    }

    async fn status(
        &self,
        merchant_transaction_id: &MerchantTransactionId,
    ) -> Result<GatewayStatus, GatewayError> {
        let key = merchant_transaction_id.as_str();
        let (latency, step) = {
            let mut state = self.lock();
            *state.status_calls.entry(key.to_string()).or_default() += 1;

            let settle_by_default = state.settle_by_default;
            let step = match state.statuses.get_mut(key) {
                Some(queue) if queue.len() > 1 => queue.pop_front(),
                Some(queue) => queue.front().cloned(),
                None => None,
            };
            let step = step.unwrap_or_else(|| {
                if settle_by_default {
                    Ok(Self::status_response("SUCCESS", Some(&format!("PAY-{key}"))))
                } else {
                    Ok(Self::status_response("PENDING", None))
                }
            });
            (state.status_latency, step)
        };

        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
        step
    }

    async fn issue_transaction_id(&self) -> Option<MerchantTransactionId> {
        self.lock()
            .issued_ids
            .pop_front()
            .map(MerchantTransactionId::new)
    }
}

#[cfg(test)]
mod tests {
    use common::OrderId;
    use domain::CustomerId;

    use super::*;
    use crate::gateway::PaymentInstrument;

    fn request(txn: &str) -> GatewayRequest {
        GatewayRequest {
            merchant_transaction_id: MerchantTransactionId::new(txn),
            order_id: OrderId::new(),
            customer_id: CustomerId::new("uid-1"),
            amount: Money::from_minor(500),
            currency: "INR".to_string(),
            redirect_url: String::new(),
            callback_url: String::new(),
            instrument: PaymentInstrument::Upi { vpa: None },
        }
    }

    #[tokio::test]
    async fn test_scripted_steps_then_last_repeats() {
        let gateway = InMemoryPaymentGateway::new();
        let txn = MerchantTransactionId::new("TXN1");
        gateway.script_status(
            "TXN1",
            vec![
                Err(GatewayError::Transport("blip".to_string())),
                Ok(InMemoryPaymentGateway::status_response("SUCCESS", Some("P1"))),
            ],
        );

        assert!(gateway.status(&txn).await.is_err());
        assert_eq!(gateway.status(&txn).await.unwrap().status, "SUCCESS");
        assert_eq!(gateway.status(&txn).await.unwrap().status, "SUCCESS");
        assert_eq!(gateway.status_calls_for("TXN1"), 3);
    }

    #[tokio::test]
    async fn test_unscripted_status_defaults() {
        let txn = MerchantTransactionId::new("TXN2");
        let pending = InMemoryPaymentGateway::new();
        assert_eq!(pending.status(&txn).await.unwrap().status, "PENDING");

        let sandbox = InMemoryPaymentGateway::sandbox();
        let status = sandbox.status(&txn).await.unwrap();
        assert_eq!(status.status, "SUCCESS");
        assert_eq!(status.payment_id.as_deref(), Some("PAY-TXN2"));
    }

    #[tokio::test]
    async fn test_initiation_records_requests() {
        let gateway = InMemoryPaymentGateway::new();
        let response = gateway.initiate(request("TXN3")).await.unwrap();

        assert_eq!(response.status, "PENDING");
        assert_eq!(response.gateway_transaction_id.as_deref(), Some("PG-000001"));
        assert_eq!(gateway.initiate_calls(), 1);
        assert_eq!(
            gateway.initiated_transactions(),
            vec![MerchantTransactionId::new("TXN3")]
        );
    }

    #[tokio::test]
    async fn test_issued_ids_are_consumed_in_order() {
        let gateway = InMemoryPaymentGateway::new();
        gateway.issue_ids(["A", "B"]);
        assert_eq!(gateway.issue_transaction_id().await.unwrap().as_str(), "A");
        assert_eq!(gateway.issue_transaction_id().await.unwrap().as_str(), "B");
        assert!(gateway.issue_transaction_id().await.is_none());
    }
}
