//! Payment gateway port and its implementations.

mod fake;
mod http;

pub use fake::InMemoryPaymentGateway;
pub use http::{ChecksumScheme, HttpPaymentGateway};

use std::sync::Arc;

use async_trait::async_trait;
use common::OrderId;
use domain::{CustomerId, MerchantTransactionId, Money, PaymentMode};
use serde_json::{Value, json};
use thiserror::Error;

/// Errors raised by gateway clients.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GatewayError {
    /// The request never got a response.
    #[error("Gateway unreachable: {0}")]
    Transport(String),

    /// The gateway answered but refused the request.
    #[error("Gateway rejected request ({code}): {message}")]
    Rejected { code: String, message: String },

    /// The response could not be understood.
    #[error("Invalid gateway response: {0}")]
    InvalidResponse(String),

    /// The request could not be signed.
    #[error("Failed to sign gateway request: {0}")]
    Signing(String),
}

impl GatewayError {
    /// Returns true if the gateway cannot have accepted the payment.
    ///
    /// A transport failure or an unreadable answer may arrive after the
    /// gateway already took the charge.
    pub fn is_definitive(&self) -> bool {
        matches!(self, GatewayError::Rejected { .. } | GatewayError::Signing(_))
    }
}

/// Card data entered at checkout.
///
/// Number and CVV are write-only: they never show up in `Debug` output and
/// are only read by the wire encoder.
#[derive(Clone)]
pub struct CardDetails {
    number: String,
    cvv: String,
    pub expiry_month: u8,
    pub expiry_year: u16,
    pub holder_name: String,
}

impl CardDetails {
    pub fn new(
        number: impl Into<String>,
        cvv: impl Into<String>,
        expiry_month: u8,
        expiry_year: u16,
        holder_name: impl Into<String>,
    ) -> Self {
        Self {
            number: number.into(),
            cvv: cvv.into(),
            expiry_month,
            expiry_year,
            holder_name: holder_name.into(),
        }
    }

    /// Card number with everything but the last four digits masked.
    pub fn masked_number(&self) -> String {
        let digits: Vec<char> = self.number.chars().filter(char::is_ascii_digit).collect();
        let visible = digits.len().saturating_sub(4);
        let last_four: String = digits[visible..].iter().collect();
        format!("{}{}", "*".repeat(visible), last_four)
    }

    pub(crate) fn to_wire(&self) -> Value {
        json!({
            "number": self.number,
            "cvv": self.cvv,
            "expiryMonth": self.expiry_month,
            "expiryYear": self.expiry_year,
            "cardHolderName": self.holder_name,
        })
    }
}

impl std::fmt::Debug for CardDetails {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CardDetails")
            .field("number", &self.masked_number())
            .field("cvv", &"***")
            .field("expiry_month", &self.expiry_month)
            .field("expiry_year", &self.expiry_year)
            .finish_non_exhaustive()
    }
}

/// How the customer pays through the gateway.
#[derive(Debug, Clone)]
pub enum PaymentInstrument {
    /// Paid at the counter.
    Cash,
    /// UPI intent flow, optionally pinned to a VPA.
    Upi { vpa: Option<String> },
    Card(CardDetails),
    Wallet { provider: String },
}

impl PaymentInstrument {
    pub fn mode(&self) -> PaymentMode {
        match self {
            PaymentInstrument::Cash => PaymentMode::Cash,
            PaymentInstrument::Upi { .. } => PaymentMode::Upi,
            PaymentInstrument::Card(_) => PaymentMode::Card,
            PaymentInstrument::Wallet { .. } => PaymentMode::Wallet,
        }
    }

    /// Default instrument for a payment mode, when the client sent none.
    pub fn for_mode(mode: PaymentMode) -> Option<Self> {
        match mode {
            PaymentMode::Cash => Some(PaymentInstrument::Cash),
            PaymentMode::Upi => Some(PaymentInstrument::Upi { vpa: None }),
            PaymentMode::Wallet => Some(PaymentInstrument::Wallet {
                provider: "PAY_PAGE".to_string(),
            }),
            PaymentMode::Card => None,
        }
    }

    pub(crate) fn to_wire(&self) -> Value {
        match self {
            PaymentInstrument::Cash => json!({ "type": "CASH" }),
            PaymentInstrument::Upi { vpa: Some(vpa) } => json!({ "type": "UPI_COLLECT", "vpa": vpa }),
            PaymentInstrument::Upi { vpa: None } => json!({ "type": "UPI_INTENT" }),
            PaymentInstrument::Card(card) => json!({ "type": "CARD", "cardDetails": card.to_wire() }),
            PaymentInstrument::Wallet { provider } => {
                json!({ "type": "WALLET", "provider": provider })
            }
        }
    }
}

/// A payment submission.
#[derive(Debug, Clone)]
pub struct GatewayRequest {
    pub merchant_transaction_id: MerchantTransactionId,
    pub order_id: OrderId,
    pub customer_id: CustomerId,
    pub amount: Money,
    pub currency: String,
    pub redirect_url: String,
    pub callback_url: String,
    pub instrument: PaymentInstrument,
}

/// Gateway answer to a payment submission.
#[derive(Debug, Clone, PartialEq)]
pub struct GatewayInitiation {
    /// Raw status string as reported by the gateway.
    pub status: String,
    pub gateway_transaction_id: Option<String>,
    pub payment_id: Option<String>,
    pub redirect_url: Option<String>,
    pub raw: Value,
}

/// Gateway view of a transaction.
#[derive(Debug, Clone, PartialEq)]
pub struct GatewayStatus {
    /// Raw status string as reported by the gateway.
    pub status: String,
    pub gateway_transaction_id: Option<String>,
    pub payment_id: Option<String>,
    pub amount: Option<Money>,
    pub raw: Value,
}

/// Trait for payment gateway clients.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Submits a payment. Never retried by callers.
    async fn initiate(&self, request: GatewayRequest) -> Result<GatewayInitiation, GatewayError>;

    /// Queries the current status of a transaction.
    async fn status(
        &self,
        merchant_transaction_id: &MerchantTransactionId,
    ) -> Result<GatewayStatus, GatewayError>;

    /// Returns a gateway-issued merchant transaction id, if the integration
    /// issues them.
    async fn issue_transaction_id(&self) -> Option<MerchantTransactionId> {
        None
    }
}

#[async_trait]
impl<T: PaymentGateway + ?Sized> PaymentGateway for Arc<T> {
    async fn initiate(&self, request: GatewayRequest) -> Result<GatewayInitiation, GatewayError> {
        (**self).initiate(request).await
    }

    async fn status(
        &self,
        merchant_transaction_id: &MerchantTransactionId,
    ) -> Result<GatewayStatus, GatewayError> {
        (**self).status(merchant_transaction_id).await
    }

    async fn issue_transaction_id(&self) -> Option<MerchantTransactionId> {
        (**self).issue_transaction_id().await
    }
}
