//! HTTP gateway client.
//!
//! Requests carry a base64-encoded JSON payload and an `X-VERIFY` checksum
//! header computed over the payload and the API path.

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use domain::{MerchantTransactionId, Money};
use hmac::{Hmac, Mac};
use reqwest::Client;
use serde::Deserialize;
use serde_json::{Value, json};
use sha2::{Digest, Sha256};

use super::{GatewayError, GatewayInitiation, GatewayRequest, GatewayStatus, PaymentGateway};
use crate::config::GatewayConfig;

const PAY_PATH: &str = "/pg/v1/pay";
const STATUS_PATH: &str = "/pg/v1/status";

/// How request checksums are computed.
#[derive(Clone, PartialEq, Eq)]
pub enum ChecksumScheme {
    /// `hex(sha256(payload + path + salt_key)) ### salt_index`
    SaltedSha256 { salt_key: String, salt_index: u32 },
    /// `hex(hmac_sha256(secret, payload + path))`
    HmacSha256 { secret: String },
}

impl ChecksumScheme {
    /// Computes the `X-VERIFY` header value.
    pub fn sign(&self, payload: &str, path: &str) -> Result<String, GatewayError> {
        match self {
            ChecksumScheme::SaltedSha256 {
                salt_key,
                salt_index,
            } => {
                let mut hasher = Sha256::new();
                hasher.update(payload.as_bytes());
                hasher.update(path.as_bytes());
                hasher.update(salt_key.as_bytes());
                Ok(format!("{}###{}", hex::encode(hasher.finalize()), salt_index))
            }
            ChecksumScheme::HmacSha256 { secret } => {
                let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes())
                    .map_err(|e| GatewayError::Signing(e.to_string()))?;
                mac.update(payload.as_bytes());
                mac.update(path.as_bytes());
                Ok(hex::encode(mac.finalize().into_bytes()))
            }
        }
    }
}

impl std::fmt::Debug for ChecksumScheme {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChecksumScheme::SaltedSha256 { salt_index, .. } => f
                .debug_struct("SaltedSha256")
                .field("salt_index", salt_index)
                .finish_non_exhaustive(),
            ChecksumScheme::HmacSha256 { .. } => {
                f.debug_struct("HmacSha256").finish_non_exhaustive()
            }
        }
    }
}

#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    code: String,
    #[serde(default)]
    message: String,
    #[serde(default)]
    data: Option<EnvelopeData>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EnvelopeData {
    #[serde(default)]
    transaction_id: Option<String>,
    #[serde(default)]
    state: Option<String>,
    #[serde(default)]
    amount: Option<i64>,
    #[serde(default)]
    instrument_response: Option<InstrumentResponse>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InstrumentResponse {
    #[serde(default)]
    redirect_info: Option<RedirectInfo>,
    #[serde(default)]
    intent_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RedirectInfo {
    url: String,
}

/// Maps envelope response codes onto the status vocabulary callers expect.
fn status_from_code(code: &str) -> Option<&'static str> {
    match code {
        "PAYMENT_SUCCESS" => Some("SUCCESS"),
        "PAYMENT_PENDING" | "PAYMENT_INITIATED" => Some("PENDING"),
        "PAYMENT_ERROR" | "PAYMENT_DECLINED" => Some("FAILED"),
        "PAYMENT_CANCELLED" => Some("CANCELLED"),
        _ => None,
    }
}

impl Envelope {
    fn parse(body: &str) -> Result<(Self, Value), GatewayError> {
        let raw: Value = serde_json::from_str(body)
            .map_err(|e| GatewayError::InvalidResponse(e.to_string()))?;
        let envelope = serde_json::from_value(raw.clone())
            .map_err(|e| GatewayError::InvalidResponse(e.to_string()))?;
        Ok((envelope, raw))
    }

    /// Status string for this response, or a rejection.
    fn status(&self) -> Result<String, GatewayError> {
        let state = self.data.as_ref().and_then(|d| d.state.clone());
        match (state, status_from_code(&self.code)) {
            (Some(state), _) => Ok(state),
            (None, Some(status)) => Ok(status.to_string()),
            (None, None) if self.success => Ok(self.code.clone()),
            (None, None) => Err(GatewayError::Rejected {
                code: self.code.clone(),
                message: self.message.clone(),
            }),
        }
    }
}

/// Gateway client speaking the signed base64-over-JSON protocol.
#[derive(Clone)]
pub struct HttpPaymentGateway {
    client: Client,
    config: GatewayConfig,
}

impl HttpPaymentGateway {
    /// Creates a client from configuration.
    pub fn new(config: GatewayConfig) -> Result<Self, GatewayError> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| GatewayError::Transport(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client, config })
    }

    /// Builds the base64 payload for a payment submission.
    fn encode_payload(&self, request: &GatewayRequest) -> Result<String, GatewayError> {
        let payload = json!({
            "merchantId": self.config.merchant_id,
            "merchantTransactionId": request.merchant_transaction_id.as_str(),
            "merchantUserId": request.customer_id.as_str(),
            "merchantOrderId": request.order_id.to_string(),
            "amount": request.amount.minor_units(),
            "currency": request.currency,
            "redirectUrl": request.redirect_url,
            "redirectMode": "REDIRECT",
            "callbackUrl": request.callback_url,
            "paymentInstrument": request.instrument.to_wire(),
        });
        let bytes =
            serde_json::to_vec(&payload).map_err(|e| GatewayError::Signing(e.to_string()))?;
        Ok(BASE64.encode(bytes))
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<(Envelope, Value), GatewayError> {
        let response = request
            .send()
            .await
            .map_err(|e| GatewayError::Transport(e.to_string()))?;
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| GatewayError::Transport(e.to_string()))?;

        if status.is_server_error() {
            return Err(GatewayError::Transport(format!("HTTP {status}")));
        }
        if !status.is_success() {
            // Client errors still carry an envelope worth reporting
            return match Envelope::parse(&body) {
                Ok((envelope, _)) => Err(GatewayError::Rejected {
                    code: envelope.code,
                    message: envelope.message,
                }),
                Err(_) => Err(GatewayError::Rejected {
                    code: status.as_u16().to_string(),
                    message: body.chars().take(200).collect(),
                }),
            };
        }
        Envelope::parse(&body)
    }
}

#[async_trait]
impl PaymentGateway for HttpPaymentGateway {
    #[tracing::instrument(
        skip(self, request),
        fields(merchant_transaction_id = %request.merchant_transaction_id, instrument = request.instrument.mode().as_str())
    )]
    async fn initiate(&self, request: GatewayRequest) -> Result<GatewayInitiation, GatewayError> {
        let payload = self.encode_payload(&request)?;
        let checksum = self.config.checksum.sign(&payload, PAY_PATH)?;

        let (envelope, raw) = self
            .send(
                self.client
                    .post(format!("{}{}", self.config.base_url, PAY_PATH))
                    .header("X-VERIFY", checksum)
                    .json(&json!({ "request": payload })),
            )
            .await?;

        let status = envelope.status()?;
        let data = envelope.data.unwrap_or_default();
        let redirect_url = data.instrument_response.and_then(|r| {
            r.redirect_info.map(|info| info.url).or(r.intent_url)
        });

        Ok(GatewayInitiation {
            status,
            payment_id: data.transaction_id.clone(),
            gateway_transaction_id: data.transaction_id,
            redirect_url,
            raw,
        })
    }

    async fn status(
        &self,
        merchant_transaction_id: &MerchantTransactionId,
    ) -> Result<GatewayStatus, GatewayError> {
        let path = format!(
            "{}/{}/{}",
            STATUS_PATH, self.config.merchant_id, merchant_transaction_id
        );
        let checksum = self.config.checksum.sign("", &path)?;

        let (envelope, raw) = self
            .send(
                self.client
                    .get(format!("{}{}", self.config.base_url, path))
                    .header("X-VERIFY", checksum)
                    .header("X-MERCHANT-ID", &self.config.merchant_id),
            )
            .await?;

        let status = envelope.status()?;
        let data = envelope.data.unwrap_or_default();

        Ok(GatewayStatus {
            status,
            payment_id: data.transaction_id.clone(),
            gateway_transaction_id: data.transaction_id,
            amount: data.amount.map(Money::from_minor),
            raw,
        })
    }
}

#[cfg(test)]
mod tests {
    use common::OrderId;
    use domain::CustomerId;

    use super::*;
    use crate::gateway::PaymentInstrument;

    fn gateway() -> HttpPaymentGateway {
        HttpPaymentGateway::new(GatewayConfig {
            merchant_id: "MERCHANT1".to_string(),
            checksum: ChecksumScheme::SaltedSha256 {
                salt_key: "salt".to_string(),
                salt_index: 1,
            },
            ..GatewayConfig::default()
        })
        .unwrap()
    }

    #[test]
    fn test_salted_checksum_format() {
        let scheme = ChecksumScheme::SaltedSha256 {
            salt_key: "salt".to_string(),
            salt_index: 2,
        };
        let checksum = scheme.sign("cGF5bG9hZA==", PAY_PATH).unwrap();

        let mut hasher = Sha256::new();
        hasher.update(b"cGF5bG9hZA==/pg/v1/paysalt");
        let expected = format!("{}###2", hex::encode(hasher.finalize()));
        assert_eq!(checksum, expected);
    }

    #[test]
    fn test_hmac_checksum_depends_on_secret() {
        let a = ChecksumScheme::HmacSha256 {
            secret: "one".to_string(),
        };
        let b = ChecksumScheme::HmacSha256 {
            secret: "two".to_string(),
        };
        let sig_a = a.sign("payload", PAY_PATH).unwrap();
        assert_eq!(sig_a.len(), 64);
        assert_ne!(sig_a, b.sign("payload", PAY_PATH).unwrap());
        assert_eq!(sig_a, a.sign("payload", PAY_PATH).unwrap());
    }

    #[test]
    fn test_checksum_debug_hides_secrets() {
        let scheme = ChecksumScheme::SaltedSha256 {
            salt_key: "super-secret".to_string(),
            salt_index: 1,
        };
        assert!(!format!("{scheme:?}").contains("super-secret"));
    }

    #[test]
    fn test_payload_is_base64_json() {
        let request = GatewayRequest {
            merchant_transaction_id: MerchantTransactionId::new("TXN1"),
            order_id: OrderId::new(),
            customer_id: CustomerId::new("uid-1"),
            amount: Money::from_minor(18000),
            currency: "INR".to_string(),
            redirect_url: "brewhouse://return".to_string(),
            callback_url: "https://example.test/cb".to_string(),
            instrument: PaymentInstrument::Upi { vpa: None },
        };
        let encoded = gateway().encode_payload(&request).unwrap();
        let decoded: Value = serde_json::from_slice(&BASE64.decode(encoded).unwrap()).unwrap();

        assert_eq!(decoded["merchantId"], "MERCHANT1");
        assert_eq!(decoded["merchantTransactionId"], "TXN1");
        assert_eq!(decoded["merchantUserId"], "uid-1");
        assert_eq!(decoded["amount"], 18000);
        assert_eq!(decoded["paymentInstrument"]["type"], "UPI_INTENT");
    }

    #[test]
    fn test_envelope_status_prefers_state() {
        let (envelope, _) = Envelope::parse(
            r#"{"success":true,"code":"PAYMENT_SUCCESS","data":{"state":"COMPLETED","transactionId":"T1"}}"#,
        )
        .unwrap();
        assert_eq!(envelope.status().unwrap(), "COMPLETED");
    }

    #[test]
    fn test_envelope_status_from_code() {
        let (envelope, _) =
            Envelope::parse(r#"{"success":false,"code":"PAYMENT_PENDING","message":"pending"}"#)
                .unwrap();
        assert_eq!(envelope.status().unwrap(), "PENDING");
    }

    #[test]
    fn test_envelope_rejection() {
        let (envelope, _) =
            Envelope::parse(r#"{"success":false,"code":"BAD_REQUEST","message":"invalid"}"#)
                .unwrap();
        assert_eq!(
            envelope.status(),
            Err(GatewayError::Rejected {
                code: "BAD_REQUEST".to_string(),
                message: "invalid".to_string()
            })
        );
    }

    #[test]
    fn test_redirect_url_extraction() {
        let (envelope, _) = Envelope::parse(
            r#"{"success":true,"code":"PAYMENT_INITIATED","data":{"transactionId":"T2","instrumentResponse":{"redirectInfo":{"url":"upi://pay?x=1"}}}}"#,
        )
        .unwrap();
        let url = envelope
            .data
            .and_then(|d| d.instrument_response)
            .and_then(|r| r.redirect_info)
            .map(|r| r.url);
        assert_eq!(url.as_deref(), Some("upi://pay?x=1"));
    }
}
