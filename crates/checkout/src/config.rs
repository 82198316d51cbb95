//! Checkout and gateway configuration loaded from environment variables.

use std::time::Duration;

use domain::Money;

use crate::gateway::ChecksumScheme;

fn env_u64(key: &str) -> Option<u64> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}

fn env_u32(key: &str) -> Option<u32> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}

/// Status polling limits.
///
/// All three are enforced independently; whichever of the attempt cap or
/// the overall timeout is hit first ends the wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollerConfig {
    /// Delay between two status queries.
    pub interval: Duration,
    /// Maximum number of status queries.
    pub max_attempts: u32,
    /// Overall wall-clock budget for the whole wait.
    pub timeout: Duration,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(3),
            max_attempts: 20,
            timeout: Duration::from_secs(60),
        }
    }
}

impl PollerConfig {
    /// Replaces zero limits with the defaults.
    ///
    /// A zero interval cannot drive a timer and a zero cap or timeout would
    /// give up before the first status query.
    pub fn sanitized(self) -> Self {
        let defaults = Self::default();
        let mut config = self;
        if config.interval.is_zero() {
            tracing::warn!(default = ?defaults.interval, "poll interval must be positive, using default");
            config.interval = defaults.interval;
        }
        if config.max_attempts == 0 {
            tracing::warn!(default = defaults.max_attempts, "poll attempt cap must be positive, using default");
            config.max_attempts = defaults.max_attempts;
        }
        if config.timeout.is_zero() {
            tracing::warn!(default = ?defaults.timeout, "poll timeout must be positive, using default");
            config.timeout = defaults.timeout;
        }
        config
    }
}

/// Bounded exponential backoff for the post-charge ledger write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total number of write attempts, the first one included.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl RetryPolicy {
    /// Delay to wait after the given failed attempt (1-based).
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        self.base_delay
            .saturating_mul(1u32 << exponent)
            .min(self.max_delay)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(2),
        }
    }
}

/// Orchestrator configuration.
///
/// Reads from environment variables:
/// - `CHECKOUT_POLL_INTERVAL_MS` (default: `3000`)
/// - `CHECKOUT_POLL_MAX_ATTEMPTS` (default: `20`)
/// - `CHECKOUT_POLL_TIMEOUT_SECONDS` (default: `60`)
/// - `CHECKOUT_LEDGER_RETRY_ATTEMPTS` (default: `3`)
/// - `CHECKOUT_LEDGER_RETRY_BASE_MS` (default: `200`)
/// - `CHECKOUT_LEDGER_RETRY_MAX_MS` (default: `2000`)
/// - `CHECKOUT_CURRENCY` (default: `"INR"`)
/// - `CHECKOUT_REDIRECT_URL` / `CHECKOUT_CALLBACK_URL`
/// - `CHECKOUT_LOYALTY_SPEND_PER_POINT` in minor units (default: `1000`)
/// - `CHECKOUT_SUPPORT_CONTACT` (default: `"support@brewhouse.example"`)
#[derive(Debug, Clone)]
pub struct CheckoutConfig {
    pub poller: PollerConfig,
    pub ledger_retry: RetryPolicy,
    pub currency: String,
    pub redirect_url: String,
    pub callback_url: String,
    /// Amount the customer spends to earn one loyalty point.
    pub loyalty_spend_per_point: Money,
    pub support_contact: String,
}

impl CheckoutConfig {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            poller: PollerConfig {
                interval: env_u64("CHECKOUT_POLL_INTERVAL_MS")
                    .map(Duration::from_millis)
                    .unwrap_or(defaults.poller.interval),
                max_attempts: env_u32("CHECKOUT_POLL_MAX_ATTEMPTS")
                    .unwrap_or(defaults.poller.max_attempts),
                timeout: env_u64("CHECKOUT_POLL_TIMEOUT_SECONDS")
                    .map(Duration::from_secs)
                    .unwrap_or(defaults.poller.timeout),
            }
            .sanitized(),
            ledger_retry: RetryPolicy {
                max_attempts: env_u32("CHECKOUT_LEDGER_RETRY_ATTEMPTS")
                    .unwrap_or(defaults.ledger_retry.max_attempts),
                base_delay: env_u64("CHECKOUT_LEDGER_RETRY_BASE_MS")
                    .map(Duration::from_millis)
                    .unwrap_or(defaults.ledger_retry.base_delay),
                max_delay: env_u64("CHECKOUT_LEDGER_RETRY_MAX_MS")
                    .map(Duration::from_millis)
                    .unwrap_or(defaults.ledger_retry.max_delay),
            },
            currency: std::env::var("CHECKOUT_CURRENCY").unwrap_or(defaults.currency),
            redirect_url: std::env::var("CHECKOUT_REDIRECT_URL").unwrap_or(defaults.redirect_url),
            callback_url: std::env::var("CHECKOUT_CALLBACK_URL").unwrap_or(defaults.callback_url),
            loyalty_spend_per_point: std::env::var("CHECKOUT_LOYALTY_SPEND_PER_POINT")
                .ok()
                .and_then(|v| v.parse().ok())
                .map(Money::from_minor)
                .unwrap_or(defaults.loyalty_spend_per_point),
            support_contact: std::env::var("CHECKOUT_SUPPORT_CONTACT")
                .unwrap_or(defaults.support_contact),
        }
    }

    /// Loyalty points earned for a paid amount.
    pub fn points_for(&self, amount: Money) -> u32 {
        let per_point = self.loyalty_spend_per_point.minor_units();
        if per_point <= 0 || !amount.is_positive() {
            return 0;
        }
        u32::try_from(amount.minor_units() / per_point).unwrap_or(u32::MAX)
    }
}

impl Default for CheckoutConfig {
    fn default() -> Self {
        Self {
            poller: PollerConfig::default(),
            ledger_retry: RetryPolicy::default(),
            currency: "INR".to_string(),
            redirect_url: "brewhouse://payment/return".to_string(),
            callback_url: "http://localhost:3000/payments/callback".to_string(),
            loyalty_spend_per_point: Money::from_minor(1000),
            support_contact: "support@brewhouse.example".to_string(),
        }
    }
}

/// Payment gateway client configuration.
///
/// Reads from environment variables:
/// - `GATEWAY_BASE_URL` (default: the gateway sandbox)
/// - `GATEWAY_MERCHANT_ID`
/// - `GATEWAY_SALT_KEY` / `GATEWAY_SALT_INDEX` for salted SHA-256 checksums
/// - `GATEWAY_HMAC_SECRET`, which switches to HMAC-SHA256 checksums when set
/// - `GATEWAY_TIMEOUT_SECONDS` (default: `15`)
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub base_url: String,
    pub merchant_id: String,
    pub checksum: ChecksumScheme,
    pub request_timeout: Duration,
}

impl GatewayConfig {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let checksum = match std::env::var("GATEWAY_HMAC_SECRET") {
            Ok(secret) => ChecksumScheme::HmacSha256 { secret },
            Err(_) => ChecksumScheme::SaltedSha256 {
                salt_key: std::env::var("GATEWAY_SALT_KEY").unwrap_or_default(),
                salt_index: env_u32("GATEWAY_SALT_INDEX").unwrap_or(1),
            },
        };

        Self {
            base_url: std::env::var("GATEWAY_BASE_URL").unwrap_or(defaults.base_url),
            merchant_id: std::env::var("GATEWAY_MERCHANT_ID").unwrap_or(defaults.merchant_id),
            checksum,
            request_timeout: env_u64("GATEWAY_TIMEOUT_SECONDS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.request_timeout),
        }
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api-preprod.phonepe.com/apis/pg-sandbox".to_string(),
            merchant_id: "BREWHOUSEUAT".to_string(),
            checksum: ChecksumScheme::SaltedSha256 {
                salt_key: String::new(),
                salt_index: 1,
            },
            request_timeout: Duration::from_secs(15),
        }
    }
}
