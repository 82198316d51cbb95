//! Application configuration loaded from environment variables.

use std::path::PathBuf;

/// Which payment gateway the server talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatewayMode {
    /// In-process gateway that settles every payment.
    Sandbox,
    /// The real gateway over HTTPS, configured by `GatewayConfig::from_env`.
    Http,
}

impl GatewayMode {
    fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "sandbox" => Some(GatewayMode::Sandbox),
            "http" => Some(GatewayMode::Http),
            _ => None,
        }
    }
}

/// Server configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `HOST` — bind address (default: `"0.0.0.0"`)
/// - `PORT` — listen port (default: `3000`)
/// - `RUST_LOG` — tracing filter directive (default: `"info"`)
/// - `GATEWAY_MODE` — `sandbox` or `http` (default: `sandbox`)
/// - `DATABASE_URL` — PostgreSQL ledger; in-memory when unset
/// - `RECOVERY_FILE` — recovery record log (default: `"data/recovery.jsonl"`)
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub gateway_mode: GatewayMode,
    pub database_url: Option<String>,
    pub recovery_file: PathBuf,
}

impl Config {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            host: std::env::var("HOST").unwrap_or(defaults.host),
            port: std::env::var("PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(defaults.port),
            log_level: std::env::var("RUST_LOG").unwrap_or(defaults.log_level),
            gateway_mode: std::env::var("GATEWAY_MODE")
                .ok()
                .and_then(|m| GatewayMode::parse(&m))
                .unwrap_or(defaults.gateway_mode),
            database_url: std::env::var("DATABASE_URL")
                .ok()
                .filter(|url| !url.trim().is_empty()),
            recovery_file: std::env::var("RECOVERY_FILE")
                .map(PathBuf::from)
                .unwrap_or(defaults.recovery_file),
        }
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            log_level: "info".to_string(),
            gateway_mode: GatewayMode::Sandbox,
            database_url: None,
            recovery_file: PathBuf::from("data/recovery.jsonl"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_values() {
        let config = Config::default();
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 3000);
        assert_eq!(config.log_level, "info");
        assert_eq!(config.gateway_mode, GatewayMode::Sandbox);
        assert!(config.database_url.is_none());
    }

    #[test]
    fn test_addr_formatting() {
        let config = Config {
            host: "127.0.0.1".to_string(),
            port: 8080,
            ..Config::default()
        };
        assert_eq!(config.addr(), "127.0.0.1:8080");
    }

    #[test]
    fn test_gateway_mode_parsing() {
        assert_eq!(GatewayMode::parse("HTTP"), Some(GatewayMode::Http));
        assert_eq!(GatewayMode::parse(" sandbox "), Some(GatewayMode::Sandbox));
        assert_eq!(GatewayMode::parse("live"), None);
    }
}
