//! Application configuration management.
//!
//! This module handles loading configuration from environment variables.
//! It uses the `envy` crate to deserialize environment variables into a
//! type-safe struct, after `dotenvy` has loaded an optional `.env` file.

use serde::Deserialize;

/// Which payment gateway adapter to run against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GatewayMode {
    /// REST gateway at `GATEWAY_BASE_URL`
    Http,
    /// In-process gateway, for local runs
    Simulated,
}

/// Application configuration loaded from environment variables.
///
/// # Environment Variables
///
/// - `DATABASE_URL` (optional): PostgreSQL connection string; without it the
///   ledger is kept in memory
/// - `SERVER_PORT` (optional): HTTP server port, defaults to 3000
/// - `DB_MAX_CONNECTIONS` (optional): pool size, defaults to 5
/// - `GATEWAY_MODE` (optional): `http` or `simulated`, defaults to `simulated`
/// - `GATEWAY_BASE_URL` (required for `http`): gateway REST base URL
/// - `GATEWAY_KEY_ID` / `GATEWAY_KEY_SECRET`: merchant credentials; the secret
///   also verifies callback signatures
/// - `GATEWAY_CURRENCY` (optional): defaults to `INR`
/// - `HOLD_TTL_SECS` (optional): seat hold lifetime for online bookings,
///   defaults to 900
/// - `SWEEP_INTERVAL_SECS` (optional): expired-hold sweep period, defaults to 30
/// - `NOTIFICATION_WEBHOOK_URL` / `NOTIFICATION_WEBHOOK_SECRET` (optional):
///   where booking events are posted and the key they are signed with
/// - `BOOTSTRAP_API_KEY` (optional): operator key registered at startup, in
///   PostgreSQL and in memory alike; an existing key keeps its operator
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub database_url: Option<String>,

    #[serde(default = "default_port")]
    pub server_port: u16,

    #[serde(default = "default_max_connections")]
    pub db_max_connections: u32,

    #[serde(default = "default_gateway_mode")]
    pub gateway_mode: GatewayMode,

    pub gateway_base_url: Option<String>,

    #[serde(default = "default_key_id")]
    pub gateway_key_id: String,

    #[serde(default)]
    pub gateway_key_secret: String,

    #[serde(default = "default_currency")]
    pub gateway_currency: String,

    #[serde(default = "default_hold_ttl")]
    pub hold_ttl_secs: u64,

    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,

    pub notification_webhook_url: Option<String>,
    pub notification_webhook_secret: Option<String>,

    pub bootstrap_api_key: Option<String>,
}

fn default_port() -> u16 {
    3000
}

fn default_max_connections() -> u32 {
    5
}

fn default_gateway_mode() -> GatewayMode {
    GatewayMode::Simulated
}

fn default_key_id() -> String {
    "rzp_test_local".to_string()
}

fn default_currency() -> String {
    "INR".to_string()
}

/// Seat holds live 15 minutes by default.
fn default_hold_ttl() -> u64 {
    900
}

fn default_sweep_interval() -> u64 {
    30
}

/// Configuration that parses but cannot run.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read environment: {0}")]
    Env(#[from] envy::Error),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// This method first attempts to load a `.env` file (which is optional),
    /// then reads environment variables and validates the result.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Environment variable values cannot be parsed into expected types
    /// - The values fail [`Config::validate`]
    pub fn from_env() -> Result<Self, ConfigError> {
        // Try to load .env file if it exists (does nothing if not found)
        dotenvy::dotenv().ok();

        // Field names are converted automatically: hold_ttl_secs -> HOLD_TTL_SECS
        let config = envy::from_env::<Config>()?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the engine cannot run with.
    ///
    /// # Errors
    ///
    /// - Empty `GATEWAY_KEY_SECRET` (callbacks could not be verified)
    /// - Zero `HOLD_TTL_SECS` or `SWEEP_INTERVAL_SECS`
    /// - `GATEWAY_MODE=http` without a valid `GATEWAY_BASE_URL`
    /// - A notification webhook URL without a signing secret
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.gateway_key_secret.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "GATEWAY_KEY_SECRET must be set".to_string(),
            ));
        }
        if self.hold_ttl_secs == 0 {
            return Err(ConfigError::Invalid(
                "HOLD_TTL_SECS must be positive".to_string(),
            ));
        }
        if self.sweep_interval_secs == 0 {
            return Err(ConfigError::Invalid(
                "SWEEP_INTERVAL_SECS must be positive".to_string(),
            ));
        }
        if self.db_max_connections == 0 {
            return Err(ConfigError::Invalid(
                "DB_MAX_CONNECTIONS must be positive".to_string(),
            ));
        }

        if self.gateway_mode == GatewayMode::Http {
            let base = self.gateway_base_url.as_deref().ok_or_else(|| {
                ConfigError::Invalid("GATEWAY_BASE_URL is required in http mode".to_string())
            })?;
            url::Url::parse(base).map_err(|e| {
                ConfigError::Invalid(format!("GATEWAY_BASE_URL is not a valid URL: {e}"))
            })?;
        }

        if let Some(webhook) = self.notification_webhook_url.as_deref() {
            url::Url::parse(webhook).map_err(|e| {
                ConfigError::Invalid(format!("NOTIFICATION_WEBHOOK_URL is not a valid URL: {e}"))
            })?;
            if self
                .notification_webhook_secret
                .as_deref()
                .is_none_or(|s| s.is_empty())
            {
                return Err(ConfigError::Invalid(
                    "NOTIFICATION_WEBHOOK_SECRET is required with NOTIFICATION_WEBHOOK_URL"
                        .to_string(),
                ));
            }
        }

        Ok(())
    }

    pub fn hold_ttl(&self) -> chrono::Duration {
        chrono::Duration::seconds(i64::try_from(self.hold_ttl_secs).unwrap_or(i64::MAX))
    }

    pub fn sweep_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.sweep_interval_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn from_pairs(pairs: &[(&str, &str)]) -> Result<Config, envy::Error> {
        envy::from_iter(
            pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string())),
        )
    }

    #[test]
    fn defaults_apply() {
        let config = from_pairs(&[("GATEWAY_KEY_SECRET", "s3cret")]).unwrap();
        assert_eq!(config.server_port, 3000);
        assert_eq!(config.hold_ttl_secs, 900);
        assert_eq!(config.gateway_mode, GatewayMode::Simulated);
        assert!(config.database_url.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn empty_secret_is_rejected() {
        let config = from_pairs(&[]).unwrap();
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn http_mode_needs_base_url() {
        let config = from_pairs(&[
            ("GATEWAY_KEY_SECRET", "s3cret"),
            ("GATEWAY_MODE", "http"),
        ])
        .unwrap();
        assert!(config.validate().is_err());

        let config = from_pairs(&[
            ("GATEWAY_KEY_SECRET", "s3cret"),
            ("GATEWAY_MODE", "http"),
            ("GATEWAY_BASE_URL", "https://api.gateway.test/v1"),
        ])
        .unwrap();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn zero_hold_ttl_is_rejected() {
        let config = from_pairs(&[("GATEWAY_KEY_SECRET", "s3cret"), ("HOLD_TTL_SECS", "0")]).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn webhook_needs_secret() {
        let config = from_pairs(&[
            ("GATEWAY_KEY_SECRET", "s3cret"),
            ("NOTIFICATION_WEBHOOK_URL", "http://localhost:9000/events"),
        ])
        .unwrap();
        assert!(config.validate().is_err());
    }
}
