//! Configuration module for paygate-server.
//!
//! Handles loading configuration from TOML files, CLI arguments,
//! and environment variables.

pub mod file;

use crate::config::file::FileConfig;
use paygate_core::config::{MAX_TRIES_LIMIT, WebhookQueueConfig};
use paygate_core::rates::StaticRates;
use ring::hmac;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur during configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("failed to parse config file: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("validation error: {0}")]
    ValidationError(String),

    #[error("DATABASE_URL environment variable not set")]
    MissingDatabaseUrl,
}

/// Admin token, compared in constant time.
#[derive(Clone)]
pub struct AdminToken {
    tag: hmac::Tag,
}

const ADMIN_TOKEN_CONTEXT: &[u8] = b"paygate-admin-token";

impl AdminToken {
    pub fn new(token: &str) -> Self {
        let key = hmac::Key::new(hmac::HMAC_SHA256, token.as_bytes());
        Self {
            tag: hmac::sign(&key, ADMIN_TOKEN_CONTEXT),
        }
    }

    pub fn verify(&self, provided: &str) -> bool {
        let key = hmac::Key::new(hmac::HMAC_SHA256, provided.as_bytes());
        hmac::verify(&key, ADMIN_TOKEN_CONTEXT, self.tag.as_ref()).is_ok()
    }
}

impl std::fmt::Debug for AdminToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("AdminToken(..)")
    }
}

/// Validated configuration.
#[derive(Debug)]
pub struct LoadedConfig {
    pub listen: SocketAddr,
    pub admin_token: AdminToken,
    pub webhooks: WebhookQueueConfig,
    pub rates: StaticRates,
}

/// Configuration loader that handles the complete loading process.
pub struct ConfigLoader {
    config_path: PathBuf,
    listen_override: Option<SocketAddr>,
}

impl ConfigLoader {
    pub fn new(config_path: impl AsRef<Path>, listen_override: Option<SocketAddr>) -> Self {
        Self {
            config_path: config_path.as_ref().to_path_buf(),
            listen_override,
        }
    }

    /// Read the TOML file, apply CLI overrides and validate.
    pub fn load(&self) -> Result<LoadedConfig, ConfigError> {
        let config_content = std::fs::read_to_string(&self.config_path)?;
        let file_config: FileConfig = toml::from_str(&config_content)?;
        self.build(file_config)
    }

    fn build(&self, file_config: FileConfig) -> Result<LoadedConfig, ConfigError> {
        let FileConfig {
            server,
            admin,
            webhooks,
            rates,
        } = file_config;

        if admin.token.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "admin.token must not be empty".to_string(),
            ));
        }
        if !(1..=MAX_TRIES_LIMIT).contains(&webhooks.max_tries) {
            return Err(ConfigError::ValidationError(format!(
                "webhooks.max_tries must be between 1 and {MAX_TRIES_LIMIT}, got {}",
                webhooks.max_tries
            )));
        }
        if webhooks.poll_interval_ms == 0 {
            return Err(ConfigError::ValidationError(
                "webhooks.poll_interval_ms must be positive".to_string(),
            ));
        }
        if webhooks.batch_size < 1 {
            return Err(ConfigError::ValidationError(format!(
                "webhooks.batch_size must be at least 1, got {}",
                webhooks.batch_size
            )));
        }

        Ok(LoadedConfig {
            listen: self.listen_override.unwrap_or(server.listen),
            admin_token: AdminToken::new(&admin.token),
            webhooks: WebhookQueueConfig {
                max_tries: webhooks.max_tries,
                poll_interval: Duration::from_millis(webhooks.poll_interval_ms),
                request_timeout: Duration::from_secs(webhooks.request_timeout_secs),
                batch_size: webhooks.batch_size,
            },
            rates: parse_rates(rates)?,
        })
    }
}

fn parse_rates(rates: HashMap<String, String>) -> Result<StaticRates, ConfigError> {
    let parsed = rates
        .into_iter()
        .map(|(currency, value)| match Decimal::from_str(value.trim()) {
            Ok(rate) if rate > Decimal::ZERO => Ok((currency, rate)),
            _ => Err(ConfigError::ValidationError(format!(
                "rates.{currency} is not a positive decimal: {value:?}"
            ))),
        })
        .collect::<Result<HashMap<_, _>, _>>()?;
    Ok(StaticRates::new(parsed))
}

/// Get the database URL from the environment.
pub fn get_database_url() -> Result<String, ConfigError> {
    std::env::var("DATABASE_URL").map_err(|_| ConfigError::MissingDatabaseUrl)
}
