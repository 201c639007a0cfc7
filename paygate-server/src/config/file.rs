//! TOML file configuration structures.
//!
//! These structs directly map to the `paygate-config.toml` file format.

use paygate_core::config::{
    DEFAULT_BATCH_SIZE, DEFAULT_MAX_TRIES, DEFAULT_POLL_INTERVAL, DEFAULT_REQUEST_TIMEOUT,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::net::{Ipv4Addr, SocketAddr};

/// Root configuration structure as read from the TOML file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileConfig {
    #[serde(default)]
    pub server: ServerConfig,
    pub admin: AdminConfig,
    #[serde(default)]
    pub webhooks: WebhooksConfig,
    /// USD rate per currency id (or currency code), as decimal strings.
    #[serde(default)]
    pub rates: HashMap<String, String>,
}

/// Server configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// The address and port to listen on (e.g., "0.0.0.0:8080").
    #[serde(default = "default_listen_addr")]
    pub listen: SocketAddr,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: default_listen_addr(),
        }
    }
}

fn default_listen_addr() -> SocketAddr {
    SocketAddr::from((Ipv4Addr::UNSPECIFIED, 8080))
}

/// Admin configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdminConfig {
    /// Expected value of the `X-Admin-Token` header.
    pub token: String,
}

/// Webhook delivery section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhooksConfig {
    #[serde(default = "default_max_tries")]
    pub max_tries: i32,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_batch_size")]
    pub batch_size: i64,
}

impl Default for WebhooksConfig {
    fn default() -> Self {
        Self {
            max_tries: default_max_tries(),
            poll_interval_ms: default_poll_interval_ms(),
            request_timeout_secs: default_request_timeout_secs(),
            batch_size: default_batch_size(),
        }
    }
}

fn default_max_tries() -> i32 {
    DEFAULT_MAX_TRIES
}

fn default_poll_interval_ms() -> u64 {
    DEFAULT_POLL_INTERVAL.as_millis() as u64
}

fn default_request_timeout_secs() -> u64 {
    DEFAULT_REQUEST_TIMEOUT.as_secs()
}

fn default_batch_size() -> i64 {
    DEFAULT_BATCH_SIZE
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_parsing() {
        let toml_str = r#"
[server]
listen = "127.0.0.1:3000"

[admin]
token = "admin-token"

[webhooks]
max_tries = 3
poll_interval_ms = 500

[rates]
usdt_tron = "1"
trx_tron = "0.25"
"#;
        let config: FileConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.server.listen.port(), 3000);
        assert_eq!(config.admin.token, "admin-token");
        assert_eq!(config.webhooks.max_tries, 3);
        assert_eq!(config.webhooks.poll_interval_ms, 500);
        assert_eq!(config.webhooks.request_timeout_secs, 30);
        assert_eq!(config.rates.get("trx_tron").map(String::as_str), Some("0.25"));
    }

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config: FileConfig = toml::from_str("[admin]\ntoken = \"t\"\n").unwrap();
        assert_eq!(config.server.listen.port(), 8080);
        assert_eq!(config.webhooks.max_tries, 5);
        assert_eq!(config.webhooks.poll_interval_ms, 2000);
        assert_eq!(config.webhooks.batch_size, 100);
        assert!(config.rates.is_empty());
    }

    #[test]
    fn test_admin_section_is_required() {
        assert!(toml::from_str::<FileConfig>("[server]\n").is_err());
    }
}
