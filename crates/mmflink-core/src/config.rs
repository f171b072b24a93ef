//! Configuration constants and the runtime bridge configuration.
//!
//! Fixed values live in the constant modules below. `BridgeConfig` collects
//! the tunable ones, with serde defaults and environment overrides.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// REST endpoints of the management service.
pub mod endpoints {
    pub const API_BASE: &str = "https://www.myminifactory.com/api/v2";
    pub const REGISTER_PRINTER: &str = "/printer";
    pub const PRINT_FILE: &str = "/print-file";
    pub const SUPPORTED_PRINTERS: &str = "/printers?automatic_slicing=1";
    /// Header carrying the client key on every REST call.
    pub const API_KEY_HEADER: &str = "X-Api-Key";
}

/// Broker connection constants.
pub mod broker {
    pub const HOST: &str = "mqtt.myminifactory.com";
    pub const TLS_PORT: u16 = 8883;
    pub const PLAIN_PORT: u16 = 1883;
    pub const KEEP_ALIVE_SECS: u64 = 60;
}

/// Topic layout.
pub mod topics {
    /// Shared topic every device publishes its status on.
    pub const STATUS_TOPIC: &str = "/printers";

    /// Per-device command topic.
    pub fn command_topic(token: &str) -> String {
        format!("{}/{}", STATUS_TOPIC, token)
    }
}

/// Timing defaults.
pub mod timing {
    pub const STATUS_INTERVAL_SECS: u64 = 5;
    pub const DISCONNECT_GRACE_MS: u64 = 1000;
    pub const HTTP_TIMEOUT_SECS: u64 = 30;
}

/// Defaults for persisted settings.
pub mod defaults {
    pub const MANUFACTURER: &str = "Anet";
    pub const MODEL: &str = "anet-a8";
    pub const CLIENT_NAME: &str = "octoprint_myminifactory";
    pub const AUTO_START_PRINT: bool = true;
    pub const UPLOADS_DIR: &str = "uploads";
    /// Current layout version of the persisted settings.
    pub const SETTINGS_VERSION: u32 = 1;
}

/// Firmware version announced on registration.
pub const FIRMWARE_VERSION: &str = "1.0.0";

/// Environment variable names.
pub mod env_vars {
    pub const BROKER_HOST: &str = "MMFLINK_BROKER_HOST";
    /// Set to `false` to connect on the plain port.
    pub const BROKER_TLS: &str = "MMFLINK_BROKER_TLS";
    pub const API_BASE: &str = "MMFLINK_API_BASE";
    pub const HTTP_TIMEOUT_SECS: &str = "MMFLINK_HTTP_TIMEOUT_SECS";
    pub const UPLOADS_DIR: &str = "MMFLINK_UPLOADS_DIR";
    pub const STATUS_INTERVAL_SECS: &str = "MMFLINK_STATUS_INTERVAL_SECS";
    pub const CLIENT_KEY: &str = "MMFLINK_CLIENT_KEY";
    pub const LOG_JSON: &str = "MMFLINK_LOG_JSON";
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|s| s.trim().parse().ok())
}

fn env_string(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|s| !s.trim().is_empty())
}

/// Parse a boolean the way environment flags are usually written.
pub fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Broker connection settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrokerConfig {
    #[serde(default = "default_broker_host")]
    pub host: String,
    #[serde(default = "default_tls_port")]
    pub tls_port: u16,
    #[serde(default = "default_plain_port")]
    pub plain_port: u16,
    /// Encryption is on unless explicitly disabled.
    #[serde(default = "default_true")]
    pub use_tls: bool,
    #[serde(default = "default_keep_alive")]
    pub keep_alive_secs: u64,
}

fn default_broker_host() -> String {
    broker::HOST.to_string()
}

fn default_tls_port() -> u16 {
    broker::TLS_PORT
}

fn default_plain_port() -> u16 {
    broker::PLAIN_PORT
}

fn default_true() -> bool {
    true
}

fn default_keep_alive() -> u64 {
    broker::KEEP_ALIVE_SECS
}

impl BrokerConfig {
    /// Port for the selected transport security.
    pub fn port(&self) -> u16 {
        if self.use_tls {
            self.tls_port
        } else {
            self.plain_port
        }
    }

    pub fn keep_alive(&self) -> Duration {
        Duration::from_secs(self.keep_alive_secs)
    }
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            host: default_broker_host(),
            tls_port: default_tls_port(),
            plain_port: default_plain_port(),
            use_tls: true,
            keep_alive_secs: default_keep_alive(),
        }
    }
}

/// REST client settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_api_base")]
    pub base_url: String,
    #[serde(default = "default_http_timeout")]
    pub timeout_secs: u64,
}

fn default_api_base() -> String {
    endpoints::API_BASE.to_string()
}

fn default_http_timeout() -> u64 {
    timing::HTTP_TIMEOUT_SECS
}

impl ApiConfig {
    /// Join an endpoint path onto the base URL.
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_api_base(),
            timeout_secs: default_http_timeout(),
        }
    }
}

/// Runtime configuration of a bridge session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BridgeConfig {
    #[serde(default)]
    pub broker: BrokerConfig,
    #[serde(default)]
    pub api: ApiConfig,
    /// Status publish period in milliseconds.
    #[serde(default = "default_status_interval_ms")]
    pub status_interval_ms: u64,
    /// Wait before tearing down the network loop on a forced disconnect.
    #[serde(default = "default_grace_ms")]
    pub disconnect_grace_ms: u64,
    /// Where downloaded artifacts are written.
    #[serde(default = "default_uploads_dir")]
    pub uploads_dir: PathBuf,
}

fn default_status_interval_ms() -> u64 {
    timing::STATUS_INTERVAL_SECS * 1000
}

fn default_grace_ms() -> u64 {
    timing::DISCONNECT_GRACE_MS
}

fn default_uploads_dir() -> PathBuf {
    PathBuf::from(defaults::UPLOADS_DIR)
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            broker: BrokerConfig::default(),
            api: ApiConfig::default(),
            status_interval_ms: default_status_interval_ms(),
            disconnect_grace_ms: default_grace_ms(),
            uploads_dir: default_uploads_dir(),
        }
    }
}

impl BridgeConfig {
    /// Defaults with `MMFLINK_*` environment overrides applied.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env();
        config
    }

    /// Apply `MMFLINK_*` environment overrides in place.
    pub fn apply_env(&mut self) {
        if let Some(host) = env_string(env_vars::BROKER_HOST) {
            self.broker.host = host;
        }
        if let Some(tls) = std::env::var(env_vars::BROKER_TLS)
            .ok()
            .and_then(|v| parse_flag(&v))
        {
            self.broker.use_tls = tls;
        }
        if let Some(base) = env_string(env_vars::API_BASE) {
            self.api.base_url = base;
        }
        if let Some(timeout) = env_parse(env_vars::HTTP_TIMEOUT_SECS) {
            self.api.timeout_secs = timeout;
        }
        if let Some(dir) = env_string(env_vars::UPLOADS_DIR) {
            self.uploads_dir = PathBuf::from(dir);
        }
        if let Some(secs) = env_parse::<u64>(env_vars::STATUS_INTERVAL_SECS) {
            if secs > 0 {
                self.status_interval_ms = secs * 1000;
            }
        }
    }

    pub fn status_interval(&self) -> Duration {
        Duration::from_millis(self.status_interval_ms.max(1))
    }

    pub fn disconnect_grace(&self) -> Duration {
        Duration::from_millis(self.disconnect_grace_ms)
    }

    /// Builder-style setter for tests and embedders.
    pub fn with_status_interval(mut self, interval: Duration) -> Self {
        self.status_interval_ms = interval.as_millis() as u64;
        self
    }

    pub fn with_disconnect_grace(mut self, grace: Duration) -> Self {
        self.disconnect_grace_ms = grace.as_millis() as u64;
        self
    }

    pub fn with_uploads_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.uploads_dir = dir.into();
        self
    }
}

/// Client key override from the environment, if set.
pub fn client_key_from_env() -> Option<String> {
    env_string(env_vars::CLIENT_KEY)
}
