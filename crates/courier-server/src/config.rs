//! Server configuration.
//!
//! Configuration can be loaded from:
//! - Environment variables (COURIER_*)
//! - TOML configuration file

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host to bind to.
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to listen on.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Cross-origin policy for the HTTP upgrade.
    #[serde(default)]
    pub cors: CorsConfig,

    /// Keepalive configuration, passed to the transport.
    #[serde(default)]
    pub keepalive: KeepaliveConfig,

    /// Transport names to serve, in preference order.
    #[serde(default = "default_transports")]
    pub transports: Vec<String>,

    /// Which built-in protocol handlers are active.
    #[serde(default)]
    pub handlers: HandlersConfig,

    /// Resource limits.
    #[serde(default)]
    pub limits: LimitsConfig,

    /// Metrics configuration.
    #[serde(default)]
    pub metrics: MetricsConfig,

    /// Authentication configuration for the shipped token-table validator.
    #[serde(default)]
    pub auth: AuthConfig,
}

/// Cross-origin configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CorsConfig {
    /// Origins allowed during the HTTP upgrade. Empty allows any origin.
    #[serde(default)]
    pub allowed_origins: Vec<String>,
}

/// Keepalive configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeepaliveConfig {
    /// Interval between transport-level pings, in milliseconds.
    #[serde(default = "default_ping_interval")]
    pub ping_interval_ms: u64,

    /// Silence after which a connection is considered dead, in milliseconds.
    #[serde(default = "default_ping_timeout")]
    pub ping_timeout_ms: u64,
}

impl KeepaliveConfig {
    /// Ping interval as a duration.
    #[must_use]
    pub fn ping_interval(&self) -> Duration {
        Duration::from_millis(self.ping_interval_ms)
    }

    /// Ping timeout as a duration.
    #[must_use]
    pub fn ping_timeout(&self) -> Duration {
        Duration::from_millis(self.ping_timeout_ms)
    }
}

/// Which built-in protocol handlers are active.
///
/// Decided up front, before the server accepts connections; there is no
/// runtime mutation of the handler set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HandlersConfig {
    /// Authentication handshake handler.
    #[serde(default = "default_true")]
    pub auth: bool,

    /// Presence queries and broadcasts.
    #[serde(default = "default_true")]
    pub presence: bool,

    /// Point-to-point messaging and typing indicators.
    #[serde(default = "default_true")]
    pub messaging: bool,
}

/// Resource limits configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitsConfig {
    /// Maximum message size in bytes.
    #[serde(default = "default_max_message_size")]
    pub max_message_size: usize,
}

/// Metrics configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// Enable metrics export.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Metrics port.
    #[serde(default = "default_metrics_port")]
    pub port: u16,
}

/// Token table for the shipped [`crate::StaticTokenValidator`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Token to user id mapping.
    #[serde(default)]
    pub tokens: HashMap<String, String>,
}

// Default value functions
fn default_host() -> String {
    std::env::var("COURIER_HOST").unwrap_or_else(|_| "127.0.0.1".to_string())
}

fn default_port() -> u16 {
    std::env::var("COURIER_PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(7000)
}

fn default_true() -> bool {
    true
}

fn default_transports() -> Vec<String> {
    vec!["websocket".to_string(), "polling".to_string()]
}

fn default_ping_interval() -> u64 {
    25_000
}

fn default_ping_timeout() -> u64 {
    60_000
}

fn default_max_message_size() -> usize {
    64 * 1024 // 64 KB
}

fn default_metrics_port() -> u16 {
    9090
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            cors: CorsConfig::default(),
            keepalive: KeepaliveConfig::default(),
            transports: default_transports(),
            handlers: HandlersConfig::default(),
            limits: LimitsConfig::default(),
            metrics: MetricsConfig::default(),
            auth: AuthConfig::default(),
        }
    }
}

impl Default for KeepaliveConfig {
    fn default() -> Self {
        Self {
            ping_interval_ms: default_ping_interval(),
            ping_timeout_ms: default_ping_timeout(),
        }
    }
}

impl Default for HandlersConfig {
    fn default() -> Self {
        Self {
            auth: true,
            presence: true,
            messaging: true,
        }
    }
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_message_size: default_max_message_size(),
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            port: default_metrics_port(),
        }
    }
}

impl ServerConfig {
    /// Load configuration from file or defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if a config file exists but cannot be parsed.
    pub fn load() -> Result<Self> {
        let config_paths = [
            "courier.toml",
            "/etc/courier/courier.toml",
            "~/.config/courier/courier.toml",
        ];

        for path in &config_paths {
            let expanded = shellexpand::tilde(path);
            if Path::new(expanded.as_ref()).exists() {
                return Self::from_file(expanded.as_ref());
            }
        }

        // Fall back to defaults with environment overrides
        Ok(Self::default())
    }

    /// Load configuration from a specific file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: ServerConfig = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Get the socket address to bind to.
    #[must_use]
    pub fn bind_addr(&self) -> SocketAddr {
        format!("{}:{}", self.host, self.port)
            .parse()
            .expect("Invalid host:port")
    }
}
