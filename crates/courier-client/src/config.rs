//! Client configuration.

use std::time::Duration;

/// Configuration for a [`crate::CourierClient`].
///
/// The only required field is `url`; all others have defaults matching the
/// documented options.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Server URL to dial.
    pub url: String,
    /// Connect as soon as the client is constructed.
    pub auto_connect: bool,
    /// Recover dropped connections automatically.
    pub reconnection: bool,
    /// Maximum number of reconnection attempts.
    pub reconnection_attempts: u32,
    /// Base delay between reconnection attempts; attempt `n` waits
    /// `n * reconnection_delay`.
    pub reconnection_delay: Duration,
    /// Connect timeout.
    pub timeout: Duration,
    /// Transport names in preference order.
    pub transports: Vec<String>,
}

impl ClientConfig {
    /// Create a configuration for the given server URL with defaults.
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            auto_connect: true,
            reconnection: true,
            reconnection_attempts: 5,
            reconnection_delay: Duration::from_millis(1000),
            timeout: Duration::from_millis(20_000),
            transports: vec!["websocket".to_string(), "polling".to_string()],
        }
    }

    /// Disable connecting at construction time.
    #[must_use]
    pub fn manual_connect(mut self) -> Self {
        self.auto_connect = false;
        self
    }

    /// Disable automatic reconnection.
    #[must_use]
    pub fn without_reconnection(mut self) -> Self {
        self.reconnection = false;
        self
    }

    /// Set the reconnection attempt bound.
    #[must_use]
    pub fn with_reconnection_attempts(mut self, attempts: u32) -> Self {
        self.reconnection_attempts = attempts;
        self
    }

    /// Set the base reconnection delay.
    #[must_use]
    pub fn with_reconnection_delay(mut self, delay: Duration) -> Self {
        self.reconnection_delay = delay;
        self
    }

    /// Set the connect timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the transport preference list.
    #[must_use]
    pub fn with_transports(mut self, transports: Vec<String>) -> Self {
        self.transports = transports;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ClientConfig::new("ws://localhost:7000");
        assert!(config.auto_connect);
        assert!(config.reconnection);
        assert_eq!(config.reconnection_attempts, 5);
        assert_eq!(config.reconnection_delay, Duration::from_millis(1000));
        assert_eq!(config.timeout, Duration::from_millis(20_000));
        assert_eq!(config.transports, vec!["websocket", "polling"]);
    }
}
