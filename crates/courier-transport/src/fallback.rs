//! Transport preference negotiation.
//!
//! Clients carry an ordered transport preference list in their
//! configuration. [`FallbackConnector`] resolves that list against the
//! connectors actually registered and dials them in order until one
//! succeeds.

use crate::traits::{ClientTransport, ConnectOptions, Connection, TransportError};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, warn};

/// Resolve an ordered preference list against the available transport names.
///
/// Returns the first preference that is available, or `None` when nothing
/// matches.
#[must_use]
pub fn negotiate_transport<'a>(preferences: &'a [String], available: &[&str]) -> Option<&'a str> {
    preferences
        .iter()
        .map(String::as_str)
        .find(|preferred| available.contains(preferred))
}

/// A connector that tries the configured transports in preference order.
pub struct FallbackConnector {
    transports: Vec<Arc<dyn ClientTransport>>,
}

impl FallbackConnector {
    /// Create a new fallback connector over the given transports.
    #[must_use]
    pub fn new(transports: Vec<Arc<dyn ClientTransport>>) -> Self {
        Self { transports }
    }

    /// Add a transport to the set.
    pub fn add_transport(&mut self, transport: Arc<dyn ClientTransport>) {
        self.transports.push(transport);
    }

    /// Names of the registered transports.
    #[must_use]
    pub fn transport_names(&self) -> Vec<&'static str> {
        self.transports.iter().map(|t| t.name()).collect()
    }
}

#[async_trait]
impl ClientTransport for FallbackConnector {
    async fn connect(&self, options: &ConnectOptions) -> Result<Box<dyn Connection>, TransportError> {
        for preferred in &options.transports {
            let Some(transport) = self.transports.iter().find(|t| t.name() == preferred) else {
                debug!(transport = %preferred, "Preferred transport not registered");
                continue;
            };
            match transport.connect(options).await {
                Ok(conn) => return Ok(conn),
                Err(e) => {
                    warn!(transport = %preferred, error = %e, "Dial failed, trying next transport");
                }
            }
        }

        Err(TransportError::NoTransport(options.transports.join(", ")))
    }

    fn name(&self) -> &'static str {
        "fallback"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::memory_transport;
    use crate::traits::Transport;

    #[test]
    fn test_negotiate_transport() {
        let prefs = vec!["websocket".to_string(), "polling".to_string()];

        assert_eq!(
            negotiate_transport(&prefs, &["polling", "websocket"]),
            Some("websocket")
        );
        assert_eq!(negotiate_transport(&prefs, &["polling"]), Some("polling"));
        assert_eq!(negotiate_transport(&prefs, &["memory"]), None);
    }

    #[tokio::test]
    async fn test_fallback_skips_unregistered_preferences() {
        let (listener, connector) = memory_transport();
        let fallback = FallbackConnector::new(vec![Arc::new(connector)]);

        let mut opts = ConnectOptions::new("memory://local");
        opts.transports = vec!["websocket".to_string(), "memory".to_string()];

        let dial = fallback.connect(&opts);
        let accept = listener.accept();
        let (dialed, accepted) = tokio::join!(dial, accept);
        assert_eq!(dialed.unwrap().id(), accepted.unwrap().id());
    }

    #[tokio::test]
    async fn test_fallback_with_no_match_fails() {
        let fallback = FallbackConnector::new(Vec::new());
        let opts = ConnectOptions::new("memory://local");

        assert!(matches!(
            fallback.connect(&opts).await,
            Err(TransportError::NoTransport(_))
        ));
    }
}
