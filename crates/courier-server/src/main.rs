//! # Courier relay server
//!
//! ## Usage
//!
//! ```bash
//! # Run with default settings
//! courier
//!
//! # Run with a config file in the working directory
//! echo 'port = 9000' > courier.toml && courier
//!
//! # Run with environment variables
//! COURIER_PORT=9000 COURIER_HOST=0.0.0.0 courier
//! ```

use anyhow::{bail, Result};
use courier_protocol::PROTOCOL_VERSION;
use courier_server::{metrics, CourierServer, ServerConfig, StaticTokenValidator};
use courier_transport::websocket::{WebSocketConfig, WebSocketTransport};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "courier=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = ServerConfig::load()?;

    tracing::info!(
        "Starting Courier relay on {}:{} (protocol {})",
        config.host,
        config.port,
        PROTOCOL_VERSION
    );

    if !config.transports.iter().any(|t| t == "websocket") {
        bail!("no supported transport configured: this build serves websocket only");
    }

    // Initialize metrics
    metrics::init_metrics();

    // The binary ships the token-table validator; embedding applications
    // inject their own.
    let validator = Arc::new(StaticTokenValidator::new(config.auth.tokens.clone()));

    let transport = WebSocketTransport::new(WebSocketConfig {
        bind_addr: config.bind_addr(),
        max_message_size: config.limits.max_message_size,
        allowed_origins: config.cors.allowed_origins.clone(),
        idle_timeout: Some(config.keepalive.ping_timeout()),
    })
    .await?;

    Arc::new(CourierServer::new(config, validator))
        .run(Arc::new(transport))
        .await?;

    Ok(())
}
