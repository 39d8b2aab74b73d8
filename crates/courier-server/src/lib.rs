//! # courier-server
//!
//! Server SDK for the Courier messaging relay.
//!
//! The server accepts connections from a [`courier_transport::Transport`],
//! registers each one in the [`courier_core::Registry`], and fans inbound
//! frames out to pluggable [`handlers::ProtocolHandler`]s. Three built-in
//! handlers implement the wire protocol: authentication, presence, and
//! point-to-point messaging with typing indicators.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use courier_server::{CourierServer, ServerConfig, StaticTokenValidator};
//! use courier_transport::WebSocketTransport;
//!
//! let config = ServerConfig::load()?;
//! let validator = Arc::new(StaticTokenValidator::new(config.auth.tokens.clone()));
//! let transport = WebSocketTransport::bind(config.bind_addr()).await?;
//! Arc::new(CourierServer::new(config, validator))
//!     .run(Arc::new(transport))
//!     .await?;
//! ```

pub mod config;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod server;

pub use config::ServerConfig;
pub use error::ServerError;
pub use handlers::{
    AuthHandler, AuthValidator, MessagingHandler, PresenceHandler, ProtocolHandler,
    StaticTokenValidator,
};
pub use server::CourierServer;
