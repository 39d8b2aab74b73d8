//! # courier-client
//!
//! Client SDK for the Courier messaging relay.
//!
//! [`CourierClient`] owns one transport connection and a connection-state
//! machine, performs the authentication handshake, and re-publishes
//! semantic events to application code through a typed event bus.
//! Transport drops are recovered with bounded linear-backoff reconnection.
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use courier_client::{ClientConfig, ClientEventKind, CourierClient};
//! use courier_transport::WebSocketConnector;
//!
//! let config = ClientConfig::new("ws://localhost:7000");
//! let client = CourierClient::new(Arc::new(WebSocketConnector::new()), config);
//!
//! client.on(ClientEventKind::MessageReceived, |event| {
//!     println!("{:?}", event);
//!     Ok(())
//! });
//!
//! client.connect().await?;
//! client.authenticate("my-token")?;
//! ```

pub mod client;
pub mod config;
pub mod error;
pub mod event;
pub mod session;

pub use client::{reconnect_delay, CourierClient};
pub use config::ClientConfig;
pub use error::ClientError;
pub use event::{ClientEvent, ClientEventKind, DisconnectReason, EventBus};
pub use session::{ConnectionState, ListenerId, SessionState};
