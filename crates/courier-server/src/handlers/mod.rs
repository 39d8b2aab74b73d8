//! Pluggable protocol handlers.
//!
//! Each handler owns one slice of the wire protocol. The contract is a
//! capability set, not a hierarchy: `initialize` runs once before the
//! server accepts traffic, `handle_connection` runs once per new
//! connection to attach that handler's listeners to it. Custom extensions
//! implement the same trait and are registered alongside the built-ins.

pub mod auth;
pub mod messaging;
pub mod presence;

pub use auth::{AuthHandler, AuthValidator, StaticTokenValidator, ValidatorError};
pub use messaging::MessagingHandler;
pub use presence::PresenceHandler;

use crate::error::ServerError;
use async_trait::async_trait;
use courier_core::Session;
use std::sync::Arc;

/// One pluggable unit of the wire protocol.
#[async_trait]
pub trait ProtocolHandler: Send + Sync {
    /// Handler name, for logs.
    fn name(&self) -> &'static str;

    /// Handler-global setup, called once before the server accepts traffic.
    async fn initialize(&self) -> Result<(), ServerError> {
        Ok(())
    }

    /// Attach this handler's frame listeners to a new connection.
    fn handle_connection(&self, session: &Arc<Session>);
}
