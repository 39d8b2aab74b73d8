//! Client errors.

use courier_transport::TransportError;
use thiserror::Error;

/// Errors reported synchronously by client operations.
///
/// Precondition failures (`NotConnected`, `NotAuthenticated`) are never
/// retried by the client; transport failures feed the reconnection loop
/// instead of being fatal.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The operation requires a live connection.
    #[error("Not connected")]
    NotConnected,

    /// The operation requires a completed authentication handshake.
    #[error("Not authenticated")]
    NotAuthenticated,

    /// The connect attempt did not complete within the configured timeout.
    #[error("Connect timed out")]
    Timeout,

    /// The underlying transport failed.
    #[error(transparent)]
    Transport(#[from] TransportError),
}
