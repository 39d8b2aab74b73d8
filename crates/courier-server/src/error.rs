//! Server errors.

use courier_transport::TransportError;
use thiserror::Error;

/// Errors surfaced by the server orchestrator.
#[derive(Debug, Error)]
pub enum ServerError {
    /// The underlying transport failed.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A protocol handler failed to initialize.
    #[error("Handler '{handler}' failed to initialize: {message}")]
    HandlerInit {
        /// Name of the failing handler.
        handler: &'static str,
        /// Failure description.
        message: String,
    },
}
