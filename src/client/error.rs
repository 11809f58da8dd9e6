//! Error types for the terminal client.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    /// The identifier is already bound to a live connection on the server.
    #[error("identifier '{0}' is already connected")]
    DuplicateIdentifier(String),

    /// The server refused the upgrade (bad identifier, reserved name).
    #[error("server rejected the connection: {0}")]
    Rejected(String),

    /// Transport-level failure.
    #[error("connection error: {0}")]
    Connection(String),
}
