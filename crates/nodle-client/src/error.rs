//! Error types for the chat client.

use thiserror::Error;

use nodle_protocol::ProtocolError;

/// Chat client errors.
#[derive(Error, Debug)]
pub enum ClientError {
    /// Failed to open the TCP connection.
    #[error("Failed to connect to {addr}: {error}")]
    Connect { addr: String, error: String },

    /// The server closed the connection.
    #[error("Server closed the connection")]
    Disconnected,

    /// Reading from or writing to the connection failed.
    #[error("I/O error: {0}")]
    Io(String),

    /// The server sent a line the client does not understand.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// The server sent a valid message at the wrong point in a dialogue.
    #[error("Unexpected server message (expected {expected}, got {got:?})")]
    Unexpected { expected: &'static str, got: String },
}

/// Result type alias for client operations.
pub type Result<T> = std::result::Result<T, ClientError>;
