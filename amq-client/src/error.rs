//! Error types for amq-client

use thiserror::Error;

/// Main error type for amq-client
#[derive(Error, Debug)]
pub enum Error {
    /// Codec, config and input errors from amq-common
    #[error(transparent)]
    Common(#[from] amq_common::Error),

    /// Command endpoint unreachable or request failed
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Stream socket errors
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// Server answered a command with a non-2xx status
    #[error("Command rejected ({status}): {body}")]
    CommandRejected { status: u16, body: String },

    /// Outbound channel of the session is gone
    #[error("Not connected")]
    NotConnected,

    /// Command needs a source but none is active
    #[error("No active source")]
    NoActiveSource,

    /// Node is unknown or in poor health
    #[error("Node unavailable: {0}")]
    NodeUnavailable(String),

    /// Command cannot be expressed on this transport
    #[error("Unsupported: {0}")]
    Unsupported(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Error::Common(amq_common::Error::InvalidInput(msg.into()))
    }
}

/// Convenience Result type using amq-client Error
pub type Result<T> = std::result::Result<T, Error>;
