//! Common error types for AMQ

use thiserror::Error;

/// Common result type for AMQ operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error types shared by the client crate and tools
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Inbound message could not be decoded
    #[error("Decode error: {0}")]
    Decode(String),

    /// Outbound command could not be encoded
    #[error("Encode error: {0}")]
    Encode(String),

    /// Invalid user input or request parameter
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}
