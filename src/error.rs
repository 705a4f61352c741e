//! Error types for gearman-client.

use thiserror::Error;

/// Main error type for all client operations.
#[derive(Debug, Error)]
pub enum GearmanError {
    /// I/O error on the underlying connection.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A frame could not be encoded (an argument contains the NUL separator).
    #[error("Encoding error: {0}")]
    Encoding(String),

    /// A buffer could not be decoded into a frame.
    #[error("Decoding error: {0}")]
    Decoding(String),

    /// The byte stream ended in the middle of a frame.
    #[error("Framing error: {0}")]
    Framing(String),

    /// The client was closed or the connection to the server was lost.
    #[error("Connection closed")]
    ConnectionClosed,

    /// Unsupported network name passed to `connect_network`.
    #[error("Unsupported network: {0}")]
    InvalidNetwork(String),
}

/// Result type alias using GearmanError.
pub type Result<T> = std::result::Result<T, GearmanError>;
