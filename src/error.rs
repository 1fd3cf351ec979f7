//! Ledger RPC Error Types

use std::time::Duration;

use thiserror::Error;

use crate::protocol::RequestKind;

/// Result type alias for ledger RPC operations
pub type Result<T> = std::result::Result<T, Error>;

/// Ledger RPC error types
#[derive(Error, Debug)]
pub enum Error {
    // Input errors
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    // Connection errors
    #[error("Connection failed to {address}: {reason}")]
    ConnectionFailed { address: String, reason: String },

    #[error("Connection closed by peer")]
    ConnectionClosed,

    #[error("Timed out after {after:?} during {operation}")]
    Timeout { operation: &'static str, after: Duration },

    #[error("Connection to {address} is out of step after an earlier failure; reconnect")]
    Poisoned { address: String },

    // Protocol errors
    #[error("Node rejected {kind} request")]
    Rejected { kind: RequestKind },

    #[error("Protocol error: {0}")]
    Protocol(String),

    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid configuration file: {0}")]
    ConfigParse(#[from] toml::de::Error),

    // Discovery errors
    #[error("Discovery error: {0}")]
    Discovery(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Check if this error is retryable by reconnecting
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::ConnectionFailed { .. }
                | Error::ConnectionClosed
                | Error::Timeout { .. }
                | Error::Poisoned { .. }
        )
    }

    /// Check if the node answered with its failure byte.
    ///
    /// The connection stays usable after a rejection.
    pub fn is_rejected(&self) -> bool {
        matches!(self, Error::Rejected { .. })
    }

    /// Check if the node answered with bytes the protocol does not allow
    pub fn is_protocol(&self) -> bool {
        matches!(self, Error::Protocol(_))
    }
}
