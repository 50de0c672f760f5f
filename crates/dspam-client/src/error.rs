//! Error types for DSPAM client operations.

use std::io;

/// Result type alias for DSPAM client operations.
pub type Result<T> = std::result::Result<T, Error>;

/// DSPAM client error types.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Malformed or unrecognized socket specification.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The transport could not be connected.
    #[error("Failed to connect to DSPAM server at {address}: {source}")]
    Connection {
        /// Address the connection attempt was made to.
        address: String,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// Server response did not match what the protocol step expects.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Caller violated a precondition of the operation.
    #[error("Usage error: {0}")]
    Usage(String),

    /// I/O error on an established connection.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl Error {
    /// Creates a protocol error for an unexpected reply at a protocol step.
    #[must_use]
    pub fn unexpected(step: &str, line: &str) -> Self {
        Self::Protocol(format!("Unexpected server response at {step}: {line}"))
    }

    /// Creates a connection error for the given address.
    #[must_use]
    pub fn connection(address: impl Into<String>, source: io::Error) -> Self {
        Self::Connection {
            address: address.into(),
            source,
        }
    }

    /// Returns true if this is a configuration error.
    #[must_use]
    pub const fn is_configuration(&self) -> bool {
        matches!(self, Self::Configuration(_))
    }

    /// Returns true if this is a connection error.
    #[must_use]
    pub const fn is_connection(&self) -> bool {
        matches!(self, Self::Connection { .. })
    }

    /// Returns true if this is a protocol error.
    #[must_use]
    pub const fn is_protocol(&self) -> bool {
        matches!(self, Self::Protocol(_))
    }

    /// Returns true if this is a usage error.
    #[must_use]
    pub const fn is_usage(&self) -> bool {
        matches!(self, Self::Usage(_))
    }
}
