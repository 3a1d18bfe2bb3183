//! Error types for wire request parsing and response writing.

use std::io;

use thiserror::Error;

/// Errors surfaced while decoding requests or encoding responses.
#[derive(Debug, Error)]
pub(crate) enum ProtocolError {
    /// Request line could not be parsed as a request object.
    #[error("malformed request: {message}")]
    Malformed {
        /// Human-readable parse failure.
        message: String,
        /// Underlying JSON error, when one exists.
        #[source]
        source: Option<serde_json::Error>,
    },

    /// Request parsed but violates the schema (empty fields, half a
    /// position).
    #[error("invalid request: {message}")]
    Invalid {
        /// Description of the violation.
        message: String,
    },

    /// Request exceeds the maximum allowed size.
    #[error("request too large: {size} bytes exceeds {max_size} byte limit")]
    TooLarge {
        /// Observed request size so far.
        size: usize,
        /// Enforced limit.
        max_size: usize,
    },

    /// I/O failure on the connection.
    #[error("connection error: {0}")]
    Io(#[from] io::Error),

    /// A response frame could not be serialised.
    #[error("failed to serialise response frame: {0}")]
    EncodeFrame(#[source] serde_json::Error),
}

impl ProtocolError {
    /// Creates a malformed-request error from a JSON parse failure.
    pub(crate) fn from_json_error(source: serde_json::Error) -> Self {
        Self::Malformed {
            message: source.to_string(),
            source: Some(source),
        }
    }

    /// Creates a malformed-request error with a custom message.
    pub(crate) fn malformed(message: impl Into<String>) -> Self {
        Self::Malformed {
            message: message.into(),
            source: None,
        }
    }

    /// Creates an invalid-request error.
    pub(crate) fn invalid(message: impl Into<String>) -> Self {
        Self::Invalid {
            message: message.into(),
        }
    }
}
