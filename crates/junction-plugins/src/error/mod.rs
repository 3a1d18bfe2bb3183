//! Domain errors raised by plugin operations.
//!
//! All errors use `thiserror`-derived enums with structured context so
//! callers can inspect the failure programmatically. I/O errors are wrapped
//! in `Arc` to satisfy the `result_large_err` Clippy lint.

use std::sync::Arc;

use thiserror::Error;

/// Errors arising from plugin operations.
#[derive(Debug, Error)]
pub enum PluginError {
    /// The requested plugin was not found in the registry.
    #[error("plugin '{name}' not found in registry")]
    NotFound {
        /// Name that was looked up.
        name: String,
    },

    /// The plugin process could not be spawned.
    #[error("plugin '{name}' failed to start: {message}")]
    SpawnFailed {
        /// Plugin name.
        name: String,
        /// Human-readable failure description.
        message: String,
        /// Optional underlying I/O error.
        #[source]
        source: Option<Arc<std::io::Error>>,
    },

    /// The plugin process has died or been disabled; in-flight and future
    /// calls fail until the plugin is restarted.
    #[error("plugin '{name}' is unavailable")]
    Unavailable {
        /// Plugin name.
        name: String,
    },

    /// No reply arrived for a call within the caller's deadline.
    ///
    /// The plugin is not killed on timeout; a late reply is simply discarded
    /// because no waiter holds its sequence number any more.
    #[error("plugin '{name}' did not reply to seq {seq} within {timeout_secs}s")]
    Timeout {
        /// Plugin name.
        name: String,
        /// Sequence number of the abandoned call.
        seq: u64,
        /// Deadline that elapsed, in seconds.
        timeout_secs: u64,
    },

    /// The plugin replied with `success: false`.
    #[error("plugin '{name}' rejected the request: {message}")]
    Rejected {
        /// Plugin name.
        name: String,
        /// Message carried on the failure reply, when present.
        message: String,
    },

    /// The request could not be serialised to the wire format.
    #[error("failed to serialise plugin request: {0}")]
    SerializeRequest(#[source] serde_json::Error),

    /// A reply line could not be parsed as a wire response.
    #[error("failed to deserialise plugin response: {message}")]
    DeserializeResponse {
        /// Human-readable description of the parse failure.
        message: String,
        /// Optional underlying JSON error.
        #[source]
        source: Option<serde_json::Error>,
    },

    /// An I/O error occurred while communicating with the plugin process.
    #[error("I/O error communicating with plugin '{name}': {source}")]
    Io {
        /// Plugin name.
        name: String,
        /// Underlying I/O error.
        #[source]
        source: Arc<std::io::Error>,
    },

    /// A plugin manifest failed validation.
    #[error("manifest error: {message}")]
    Manifest {
        /// Description of the validation failure.
        message: String,
    },
}

impl PluginError {
    /// Creates an I/O error for the named plugin.
    #[must_use]
    pub fn io(name: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            name: name.into(),
            source: Arc::new(source),
        }
    }

    /// Creates a manifest validation error.
    #[must_use]
    pub fn manifest(message: impl Into<String>) -> Self {
        Self::Manifest {
            message: message.into(),
        }
    }
}
