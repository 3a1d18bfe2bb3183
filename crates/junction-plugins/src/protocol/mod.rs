//! Wire types for the daemon-plugin protocol.
//!
//! The protocol is newline-delimited JSON over the plugin's standard I/O.
//! The daemon writes one [`WireRequest`] per line; the plugin answers each
//! request, in whatever order it likes, with one [`WireResponse`] line whose
//! `request_seq` echoes the request's `seq`. Sequence numbers are assigned
//! by the daemon, increase monotonically, and are unique for the lifetime of
//! the connection.

use serde::{Deserialize, Serialize};

use crate::error::PluginError;

/// Request written to a plugin's stdin as a single JSON line.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct WireRequest {
    seq: u64,
    command: String,
    arguments: serde_json::Value,
}

impl WireRequest {
    /// Creates a request for `command` with the given arguments.
    #[must_use]
    pub fn new(seq: u64, command: impl Into<String>, arguments: serde_json::Value) -> Self {
        Self {
            seq,
            command: command.into(),
            arguments,
        }
    }

    /// Sequence number assigned by the caller.
    #[must_use]
    pub const fn seq(&self) -> u64 {
        self.seq
    }

    /// Command (endpoint) name.
    #[must_use]
    pub const fn command(&self) -> &str {
        self.command.as_str()
    }

    /// Request arguments.
    #[must_use]
    pub const fn arguments(&self) -> &serde_json::Value {
        &self.arguments
    }

    /// Serialises the request to one newline-terminated wire line.
    ///
    /// # Errors
    ///
    /// Returns [`PluginError::SerializeRequest`] when JSON encoding fails.
    pub fn to_line(&self) -> Result<String, PluginError> {
        let mut line = serde_json::to_string(self).map_err(PluginError::SerializeRequest)?;
        line.push('\n');
        Ok(line)
    }
}

/// Response read from a plugin's stdout, one JSON line per request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct WireResponse {
    request_seq: u64,
    success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    message: Option<String>,
    #[serde(default)]
    body_json: String,
}

impl WireResponse {
    /// Creates a successful response carrying a JSON-encoded body.
    #[must_use]
    pub fn success(request_seq: u64, body_json: impl Into<String>) -> Self {
        Self {
            request_seq,
            success: true,
            message: None,
            body_json: body_json.into(),
        }
    }

    /// Creates a failure response with a diagnostic message.
    #[must_use]
    pub fn failure(request_seq: u64, message: impl Into<String>) -> Self {
        Self {
            request_seq,
            success: false,
            message: Some(message.into()),
            body_json: String::new(),
        }
    }

    /// Sequence number of the request this response answers.
    #[must_use]
    pub const fn request_seq(&self) -> u64 {
        self.request_seq
    }

    /// Whether the plugin handled the request.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.success
    }

    /// Diagnostic message, when the plugin supplied one.
    #[must_use]
    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    /// JSON-encoded response body.
    #[must_use]
    pub const fn body_json(&self) -> &str {
        self.body_json.as_str()
    }

    /// Parses one wire line into a response.
    ///
    /// # Errors
    ///
    /// Returns [`PluginError::DeserializeResponse`] when the line is not a
    /// valid response object.
    pub fn from_line(line: &str) -> Result<Self, PluginError> {
        serde_json::from_str(line.trim()).map_err(|source| PluginError::DeserializeResponse {
            message: format!("invalid response line: {source}"),
            source: Some(source),
        })
    }
}

#[cfg(test)]
mod tests;
