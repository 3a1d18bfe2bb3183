//! Wire request decoding.

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use junction_documents::ChangeRecord;
use junction_host::RequestEnvelope;

use super::errors::ProtocolError;

/// One decoded client request line.
#[derive(Debug, Deserialize)]
pub(crate) struct WireCommand {
    /// Endpoint (operation) name.
    endpoint: String,
    /// Target file path.
    path: String,
    /// Cursor line, paired with `column`.
    #[serde(default)]
    line: Option<u32>,
    /// Cursor column, paired with `line`.
    #[serde(default)]
    column: Option<u32>,
    /// Full-buffer replacement payload.
    #[serde(default)]
    text: Option<String>,
    /// Incremental change payload.
    #[serde(default)]
    changes: Vec<ChangeRecord>,
    /// Reload the buffer from disk before handling.
    #[serde(default)]
    from_disk: bool,
    /// Per-request handler deadline in seconds.
    #[serde(default)]
    timeout_secs: Option<u64>,
    /// Endpoint-specific arguments forwarded verbatim.
    #[serde(default)]
    arguments: serde_json::Value,
}

impl WireCommand {
    /// Parses a request line.
    ///
    /// Trailing whitespace (including the newline delimiter) is trimmed
    /// before parsing.
    pub(crate) fn parse(line: &[u8]) -> Result<Self, ProtocolError> {
        let trimmed = trim_trailing_whitespace(line);
        if trimmed.is_empty() {
            return Err(ProtocolError::malformed("empty request line"));
        }
        serde_json::from_slice(trimmed).map_err(ProtocolError::from_json_error)
    }

    /// Validates schema constraints the type system cannot express.
    pub(crate) fn validate(&self) -> Result<(), ProtocolError> {
        if self.endpoint.trim().is_empty() {
            return Err(ProtocolError::invalid("endpoint field is empty"));
        }
        if self.path.trim().is_empty() {
            return Err(ProtocolError::invalid("path field is empty"));
        }
        if self.line.is_some() != self.column.is_some() {
            return Err(ProtocolError::invalid(
                "line and column must be supplied together",
            ));
        }
        Ok(())
    }

    /// The requested endpoint, trimmed.
    pub(crate) fn endpoint(&self) -> &str {
        self.endpoint.trim()
    }

    /// Converts the wire command into a dispatcher envelope.
    pub(crate) fn into_envelope(self) -> RequestEnvelope {
        let mut envelope = RequestEnvelope::new(self.endpoint.trim(), PathBuf::from(&self.path))
            .with_arguments(self.arguments);
        if let (Some(line), Some(column)) = (self.line, self.column) {
            envelope = envelope.at(line, column);
        }
        if let Some(text) = self.text {
            envelope = envelope.with_text(text);
        }
        if !self.changes.is_empty() {
            envelope = envelope.with_changes(self.changes);
        }
        if self.from_disk {
            envelope = envelope.reload_from_disk();
        }
        if let Some(secs) = self.timeout_secs {
            envelope = envelope.with_timeout(Duration::from_secs(secs));
        }
        envelope
    }
}

/// Trims trailing ASCII whitespace from a byte slice.
fn trim_trailing_whitespace(bytes: &[u8]) -> &[u8] {
    let end = bytes
        .iter()
        .rposition(|b| !b.is_ascii_whitespace())
        .map_or(0, |pos| pos + 1);
    bytes.get(..end).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_minimal_request() {
        let command = WireCommand::parse(br#"{"endpoint":"codecheck","path":"/ws/a.cs"}"#)
            .expect("parse minimal");
        command.validate().expect("valid");
        assert_eq!(command.endpoint(), "codecheck");
    }

    #[test]
    fn parses_full_edit_request() {
        let input = br#"{
            "endpoint": "change-buffer",
            "path": "/ws/a.cs",
            "changes": [
                {"start_line":0,"start_column":7,"end_line":0,"end_column":7,"new_text":" : B"}
            ],
            "timeout_secs": 2
        }"#;
        let command = WireCommand::parse(input).expect("parse edit");
        command.validate().expect("valid");

        let envelope = command.into_envelope();
        assert_eq!(envelope.endpoint, "change-buffer");
        assert_eq!(envelope.changes.len(), 1);
        assert_eq!(envelope.timeout, Some(Duration::from_secs(2)));
    }

    #[test]
    fn trims_the_newline_delimiter() {
        let command = WireCommand::parse(b"{\"endpoint\":\"format\",\"path\":\"/ws/a.cs\"}\n")
            .expect("parse with newline");
        assert_eq!(command.endpoint(), "format");
    }

    #[test]
    fn rejects_empty_and_malformed_lines() {
        assert!(matches!(
            WireCommand::parse(b""),
            Err(ProtocolError::Malformed { .. })
        ));
        assert!(matches!(
            WireCommand::parse(b"   \n"),
            Err(ProtocolError::Malformed { .. })
        ));
        assert!(matches!(
            WireCommand::parse(b"not json"),
            Err(ProtocolError::Malformed { .. })
        ));
    }

    #[test]
    fn rejects_empty_fields() {
        let command = WireCommand::parse(br#"{"endpoint":"","path":"/ws/a.cs"}"#).expect("parse");
        assert!(matches!(
            command.validate(),
            Err(ProtocolError::Invalid { .. })
        ));

        let command = WireCommand::parse(br#"{"endpoint":"codecheck","path":" "}"#).expect("parse");
        assert!(matches!(
            command.validate(),
            Err(ProtocolError::Invalid { .. })
        ));
    }

    #[test]
    fn rejects_half_a_position() {
        let command = WireCommand::parse(br#"{"endpoint":"codecheck","path":"/ws/a.cs","line":3}"#)
            .expect("parse");
        assert!(matches!(
            command.validate(),
            Err(ProtocolError::Invalid { .. })
        ));
    }

    #[test]
    fn position_lands_in_the_envelope() {
        let command = WireCommand::parse(
            br#"{"endpoint":"goto-definition","path":"/ws/a.cs","line":3,"column":7}"#,
        )
        .expect("parse");
        let envelope = command.into_envelope();
        let position = envelope.position.expect("position set");
        assert_eq!((position.line, position.column), (3, 7));
    }
}
