//! Typed request envelope handed to the dispatcher.

use std::path::PathBuf;
use std::time::Duration;

use junction_documents::{BufferUpdate, ChangeRecord};

/// Line/column position in the process-wide indexing convention.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Position {
    /// Line index.
    pub line: u32,
    /// Column index.
    pub column: u32,
}

/// One decoded request: an endpoint, a target path, and optional payloads.
///
/// When `text`, `changes`, or `from_disk` is set the envelope is
/// edit-shaped: the dispatcher commits the edit through the buffer update
/// pipeline before any handler reads document state for the path.
#[derive(Debug, Clone)]
pub struct RequestEnvelope {
    /// Endpoint (operation) name.
    pub endpoint: String,
    /// Target file path.
    pub path: PathBuf,
    /// Cursor position, for endpoints that take one.
    pub position: Option<Position>,
    /// Full-buffer replacement payload.
    pub text: Option<String>,
    /// Incremental change payload, applied in order.
    pub changes: Vec<ChangeRecord>,
    /// Reload the buffer from disk before handling.
    pub from_disk: bool,
    /// Per-request handler deadline; the dispatcher default applies when
    /// absent.
    pub timeout: Option<Duration>,
    /// Endpoint-specific arguments forwarded to handlers verbatim.
    pub arguments: serde_json::Value,
}

impl RequestEnvelope {
    /// Creates an envelope for `endpoint` targeting `path`.
    #[must_use]
    pub fn new(endpoint: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            endpoint: endpoint.into(),
            path: path.into(),
            position: None,
            text: None,
            changes: Vec::new(),
            from_disk: false,
            timeout: None,
            arguments: serde_json::Value::Null,
        }
    }

    /// Sets the cursor position.
    #[must_use]
    pub const fn at(mut self, line: u32, column: u32) -> Self {
        self.position = Some(Position { line, column });
        self
    }

    /// Attaches a full-buffer replacement payload.
    #[must_use]
    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    /// Attaches an incremental change payload.
    #[must_use]
    pub fn with_changes(mut self, changes: Vec<ChangeRecord>) -> Self {
        self.changes = changes;
        self
    }

    /// Requests a from-disk reload before handling.
    #[must_use]
    pub const fn reload_from_disk(mut self) -> Self {
        self.from_disk = true;
        self
    }

    /// Overrides the handler deadline for this request.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Attaches endpoint-specific arguments.
    #[must_use]
    pub fn with_arguments(mut self, arguments: serde_json::Value) -> Self {
        self.arguments = arguments;
        self
    }

    /// The buffer update this envelope implies, if it is edit-shaped.
    ///
    /// An explicit text or change payload wins over the from-disk flag, so
    /// a request carrying both semantics commits the client's payload.
    #[must_use]
    pub fn buffer_update(&self) -> Option<BufferUpdate> {
        if let Some(text) = &self.text {
            return Some(BufferUpdate::Full { text: text.clone() });
        }
        if !self.changes.is_empty() {
            return Some(BufferUpdate::Incremental {
                changes: self.changes.clone(),
            });
        }
        if self.from_disk {
            return Some(BufferUpdate::FromDisk);
        }
        None
    }
}
