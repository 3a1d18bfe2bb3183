//! Error types for document storage and buffer updates.
//!
//! Edit-path failures are the one class of error that aborts a whole
//! dispatch: a change set that cannot be applied means downstream handlers
//! would read text the client never produced, so the store rejects the batch
//! without partial application and the pipeline propagates the failure
//! unchanged.

use std::path::PathBuf;

use thiserror::Error;

/// Reasons a single change record cannot be applied to a text.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ChangeError {
    /// A line index lies beyond the last line of the text.
    #[error("line {line} is out of bounds (text has {line_count} lines)")]
    LineOutOfBounds {
        /// Offending wire-convention line index.
        line: u32,
        /// Number of lines in the text the change was applied against.
        line_count: usize,
    },
    /// A column index lies beyond the end of its line.
    #[error("column {column} is out of bounds on line {line}")]
    ColumnOutOfBounds {
        /// Wire-convention line index.
        line: u32,
        /// Offending wire-convention column index.
        column: u32,
    },
    /// The end position precedes the start position.
    #[error("change range ends before it starts")]
    InvertedRange,
    /// An index underflows the configured base (e.g. line 0 in 1-based mode).
    #[error("index {value} underflows the configured one-based convention")]
    IndexUnderflow {
        /// The offending raw index.
        value: u32,
    },
}

/// Errors raised by [`DocumentStore`](crate::DocumentStore) mutations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The path is not tracked and the operation requires an existing document.
    #[error("no document tracked for '{path}'")]
    NotFound {
        /// Path that was looked up.
        path: PathBuf,
    },
    /// A change record in the batch referenced coordinates outside the text.
    ///
    /// The whole batch is rejected; the stored text is unchanged.
    #[error("invalid change range for '{path}': {source}")]
    InvalidRange {
        /// Document the batch targeted.
        path: PathBuf,
        /// The specific coordinate failure.
        #[source]
        source: ChangeError,
    },
}

/// Errors raised by a content transformer.
#[derive(Debug, Error)]
#[error("content transformer failed: {message}")]
pub struct TransformError {
    /// Human-readable failure description.
    message: String,
}

impl TransformError {
    /// Creates a transformer error with the given description.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Errors raised by the buffer update pipeline.
#[derive(Debug, Error)]
pub enum UpdateError {
    /// The language's content transformer rejected the edit; nothing was
    /// written.
    #[error("transform failed for language '{language}': {source}")]
    Transform {
        /// Language whose transformer ran.
        language: String,
        /// Underlying transformer failure.
        #[source]
        source: TransformError,
    },
    /// The document store rejected the commit.
    #[error(transparent)]
    Store(#[from] StoreError),
    /// Reading the on-disk content for a from-disk reload failed.
    #[error("failed to read '{path}' from disk: {source}")]
    Disk {
        /// Path that could not be read.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}
