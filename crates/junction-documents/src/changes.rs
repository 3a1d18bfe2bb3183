//! Range-based change records and their application to text.
//!
//! A change record addresses a span of text by line and column in the
//! process-wide convention ([`IndexBase`]) and replaces it with new text.
//! Change sets apply strictly in order: each record's coordinates are
//! interpreted against the text produced by the previous record, never
//! against the original text. Columns count Unicode scalar values, not
//! bytes.

use serde::{Deserialize, Serialize};

use junction_config::IndexBase;

use crate::errors::ChangeError;

/// A single range replacement in wire-convention coordinates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeRecord {
    /// Line of the span start.
    pub start_line: u32,
    /// Column of the span start.
    pub start_column: u32,
    /// Line of the span end (exclusive position).
    pub end_line: u32,
    /// Column of the span end (exclusive position).
    pub end_column: u32,
    /// Replacement text, possibly empty (a deletion).
    pub new_text: String,
}

impl ChangeRecord {
    /// Creates a change record replacing the given span.
    #[must_use]
    pub fn new(
        (start_line, start_column): (u32, u32),
        (end_line, end_column): (u32, u32),
        new_text: impl Into<String>,
    ) -> Self {
        Self {
            start_line,
            start_column,
            end_line,
            end_column,
            new_text: new_text.into(),
        }
    }

    /// Creates an insertion at a single position.
    #[must_use]
    pub fn insertion(line: u32, column: u32, new_text: impl Into<String>) -> Self {
        Self::new((line, column), (line, column), new_text)
    }
}

/// Applies a change set to `text`, producing the resulting text.
///
/// Records apply sequentially; record *n+1* is resolved against the output
/// of record *n*. The input is never mutated, so a failed set leaves the
/// caller's text untouched.
///
/// # Errors
///
/// Returns [`ChangeError`] when any record addresses coordinates outside the
/// evolving text or describes an inverted range. No partial result is
/// produced.
pub fn apply_change_set(
    text: &str,
    changes: &[ChangeRecord],
    base: IndexBase,
) -> Result<String, ChangeError> {
    let mut working = text.to_owned();
    for change in changes {
        let start = byte_offset(&working, change.start_line, change.start_column, base)?;
        let end = byte_offset(&working, change.end_line, change.end_column, base)?;
        if end < start {
            return Err(ChangeError::InvertedRange);
        }
        working.replace_range(start..end, &change.new_text);
    }
    Ok(working)
}

/// Resolves a wire-convention (line, column) position to a byte offset.
fn byte_offset(text: &str, line: u32, column: u32, base: IndexBase) -> Result<usize, ChangeError> {
    let line_index = rebase(line, base)?;
    let column_index = rebase(column, base)?;

    let starts = line_starts(text);
    let line_count = starts.len();
    let Some(&line_start) = starts.get(line_index as usize) else {
        return Err(ChangeError::LineOutOfBounds { line, line_count });
    };
    let line_end = starts
        .get(line_index as usize + 1)
        .map_or(text.len(), |next| next - 1);

    let line_text = text.get(line_start..line_end).unwrap_or_default();
    let mut remaining = column_index;
    for (byte, _) in line_text.char_indices() {
        if remaining == 0 {
            return Ok(line_start + byte);
        }
        remaining -= 1;
    }
    if remaining == 0 {
        // Position directly after the last character of the line.
        return Ok(line_end);
    }
    Err(ChangeError::ColumnOutOfBounds { line, column })
}

/// Converts a wire-convention index to a zero-based index.
fn rebase(value: u32, base: IndexBase) -> Result<u32, ChangeError> {
    value
        .checked_sub(base.origin())
        .ok_or(ChangeError::IndexUnderflow { value })
}

/// Byte offsets at which each line begins.
fn line_starts(text: &str) -> Vec<usize> {
    let mut starts = vec![0];
    for (index, byte) in text.bytes().enumerate() {
        if byte == b'\n' {
            starts.push(index + 1);
        }
    }
    starts
}
