//! Process-wide line/column indexing convention.
//!
//! Every change record in one daemon instance uses the same base. The flag
//! is set once at startup from configuration; it is deliberately not a
//! per-request option, so components downstream of the document store never
//! need to ask which convention a particular payload used.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Base for line and column indices in change records.
#[derive(
    Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq, EnumString, Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum IndexBase {
    /// Lines and columns start at zero.
    #[default]
    Zero,
    /// Lines and columns start at one.
    One,
}

impl IndexBase {
    /// Offset subtracted from wire indices to obtain zero-based values.
    #[must_use]
    pub const fn origin(self) -> u32 {
        match self {
            Self::Zero => 0,
            Self::One => 1,
        }
    }
}

/// Errors encountered while parsing an [`IndexBase`] from text.
pub type IndexBaseParseError = strum::ParseError;
