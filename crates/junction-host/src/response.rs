//! Aggregate response sum type and merge rules.
//!
//! Every endpoint is declared at composition time with one [`ResponseKind`];
//! handlers for that endpoint must answer with the matching
//! [`EndpointResponse`] variant. Aggregation is a single left-to-right fold
//! over the ordered handler responses using the per-kind merge rule, so
//! there is exactly one place where "two answers become one" and no
//! per-DTO merge methods.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// A proposed code fix.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fix {
    /// Human-readable description of the fix.
    pub text: String,
    /// Line the fix applies to.
    pub line: u32,
    /// Column the fix applies to.
    pub column: u32,
}

/// A source location.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    /// File containing the location.
    pub path: PathBuf,
    /// Line of the location.
    pub line: u32,
    /// Column of the location.
    pub column: u32,
}

/// Response category an endpoint is declared with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseKind {
    /// List of code fixes; merged by concatenation.
    Fixes,
    /// List of source locations; merged by concatenation.
    Locations,
    /// A single optional text value; the first non-empty answer wins.
    Text,
    /// Bare acknowledgement; merging is trivial.
    Ack,
}

impl ResponseKind {
    /// The defined "no handler answered" value for this kind.
    ///
    /// Absence of a capability is not a fault, so every kind has an empty
    /// response rather than an error.
    #[must_use]
    pub const fn empty(self) -> EndpointResponse {
        match self {
            Self::Fixes => EndpointResponse::Fixes { items: Vec::new() },
            Self::Locations => EndpointResponse::Locations { items: Vec::new() },
            Self::Text => EndpointResponse::Text { text: None },
            Self::Ack => EndpointResponse::Ack,
        }
    }
}

/// One handler's (or the merged aggregate) answer to a request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EndpointResponse {
    /// Code fixes, in handler order.
    Fixes {
        /// Proposed fixes.
        items: Vec<Fix>,
    },
    /// Source locations, in handler order.
    Locations {
        /// Resolved locations.
        items: Vec<Location>,
    },
    /// A single text value (formatted buffer, hover text).
    Text {
        /// The text, when any handler produced one.
        text: Option<String>,
    },
    /// Acknowledgement with no payload.
    Ack,
}

impl EndpointResponse {
    /// The kind this response belongs to.
    #[must_use]
    pub const fn kind(&self) -> ResponseKind {
        match self {
            Self::Fixes { .. } => ResponseKind::Fixes,
            Self::Locations { .. } => ResponseKind::Locations,
            Self::Text { .. } => ResponseKind::Text,
            Self::Ack => ResponseKind::Ack,
        }
    }

    /// Merges `other` into `self` under `self`'s merge rule.
    ///
    /// List-valued kinds concatenate, preserving handler order and every
    /// contribution; `Text` keeps the first non-empty answer; `Ack` absorbs.
    /// The dispatcher validates kinds before folding, so a mismatched pair
    /// cannot occur there; as a total function this keeps `self` when kinds
    /// disagree.
    #[must_use]
    pub fn merge(self, other: Self) -> Self {
        match (self, other) {
            (Self::Fixes { mut items }, Self::Fixes { items: more }) => {
                items.extend(more);
                Self::Fixes { items }
            }
            (Self::Locations { mut items }, Self::Locations { items: more }) => {
                items.extend(more);
                Self::Locations { items }
            }
            (Self::Text { text: Some(text) }, Self::Text { .. }) => Self::Text { text: Some(text) },
            (Self::Text { text: None }, Self::Text { text }) => Self::Text { text },
            (Self::Ack, Self::Ack) => Self::Ack,
            (keep, _) => keep,
        }
    }
}
