//! In-memory document state for the junction daemon.
//!
//! This crate owns the authoritative "current text" of every tracked file
//! and the only write path into it. The [`DocumentStore`] keeps one versioned
//! text per normalised path and serialises writers per path; the
//! [`UpdatePipeline`] sits in front of the store and funnels raw edits
//! through per-language content transformers before anything is committed.
//!
//! # Architecture
//!
//! ```text
//! ┌───────────┐     ┌────────────────┐     ┌───────────────┐
//! │ Transport │────▶│ UpdatePipeline │────▶│ DocumentStore │
//! │  (edits)  │     │ (transformers) │     │ (text+version)│
//! └───────────┘     └────────────────┘     └───────────────┘
//! ```
//!
//! Handlers never write to the store directly; they observe snapshots taken
//! after the pipeline has committed, which is what gives a dispatch
//! read-after-write consistency for its own edits.

mod changes;
mod errors;
mod pipeline;
mod store;

pub use changes::{ChangeRecord, apply_change_set};
pub use junction_config::IndexBase;
pub use errors::{ChangeError, StoreError, TransformError, UpdateError};
pub use pipeline::{BufferUpdate, ContentTransformer, LanguageLookup, UpdatePipeline};
pub use store::{DocumentSnapshot, DocumentStore};
