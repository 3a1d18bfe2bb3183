//! Buffer update pipeline in front of the document store.
//!
//! Every edit — full replacement, incremental change set, or from-disk
//! reload — enters the store through [`UpdatePipeline::update`]. The
//! pipeline resolves the owning language for the target path and, when that
//! language registers a [`ContentTransformer`], lets the transformer rewrite
//! the edit before it is committed. This indirection exists because some
//! languages are hosted by re-expressing their files as a different
//! language's buffer (a generated overlay); downstream handlers must see the
//! projected text, never the raw request payload.

use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use tracing::debug;

use crate::changes::ChangeRecord;
use crate::errors::{TransformError, UpdateError};
use crate::store::DocumentStore;

/// Tracing target for pipeline operations.
const PIPELINE_TARGET: &str = "junction_documents::pipeline";

/// Raw edit accepted by the pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BufferUpdate {
    /// Replace the whole buffer with new text.
    Full {
        /// Replacement text.
        text: String,
    },
    /// Apply an ordered change set to the current buffer.
    Incremental {
        /// Change records in application order.
        changes: Vec<ChangeRecord>,
    },
    /// Re-read the file's current on-disk bytes as a full replacement.
    FromDisk,
}

/// Answers "which language owns this path" for the pipeline.
///
/// Implementations must fall back to the configured default language rather
/// than returning nothing; every path resolves to at least one language.
pub trait LanguageLookup: Send + Sync {
    /// Primary language owning `path`.
    fn owning_language(&self, path: &Path) -> String;
}

/// Rewrites raw edits into the form downstream handlers should observe.
pub trait ContentTransformer: Send + Sync {
    /// Projects a full buffer replacement.
    ///
    /// # Errors
    ///
    /// Returns [`TransformError`] when the text cannot be projected; the
    /// update is aborted and nothing is written.
    fn transform_full(&self, path: &Path, text: String) -> Result<String, TransformError>;

    /// Projects an incremental change set.
    ///
    /// # Errors
    ///
    /// Returns [`TransformError`] when the changes cannot be projected; the
    /// update is aborted and nothing is written.
    fn transform_changes(
        &self,
        path: &Path,
        changes: Vec<ChangeRecord>,
    ) -> Result<Vec<ChangeRecord>, TransformError>;
}

/// Funnel for all writes into a [`DocumentStore`].
///
/// Transformers are registered during startup composition; the pipeline is
/// immutable afterwards and shareable via `Arc`.
pub struct UpdatePipeline {
    store: Arc<DocumentStore>,
    languages: Arc<dyn LanguageLookup>,
    transformers: HashMap<String, Arc<dyn ContentTransformer>>,
}

impl std::fmt::Debug for UpdatePipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UpdatePipeline")
            .field("transformer_languages", &self.transformer_languages())
            .finish_non_exhaustive()
    }
}

impl UpdatePipeline {
    /// Creates a pipeline with no transformers.
    #[must_use]
    pub fn new(store: Arc<DocumentStore>, languages: Arc<dyn LanguageLookup>) -> Self {
        Self {
            store,
            languages,
            transformers: HashMap::new(),
        }
    }

    /// Registers a content transformer for a language (composition only).
    #[must_use]
    pub fn with_transformer(
        mut self,
        language: impl Into<String>,
        transformer: Arc<dyn ContentTransformer>,
    ) -> Self {
        self.transformers
            .insert(language.into().to_lowercase(), transformer);
        self
    }

    /// The store this pipeline commits into.
    #[must_use]
    pub fn store(&self) -> &Arc<DocumentStore> {
        &self.store
    }

    /// Languages with a registered transformer, sorted for determinism.
    #[must_use]
    pub fn transformer_languages(&self) -> Vec<String> {
        let mut languages: Vec<String> = self.transformers.keys().cloned().collect();
        languages.sort();
        languages
    }

    /// Routes one raw edit through transformation and into the store.
    ///
    /// Returns the committed document version.
    ///
    /// # Errors
    ///
    /// Returns [`UpdateError::Transform`] when the owning language's
    /// transformer rejects the edit, [`UpdateError::Store`] when the store
    /// rejects the commit, and [`UpdateError::Disk`] when a from-disk reload
    /// cannot read the file. In every case nothing has been written.
    pub fn update(&self, path: &Path, update: BufferUpdate) -> Result<u64, UpdateError> {
        let language = self.languages.owning_language(path);
        let transformer = self.transformers.get(&language.to_lowercase());

        debug!(
            target: PIPELINE_TARGET,
            path = %path.display(),
            language = %language,
            transformed = transformer.is_some(),
            kind = update_kind(&update),
            "routing buffer update"
        );

        match update {
            BufferUpdate::Full { text } => {
                let text = match transformer {
                    Some(transformer) => transformer
                        .transform_full(path, text)
                        .map_err(|source| UpdateError::Transform {
                            language: language.clone(),
                            source,
                        })?,
                    None => text,
                };
                Ok(self.store.put_full(path, text))
            }
            BufferUpdate::Incremental { changes } => {
                let changes = match transformer {
                    Some(transformer) => transformer
                        .transform_changes(path, changes)
                        .map_err(|source| UpdateError::Transform {
                            language: language.clone(),
                            source,
                        })?,
                    None => changes,
                };
                Ok(self.store.apply_changes(path, &changes)?)
            }
            BufferUpdate::FromDisk => {
                let text = fs::read_to_string(path).map_err(|source| UpdateError::Disk {
                    path: path.to_path_buf(),
                    source,
                })?;
                let text = match transformer {
                    Some(transformer) => transformer
                        .transform_full(path, text)
                        .map_err(|source| UpdateError::Transform {
                            language: language.clone(),
                            source,
                        })?,
                    None => text,
                };
                Ok(self.store.put_full(path, text))
            }
        }
    }
}

fn update_kind(update: &BufferUpdate) -> &'static str {
    match update {
        BufferUpdate::Full { .. } => "full",
        BufferUpdate::Incremental { .. } => "incremental",
        BufferUpdate::FromDisk => "from_disk",
    }
}
