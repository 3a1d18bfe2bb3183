//! Registry of validated plugin manifests.
//!
//! The registry stores manifests keyed by plugin name and answers lookup
//! queries during startup composition. Duplicate names are rejected; the
//! composition layer expands each manifest into one capability registration
//! per (endpoint, language) pair it declares.

use std::collections::HashMap;

use crate::error::PluginError;
use crate::manifest::PluginManifest;

/// Registry of available plugin manifests.
#[derive(Debug, Clone, Default)]
pub struct PluginRegistry {
    manifests: HashMap<String, PluginManifest>,
}

impl PluginRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a plugin manifest after validation.
    ///
    /// # Errors
    ///
    /// Returns [`PluginError::Manifest`] if validation fails or a plugin
    /// with the same name is already registered.
    pub fn register(&mut self, manifest: PluginManifest) -> Result<(), PluginError> {
        manifest.validate()?;
        let name = manifest.name().to_owned();
        if self.manifests.contains_key(&name) {
            return Err(PluginError::manifest(format!(
                "plugin '{name}' is already registered"
            )));
        }
        self.manifests.insert(name, manifest);
        Ok(())
    }

    /// Looks up a plugin by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&PluginManifest> {
        self.manifests.get(name)
    }

    /// Returns all plugins that declare support for the given language.
    #[must_use]
    pub fn find_for_language(&self, language: &str) -> Vec<&PluginManifest> {
        let lower = language.to_ascii_lowercase();
        let mut found: Vec<&PluginManifest> = self
            .manifests
            .values()
            .filter(|m| {
                m.languages()
                    .iter()
                    .any(|l| l.to_ascii_lowercase() == lower)
            })
            .collect();
        found.sort_by_key(|m| m.name().to_owned());
        found
    }

    /// Iterates all manifests in name order.
    pub fn iter(&self) -> impl Iterator<Item = &PluginManifest> {
        let mut manifests: Vec<&PluginManifest> = self.manifests.values().collect();
        manifests.sort_by_key(|m| m.name().to_owned());
        manifests.into_iter()
    }

    /// Returns the number of registered plugins.
    #[must_use]
    pub fn len(&self) -> usize {
        self.manifests.len()
    }

    /// Returns `true` when no plugins are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.manifests.is_empty()
    }
}
