//! Plugin manifest types describing identity and registrations.
//!
//! A [`PluginManifest`] declares everything the daemon needs to know about a
//! plugin before spawning it: name, version, executable, the languages it
//! serves, the endpoints it implements, ordering constraints relative to
//! other registration sources, and its reply deadline. Manifests are
//! validated before registration so obviously broken configurations are
//! rejected during composition rather than mid-dispatch.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::PluginError;

/// Default reply deadline in seconds.
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Tracing target for manifest loading.
const MANIFEST_TARGET: &str = "junction_plugins::manifest";

/// Declarative description of one plugin.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginManifest {
    name: String,
    version: String,
    executable: PathBuf,
    #[serde(default)]
    args: Vec<String>,
    languages: Vec<String>,
    endpoints: Vec<String>,
    #[serde(default)]
    after: Vec<String>,
    #[serde(default = "default_timeout_secs")]
    timeout_secs: u64,
}

const fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

impl PluginManifest {
    /// Creates a manifest with default timeout and no extra arguments.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        version: impl Into<String>,
        executable: PathBuf,
        languages: Vec<String>,
        endpoints: Vec<String>,
    ) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            executable,
            args: Vec::new(),
            languages,
            endpoints,
            after: Vec::new(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }

    /// Appends default arguments to pass to the plugin executable.
    #[must_use]
    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.args = args;
        self
    }

    /// Declares registration sources this plugin must run after.
    #[must_use]
    pub fn with_after(mut self, after: Vec<String>) -> Self {
        self.after = after;
        self
    }

    /// Overrides the default reply deadline.
    #[must_use]
    pub const fn with_timeout_secs(mut self, timeout_secs: u64) -> Self {
        self.timeout_secs = timeout_secs;
        self
    }

    /// Validates the manifest.
    ///
    /// # Errors
    ///
    /// Returns [`PluginError::Manifest`] when the name is empty, the
    /// executable path is not absolute, or no (endpoint, language)
    /// registration would result.
    pub fn validate(&self) -> Result<(), PluginError> {
        if self.name.trim().is_empty() {
            return Err(PluginError::manifest("plugin name must not be empty"));
        }
        if !self.executable.is_absolute() {
            return Err(PluginError::manifest(format!(
                "plugin executable must be an absolute path, got '{}'",
                self.executable.display()
            )));
        }
        if self.languages.is_empty() {
            return Err(PluginError::manifest(format!(
                "plugin '{}' declares no languages",
                self.name
            )));
        }
        if self.endpoints.is_empty() {
            return Err(PluginError::manifest(format!(
                "plugin '{}' declares no endpoints",
                self.name
            )));
        }
        Ok(())
    }

    /// Returns the plugin name.
    #[must_use]
    pub const fn name(&self) -> &str {
        self.name.as_str()
    }

    /// Returns the plugin version.
    #[must_use]
    pub const fn version(&self) -> &str {
        self.version.as_str()
    }

    /// Returns the absolute path to the plugin executable.
    #[must_use]
    pub fn executable(&self) -> &Path {
        &self.executable
    }

    /// Returns the default arguments.
    #[must_use]
    pub fn args(&self) -> &[String] {
        &self.args
    }

    /// Returns the languages this plugin serves.
    #[must_use]
    pub fn languages(&self) -> &[String] {
        &self.languages
    }

    /// Returns the endpoints this plugin implements.
    #[must_use]
    pub fn endpoints(&self) -> &[String] {
        &self.endpoints
    }

    /// Returns the registration sources this plugin runs after.
    #[must_use]
    pub fn after(&self) -> &[String] {
        &self.after
    }

    /// Returns the reply deadline in seconds.
    #[must_use]
    pub const fn timeout_secs(&self) -> u64 {
        self.timeout_secs
    }

    /// Reads and validates a manifest from a JSON file.
    ///
    /// # Errors
    ///
    /// Returns [`PluginError::Io`] when the file cannot be read,
    /// [`PluginError::DeserializeResponse`] when it is not valid manifest
    /// JSON, and [`PluginError::Manifest`] when validation fails.
    pub fn from_json_file(path: &Path) -> Result<Self, PluginError> {
        let bytes = fs::read_to_string(path)
            .map_err(|source| PluginError::io(path.display().to_string(), source))?;
        let manifest: Self =
            serde_json::from_str(&bytes).map_err(|source| PluginError::DeserializeResponse {
                message: format!("invalid manifest '{}': {source}", path.display()),
                source: Some(source),
            })?;
        manifest.validate()?;
        Ok(manifest)
    }
}

/// Loads every `*.json` manifest from a directory.
///
/// Unreadable or invalid manifests are logged and skipped — a broken plugin
/// yields no registration, it does not take the daemon down.
///
/// # Errors
///
/// Returns [`PluginError::Io`] when the directory itself cannot be read.
pub fn load_dir(dir: &Path) -> Result<Vec<PluginManifest>, PluginError> {
    let entries =
        fs::read_dir(dir).map_err(|source| PluginError::io(dir.display().to_string(), source))?;

    let mut manifests = Vec::new();
    for entry in entries {
        let Ok(entry) = entry else { continue };
        let path = entry.path();
        if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
            continue;
        }
        match PluginManifest::from_json_file(&path) {
            Ok(manifest) => manifests.push(manifest),
            Err(error) => {
                warn!(
                    target: MANIFEST_TARGET,
                    path = %path.display(),
                    %error,
                    "skipping invalid plugin manifest"
                );
            }
        }
    }
    manifests.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(manifests)
}
