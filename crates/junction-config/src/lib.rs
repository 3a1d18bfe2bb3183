//! Shared configuration for the junction daemon and its library crates.
//!
//! Configuration is resolved in layers: built-in defaults, an optional TOML
//! file (`--config-path`), environment variables under the `JUNCTION_`
//! prefix, and finally CLI flags derived from the field names. The layering
//! is delegated to [`ortho_config`]; this crate only declares the schema and
//! the defaults.

mod convention;
mod defaults;
mod logging;
mod socket;

use std::sync::Arc;

use camino::Utf8PathBuf;
use ortho_config::{OrthoConfig, OrthoError};
use serde::{Deserialize, Serialize};

pub use convention::{IndexBase, IndexBaseParseError};
pub use defaults::{
    DEFAULT_HANDLER_TIMEOUT_SECS, DEFAULT_LOG_FILTER, DEFAULT_TCP_PORT, default_handler_timeout,
    default_language, default_log_filter, default_log_filter_string, default_log_format,
    default_socket_endpoint,
};
pub use logging::{LogFormat, LogFormatParseError};
pub use socket::{SocketEndpoint, SocketParseError, SocketPreparationError};

/// Resolved daemon configuration.
///
/// Fields are public so tests can build partial configurations with struct
/// update syntax; production code goes through [`Config::load`].
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize, OrthoConfig)]
#[ortho_config(prefix = "JUNCTION")]
pub struct Config {
    /// Endpoint the daemon listens on.
    #[serde(default = "defaults::default_socket_endpoint")]
    pub daemon_socket: SocketEndpoint,
    /// Log filter expression consumed by `tracing-subscriber`.
    #[serde(default = "defaults::default_log_filter_string")]
    pub log_filter: String,
    /// Output format for structured logs.
    #[serde(default = "defaults::default_log_format")]
    pub log_format: LogFormat,
    /// Process-wide line/column convention for change records.
    #[serde(default)]
    pub index_base: IndexBase,
    /// Language assigned to paths no project system claims.
    #[serde(default = "defaults::default_language")]
    pub default_language: String,
    /// Directory scanned for plugin manifests at startup, when set.
    #[serde(default)]
    pub plugin_dir: Option<Utf8PathBuf>,
    /// Default per-handler deadline in seconds.
    #[serde(default = "defaults::default_handler_timeout")]
    pub handler_timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            daemon_socket: defaults::default_socket_endpoint(),
            log_filter: defaults::default_log_filter_string(),
            log_format: defaults::default_log_format(),
            index_base: IndexBase::default(),
            default_language: defaults::default_language(),
            plugin_dir: None,
            handler_timeout_secs: defaults::default_handler_timeout(),
        }
    }
}

impl Config {
    /// Loads the configuration from defaults, file, environment, and CLI.
    ///
    /// # Errors
    ///
    /// Returns the underlying [`OrthoError`] when any layer fails to parse.
    pub fn load() -> Result<Self, Arc<OrthoError>> {
        <Self as OrthoConfig>::load()
    }

    /// Loads the configuration using an explicit argument list.
    ///
    /// Primarily used by tests that simulate CLI invocations.
    ///
    /// # Errors
    ///
    /// Returns the underlying [`OrthoError`] when any layer fails to parse.
    pub fn load_from_iter<I, T>(args: I) -> Result<Self, Arc<OrthoError>>
    where
        I: IntoIterator<Item = T>,
        T: Into<std::ffi::OsString> + Clone,
    {
        <Self as OrthoConfig>::load_from_iter(args)
    }

    /// Endpoint the daemon listens on.
    #[must_use]
    pub fn daemon_socket(&self) -> &SocketEndpoint {
        &self.daemon_socket
    }

    /// Log filter expression.
    #[must_use]
    pub fn log_filter(&self) -> &str {
        &self.log_filter
    }

    /// Structured log output format.
    #[must_use]
    pub fn log_format(&self) -> LogFormat {
        self.log_format
    }

    /// Process-wide line/column convention.
    #[must_use]
    pub fn index_base(&self) -> IndexBase {
        self.index_base
    }

    /// Language assigned to orphan paths.
    #[must_use]
    pub fn default_language(&self) -> &str {
        &self.default_language
    }

    /// Plugin manifest directory, when configured.
    #[must_use]
    pub fn plugin_dir(&self) -> Option<&Utf8PathBuf> {
        self.plugin_dir.as_ref()
    }

    /// Default per-handler deadline in seconds.
    #[must_use]
    pub fn handler_timeout_secs(&self) -> u64 {
        self.handler_timeout_secs
    }
}
