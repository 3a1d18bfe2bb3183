//! Daemon bootstrap orchestration.
//!
//! Bootstrap runs the startup sequence in a fixed order: load
//! configuration, install telemetry, prepare the socket filesystem, compose
//! the capability registry. Each stage's failure is a distinct
//! [`BootstrapError`] variant so operators can tell a bad config from a bad
//! descriptor table; composition failures are the only startup-fatal errors
//! a correct configuration can still produce.

use std::sync::Arc;

use ortho_config::OrthoError;
use thiserror::Error;

use junction_config::{Config, SocketPreparationError};
use junction_documents::DocumentStore;
use junction_host::{CapabilityDescriptor, Dispatcher, RegistryError};

use crate::composition;
use crate::dispatch::DispatchConnectionHandler;
use crate::telemetry::{self, TelemetryError, TelemetryHandle};
use crate::transport::{SocketListener, TransportError};

/// Trait abstracting configuration loading for testability.
pub trait ConfigLoader: Send + Sync {
    /// Loads the daemon configuration.
    ///
    /// # Errors
    ///
    /// Returns the underlying loader error when any configuration layer
    /// fails to parse.
    fn load(&self) -> Result<Config, Arc<OrthoError>>;
}

/// Loader that delegates to [`Config::load`].
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemConfigLoader;

impl ConfigLoader for SystemConfigLoader {
    fn load(&self) -> Result<Config, Arc<OrthoError>> {
        Config::load()
    }
}

/// Loader returning a fixed configuration, for tests and embedders.
#[derive(Debug, Clone)]
pub struct StaticConfigLoader(pub Config);

impl ConfigLoader for StaticConfigLoader {
    fn load(&self) -> Result<Config, Arc<OrthoError>> {
        Ok(self.0.clone())
    }
}

/// Errors surfaced during bootstrap.
#[derive(Debug, Error)]
pub enum BootstrapError {
    /// Configuration failed to load.
    #[error("failed to load configuration: {source}")]
    Configuration {
        /// Underlying loader error.
        #[source]
        source: Arc<OrthoError>,
    },
    /// Telemetry initialisation failed.
    #[error("failed to initialise telemetry: {source}")]
    Telemetry {
        /// Underlying telemetry error.
        #[source]
        source: TelemetryError,
    },
    /// Socket preparation failed.
    #[error("failed to prepare daemon socket: {source}")]
    Socket {
        /// Filesystem error preparing the socket directory.
        #[source]
        source: SocketPreparationError,
    },
    /// The capability descriptor table is inconsistent.
    #[error("failed to compose capability registry: {source}")]
    Composition {
        /// Underlying registry error.
        #[source]
        source: RegistryError,
    },
}

/// A bootstrapped daemon, ready to serve.
pub struct Daemon {
    config: Config,
    dispatcher: Arc<Dispatcher>,
    store: Arc<DocumentStore>,
    telemetry: TelemetryHandle,
}

impl Daemon {
    /// The resolved configuration.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The composed request dispatcher.
    #[must_use]
    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    /// The shared document store.
    #[must_use]
    pub fn store(&self) -> &Arc<DocumentStore> {
        &self.store
    }

    /// The telemetry handle, primarily useful for testing.
    #[must_use]
    pub fn telemetry(&self) -> TelemetryHandle {
        self.telemetry
    }

    /// Binds the configured socket and serves connections until the
    /// listener stops.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError`] when the socket cannot be bound or the
    /// accept loop dies.
    pub fn run(self) -> Result<(), TransportError> {
        let listener = SocketListener::bind(self.config.daemon_socket())?;
        let handler = Arc::new(DispatchConnectionHandler::new(Arc::clone(&self.dispatcher)));
        let handle = listener.start(handler)?;
        handle.join()
    }
}

/// Bootstraps the daemon with the system configuration loader.
///
/// # Errors
///
/// Returns [`BootstrapError`] when any startup stage fails.
pub fn bootstrap() -> Result<Daemon, BootstrapError> {
    bootstrap_with(&SystemConfigLoader, Vec::new())
}

/// Bootstraps the daemon using the supplied collaborators.
///
/// `extensions` contributes additional in-process capability descriptors
/// to composition, between the built-ins and the configured plugins.
///
/// # Errors
///
/// Returns [`BootstrapError`] when any startup stage fails.
pub fn bootstrap_with(
    loader: &dyn ConfigLoader,
    extensions: Vec<CapabilityDescriptor>,
) -> Result<Daemon, BootstrapError> {
    let config = loader
        .load()
        .map_err(|source| BootstrapError::Configuration { source })?;

    let telemetry = telemetry::initialise(&config)
        .map_err(|source| BootstrapError::Telemetry { source })?;

    config
        .daemon_socket()
        .prepare_filesystem()
        .map_err(|source| BootstrapError::Socket { source })?;

    let composition = composition::compose(&config, extensions)
        .map_err(|source| BootstrapError::Composition { source })?;

    Ok(Daemon {
        config,
        dispatcher: composition.dispatcher,
        store: composition.store,
        telemetry,
    })
}
