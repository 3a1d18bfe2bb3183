//! Shared fixtures for daemon tests.

use std::sync::Arc;

use junction_config::Config;
use junction_host::Dispatcher;

use crate::composition;

/// Composes a dispatcher from the default configuration.
///
/// The result serves the built-in endpoint table with the built-in
/// document handlers and no plugins, which is exactly what the wire-level
/// tests need.
pub(crate) fn test_dispatcher() -> Arc<Dispatcher> {
    composition::compose(&Config::default(), Vec::new())
        .expect("default composition succeeds")
        .dispatcher
}
