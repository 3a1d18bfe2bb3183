//! Handler adapter over an out-of-process plugin connection.
//!
//! A [`PluginHandle`] owns one plugin's connection and implements
//! [`Handler`] by forwarding the envelope over the wire protocol. The
//! connection is started lazily on first use; once its process dies the
//! handle reports every call as unavailable until [`PluginHandle::restart`]
//! is invoked explicitly — there is no automatic respawn loop hiding crash
//! storms.
//!
//! Plugins answer with `body_json` holding a serialised
//! [`EndpointResponse`], so the adapter needs no per-endpoint decode table;
//! the dispatcher still validates the kind against the endpoint
//! declaration.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tracing::debug;

use junction_plugins::{PluginConnection, PluginError, PluginManifest};

use crate::envelope::RequestEnvelope;
use crate::handler::{Handler, HandlerError};
use crate::response::EndpointResponse;

/// Tracing target for plugin handler operations.
const PLUGIN_HANDLER_TARGET: &str = "junction_host::plugin";

/// Shared handle onto one plugin, registered once per
/// (endpoint, language) pair the manifest declares.
pub struct PluginHandle {
    manifest: PluginManifest,
    connection: Mutex<Option<Arc<PluginConnection>>>,
}

impl std::fmt::Debug for PluginHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginHandle")
            .field("plugin", &self.manifest.name())
            .finish_non_exhaustive()
    }
}

impl PluginHandle {
    /// Creates a handle; the process is spawned on first use.
    #[must_use]
    pub fn new(manifest: PluginManifest) -> Self {
        Self {
            manifest,
            connection: Mutex::new(None),
        }
    }

    /// The manifest this handle was built from.
    #[must_use]
    pub fn manifest(&self) -> &PluginManifest {
        &self.manifest
    }

    /// Starts the plugin now instead of on first call.
    ///
    /// Composition uses this to skip registration of plugins that cannot
    /// start at all.
    ///
    /// # Errors
    ///
    /// Returns the spawn failure, leaving the handle unstarted.
    pub fn ensure_started(&self) -> Result<(), PluginError> {
        self.live_connection().map(drop)
    }

    /// Tears down any existing connection and starts a fresh process.
    ///
    /// # Errors
    ///
    /// Returns the spawn failure; the handle is left without a connection.
    pub fn restart(&self) -> Result<(), PluginError> {
        debug!(
            target: PLUGIN_HANDLER_TARGET,
            plugin = self.manifest.name(),
            "restarting plugin"
        );
        let previous = self.lock().take();
        if let Some(connection) = previous {
            connection.shutdown();
        }
        let connection = Arc::new(PluginConnection::start(&self.manifest)?);
        *self.lock() = Some(connection);
        Ok(())
    }

    /// Shuts the plugin down explicitly.
    pub fn shutdown(&self) {
        if let Some(connection) = self.lock().take() {
            connection.shutdown();
        }
    }

    /// Returns a live connection, spawning one when none exists yet.
    ///
    /// A connection that has died stays dead from this handle's point of
    /// view; the caller must restart explicitly.
    fn live_connection(&self) -> Result<Arc<PluginConnection>, PluginError> {
        let mut slot = self.lock();
        if let Some(connection) = slot.as_ref() {
            if connection.is_available() {
                return Ok(Arc::clone(connection));
            }
            return Err(PluginError::Unavailable {
                name: self.manifest.name().to_owned(),
            });
        }
        let connection = Arc::new(PluginConnection::start(&self.manifest)?);
        *slot = Some(Arc::clone(&connection));
        Ok(connection)
    }

    fn lock(&self) -> MutexGuard<'_, Option<Arc<PluginConnection>>> {
        self.connection
            .lock()
            .unwrap_or_else(|poison| poison.into_inner())
    }
}

impl Handler for PluginHandle {
    fn handle(&self, request: &RequestEnvelope) -> Result<EndpointResponse, HandlerError> {
        let connection = self.live_connection().map_err(HandlerError::Plugin)?;

        let timeout = request
            .timeout
            .unwrap_or_else(|| Duration::from_secs(self.manifest.timeout_secs()));
        let reply = connection
            .call(&request.endpoint, wire_arguments(request), timeout)
            .map_err(HandlerError::Plugin)?;

        let body = reply.body_json().trim();
        if body.is_empty() {
            // A successful reply with no body is a bare acknowledgement.
            return Ok(EndpointResponse::Ack);
        }
        serde_json::from_str(body).map_err(|source| {
            HandlerError::Plugin(PluginError::DeserializeResponse {
                message: format!(
                    "plugin '{}' returned an unparseable response body",
                    self.manifest.name()
                ),
                source: Some(source),
            })
        })
    }
}

/// Projects the envelope into the wire `arguments` object.
fn wire_arguments(request: &RequestEnvelope) -> serde_json::Value {
    serde_json::json!({
        "path": request.path.display().to_string(),
        "line": request.position.map(|p| p.line),
        "column": request.position.map(|p| p.column),
        "arguments": request.arguments,
    })
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;

    fn manifest_for(executable: &str, args: Vec<String>) -> PluginManifest {
        PluginManifest::new(
            "test-plugin",
            "0.0.0",
            PathBuf::from(executable),
            vec!["csharp".into()],
            vec!["codecheck".into()],
        )
        .with_args(args)
        .with_timeout_secs(5)
    }

    #[test]
    fn spawn_failure_surfaces_as_a_handler_error() {
        let handle = PluginHandle::new(manifest_for("/nonexistent/junction-plugin", Vec::new()));
        let error = handle
            .handle(&RequestEnvelope::new("codecheck", "/ws/a.cs"))
            .expect_err("spawn fails");
        assert!(matches!(
            error,
            HandlerError::Plugin(PluginError::SpawnFailed { .. })
        ));
    }

    #[test]
    fn ensure_started_reports_the_same_failure() {
        let handle = PluginHandle::new(manifest_for("/nonexistent/junction-plugin", Vec::new()));
        assert!(handle.ensure_started().is_err());
    }

    #[cfg(unix)]
    mod with_real_process {
        use super::*;

        /// Replies to every request with an `ack` response body.
        const ACK_SCRIPT: &str = r#"awk '{
            match($0, /"seq":[0-9]+/);
            s = substr($0, RSTART + 6, RLENGTH - 6);
            printf("{\"request_seq\":%s,\"success\":true,\"body_json\":\"{\\\"kind\\\":\\\"ack\\\"}\"}\n", s);
            fflush();
        }'"#;

        fn shell_manifest(script: &str) -> PluginManifest {
            manifest_for("/bin/sh", vec!["-c".into(), script.into()])
        }

        #[test]
        fn forwards_requests_and_decodes_the_body() {
            let handle = PluginHandle::new(shell_manifest(ACK_SCRIPT));
            let response = handle
                .handle(&RequestEnvelope::new("codecheck", "/ws/a.cs").at(1, 2))
                .expect("plugin answers");
            assert_eq!(response, EndpointResponse::Ack);
            handle.shutdown();
        }

        #[test]
        fn dead_plugins_stay_dead_until_restarted() {
            let handle = PluginHandle::new(shell_manifest("read -r line; exit 0"));

            let first = handle.handle(&RequestEnvelope::new("codecheck", "/ws/a.cs"));
            assert!(first.is_err(), "plugin died before replying");

            let second = handle
                .handle(&RequestEnvelope::new("codecheck", "/ws/a.cs"))
                .expect_err("handle stays unavailable");
            assert!(matches!(
                second,
                HandlerError::Plugin(PluginError::Unavailable { .. })
            ));

            handle.restart().expect("restart spawns a new process");
            let third = handle.handle(&RequestEnvelope::new("codecheck", "/ws/a.cs"));
            assert!(third.is_err(), "fresh process also exits after one line");
            handle.shutdown();
        }
    }
}
