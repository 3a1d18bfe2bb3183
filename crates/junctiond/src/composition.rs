//! Startup composition of the capability registry.
//!
//! Composition is an explicit fold over descriptor tables: the built-in
//! endpoint declarations, the built-in document handlers, any descriptors
//! an embedder passes in, and one registration per (endpoint, language)
//! pair declared by each plugin manifest found in the configured directory.
//! Nothing is discovered at runtime; after this fold the registry is
//! immutable.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use junction_config::Config;
use junction_documents::{DocumentStore, UpdatePipeline};
use junction_host::{
    CapabilityDescriptor, Dispatcher, EventRelay, Handler, OrphanResolver, PluginHandle,
    ProjectResolver, RegistryBuilder, RegistryError, ResolverLanguageLookup, ResponseKind,
};
use junction_plugins::manifest;

/// Tracing target for composition.
const COMPOSE_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::composition");

/// Registration source name for the built-in handlers.
const BUILTIN_SOURCE: &str = "host";

/// Closed endpoint table: every operation the daemon serves, with its
/// response kind. Fixed at compose time, never negotiated per call.
const BUILTIN_ENDPOINTS: &[(&str, ResponseKind)] = &[
    ("update-buffer", ResponseKind::Ack),
    ("change-buffer", ResponseKind::Ack),
    ("open-document", ResponseKind::Ack),
    ("close-document", ResponseKind::Ack),
    ("document-text", ResponseKind::Text),
    ("codecheck", ResponseKind::Fixes),
    ("goto-definition", ResponseKind::Locations),
    ("find-references", ResponseKind::Locations),
    ("format", ResponseKind::Text),
];

/// Everything the daemon needs after composition.
pub(crate) struct Composition {
    pub(crate) dispatcher: Arc<Dispatcher>,
    pub(crate) store: Arc<DocumentStore>,
}

/// Composes the dispatcher and its collaborators from configuration.
///
/// `extensions` lets embedders contribute in-process handlers without
/// patching this crate; they are folded in between the built-ins and the
/// plugins.
///
/// # Errors
///
/// Returns [`RegistryError`] when the descriptor set is inconsistent
/// (unknown endpoint, duplicate source, ordering cycle). These are
/// startup-fatal by design.
pub(crate) fn compose(
    config: &Config,
    extensions: Vec<CapabilityDescriptor>,
) -> Result<Composition, RegistryError> {
    let store = Arc::new(DocumentStore::new(config.index_base()));
    let resolver: Arc<dyn ProjectResolver> =
        Arc::new(OrphanResolver::new(config.default_language()));
    let lookup = Arc::new(ResolverLanguageLookup::new(
        Arc::clone(&resolver),
        config.default_language(),
    ));
    let pipeline = Arc::new(UpdatePipeline::new(Arc::clone(&store), lookup));

    let mut builder = RegistryBuilder::new();
    for (endpoint, kind) in BUILTIN_ENDPOINTS {
        builder = builder.declare_endpoint(*endpoint, *kind)?;
    }

    builder = register_builtins(builder, config, &store);
    for descriptor in extensions {
        builder = builder.register(descriptor);
    }
    builder = register_plugins(builder, config);

    let registry = Arc::new(builder.build()?);
    info!(
        target: COMPOSE_TARGET,
        handlers = registry.handler_count(),
        "capability registry composed"
    );

    let relay = Arc::new(EventRelay::new());
    let dispatcher = Arc::new(
        Dispatcher::new(registry, pipeline, resolver, relay)
            .with_default_timeout(Duration::from_secs(config.handler_timeout_secs())),
    );

    Ok(Composition { dispatcher, store })
}

/// Registers the built-in document handlers for the default language.
///
/// Under the orphan resolver every path resolves to the default language,
/// so these effectively serve the whole workspace; a richer project system
/// would register them per supported language.
fn register_builtins(
    builder: RegistryBuilder,
    config: &Config,
    store: &Arc<DocumentStore>,
) -> RegistryBuilder {
    use crate::builtins::{CloseDocumentHandler, DocumentTextHandler, OpenDocumentHandler};

    let language = config.default_language();
    builder
        .register(CapabilityDescriptor::new(
            "open-document",
            language,
            BUILTIN_SOURCE,
            Arc::new(OpenDocumentHandler::new(Arc::clone(store))),
        ))
        .register(CapabilityDescriptor::new(
            "close-document",
            language,
            BUILTIN_SOURCE,
            Arc::new(CloseDocumentHandler::new(Arc::clone(store))),
        ))
        .register(CapabilityDescriptor::new(
            "document-text",
            language,
            BUILTIN_SOURCE,
            Arc::new(DocumentTextHandler::new(Arc::clone(store))),
        ))
}

/// Expands plugin manifests into capability registrations.
///
/// A plugin that cannot start, or a manifest that cannot be read, yields
/// no registration — it is logged and skipped, never fatal. Endpoints a
/// manifest names that the daemon does not declare are skipped the same
/// way, so a third-party manifest cannot take composition down.
fn register_plugins(mut builder: RegistryBuilder, config: &Config) -> RegistryBuilder {
    let Some(dir) = config.plugin_dir() else {
        return builder;
    };
    let manifests = match manifest::load_dir(dir.as_std_path()) {
        Ok(manifests) => manifests,
        Err(error) => {
            warn!(
                target: COMPOSE_TARGET,
                directory = %dir,
                %error,
                "plugin directory unreadable, composing without plugins"
            );
            return builder;
        }
    };

    let declared: BTreeSet<String> = BUILTIN_ENDPOINTS
        .iter()
        .map(|(endpoint, _)| (*endpoint).to_owned())
        .collect();

    for manifest in manifests {
        let handle = Arc::new(PluginHandle::new(manifest.clone()));
        if let Err(error) = handle.ensure_started() {
            warn!(
                target: COMPOSE_TARGET,
                plugin = manifest.name(),
                %error,
                "plugin failed to start, it yields no registration"
            );
            continue;
        }
        for endpoint in manifest.endpoints() {
            if !declared.contains(&endpoint.to_lowercase()) {
                warn!(
                    target: COMPOSE_TARGET,
                    plugin = manifest.name(),
                    endpoint = %endpoint,
                    "skipping registration for undeclared endpoint"
                );
                continue;
            }
            for language in manifest.languages() {
                builder = builder.register(
                    CapabilityDescriptor::new(
                        endpoint.clone(),
                        language.clone(),
                        manifest.name(),
                        Arc::clone(&handle) as Arc<dyn Handler>,
                    )
                    .with_after(manifest.after().to_vec()),
                );
            }
        }
        info!(
            target: COMPOSE_TARGET,
            plugin = manifest.name(),
            "plugin registered"
        );
    }
    builder
}

#[cfg(test)]
mod tests {
    use junction_host::{EndpointResponse, RequestEnvelope};

    use super::*;

    #[test]
    fn default_composition_serves_the_builtin_endpoints() {
        let composition = compose(&Config::default(), Vec::new()).expect("compose");

        let registry = composition.dispatcher.registry();
        assert_eq!(registry.endpoints().count(), BUILTIN_ENDPOINTS.len());
        assert_eq!(registry.resolve("document-text", "plaintext").len(), 1);
        assert!(registry.resolve("codecheck", "plaintext").is_empty());
    }

    #[test]
    fn composed_dispatcher_round_trips_an_edit() {
        let composition = compose(&Config::default(), Vec::new()).expect("compose");

        let edit = RequestEnvelope::new("update-buffer", "/ws/a.cs").with_text("class A{}");
        composition.dispatcher.dispatch(&edit).expect("edit");

        let read = RequestEnvelope::new("document-text", "/ws/a.cs");
        let outcome = composition.dispatcher.dispatch(&read).expect("read");
        assert_eq!(
            outcome.response,
            EndpointResponse::Text {
                text: Some("class A{}".to_owned())
            }
        );
    }

    #[test]
    fn unreadable_plugin_directory_is_not_fatal() {
        let dir = tempfile::tempdir().expect("temp dir");
        let config = Config {
            plugin_dir: Some(
                camino::Utf8PathBuf::from_path_buf(dir.path().join("absent"))
                    .expect("utf8 path"),
            ),
            ..Config::default()
        };
        let composition = compose(&config, Vec::new()).expect("compose without plugins");
        assert!(composition.store.is_empty());
    }

    #[test]
    fn unstartable_plugins_yield_no_registration() {
        let dir = tempfile::tempdir().expect("temp dir");
        let manifest = junction_plugins::PluginManifest::new(
            "ghost",
            "1.0",
            std::path::PathBuf::from("/nonexistent/junction-ghost"),
            vec!["plaintext".into()],
            vec!["codecheck".into()],
        );
        std::fs::write(
            dir.path().join("ghost.json"),
            serde_json::to_string(&manifest).expect("serialise"),
        )
        .expect("write manifest");

        let config = Config {
            plugin_dir: Some(
                camino::Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).expect("utf8 path"),
            ),
            ..Config::default()
        };
        let composition = compose(&config, Vec::new()).expect("compose");
        assert!(
            composition
                .dispatcher
                .registry()
                .resolve("codecheck", "plaintext")
                .is_empty(),
            "a plugin that fails to start must not be registered"
        );
    }
}
