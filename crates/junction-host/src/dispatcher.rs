//! Request dispatcher: language resolution, edit-before-read, handler
//! invocation, and response aggregation.
//!
//! The dispatcher is deliberately boring about semantics and strict about
//! sequencing:
//!
//! - The owning languages for the target path are snapshotted once, so a
//!   project system cannot give two different answers within one dispatch.
//! - An edit payload is committed through the buffer update pipeline
//!   *before* any handler runs; a dispatch always reads its own write.
//! - Handler failures are isolated. One broken or slow handler contributes
//!   an error record — reported through the event relay — and the rest of
//!   the ordered list still runs. Edit-path failures are the exception: if
//!   the write never happened, dispatch aborts.
//! - Aggregation is one fold over the ordered responses with the endpoint
//!   kind's merge rule; zero responders yield the kind's empty value, never
//!   an error.

use std::sync::Arc;
use std::sync::mpsc::{RecvTimeoutError, channel};
use std::thread;
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, warn};

use junction_documents::{UpdateError, UpdatePipeline};

use crate::envelope::RequestEnvelope;
use crate::handler::{Handler, HandlerError};
use crate::project::ProjectResolver;
use crate::registry::CapabilityRegistry;
use crate::relay::EventRelay;
use crate::response::EndpointResponse;

/// Tracing target for dispatch operations.
const DISPATCH_TARGET: &str = "junction_host::dispatch";

/// Default per-handler deadline when neither request nor construction set
/// one.
const DEFAULT_HANDLER_TIMEOUT: Duration = Duration::from_secs(30);

/// Errors that abort a whole dispatch.
///
/// Everything else — handler failures, timeouts, plugin deaths — degrades
/// into a partial [`DispatchOutcome`] instead.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// The endpoint was never declared during composition.
    #[error("unknown endpoint '{endpoint}'")]
    UnknownEndpoint {
        /// Endpoint the client asked for.
        endpoint: String,
    },

    /// The edit payload could not be committed; handlers never ran.
    #[error(transparent)]
    Update(#[from] UpdateError),
}

/// One isolated handler failure inside an otherwise successful dispatch.
#[derive(Debug)]
pub struct HandlerFailure {
    /// Registration source of the failing handler.
    pub source: String,
    /// Language the handler was resolved for.
    pub language: String,
    /// What went wrong.
    pub error: HandlerError,
}

/// Aggregate result of one dispatch.
#[derive(Debug)]
pub struct DispatchOutcome {
    /// Merged response in registry order.
    pub response: EndpointResponse,
    /// Failures of individual handlers, in invocation order.
    pub failures: Vec<HandlerFailure>,
}

/// Routes request envelopes to registered handlers.
pub struct Dispatcher {
    registry: Arc<CapabilityRegistry>,
    pipeline: Arc<UpdatePipeline>,
    resolver: Arc<dyn ProjectResolver>,
    relay: Arc<EventRelay>,
    default_timeout: Duration,
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("handler_count", &self.registry.handler_count())
            .field("default_timeout", &self.default_timeout)
            .finish_non_exhaustive()
    }
}

impl Dispatcher {
    /// Creates a dispatcher over the given collaborators.
    #[must_use]
    pub fn new(
        registry: Arc<CapabilityRegistry>,
        pipeline: Arc<UpdatePipeline>,
        resolver: Arc<dyn ProjectResolver>,
        relay: Arc<EventRelay>,
    ) -> Self {
        Self {
            registry,
            pipeline,
            resolver,
            relay,
            default_timeout: DEFAULT_HANDLER_TIMEOUT,
        }
    }

    /// Overrides the default per-handler deadline.
    #[must_use]
    pub const fn with_default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }

    /// The capability registry this dispatcher resolves against.
    #[must_use]
    pub fn registry(&self) -> &Arc<CapabilityRegistry> {
        &self.registry
    }

    /// The event relay failures are reported through.
    #[must_use]
    pub fn relay(&self) -> &Arc<EventRelay> {
        &self.relay
    }

    /// Dispatches one request and aggregates the handler responses.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::UnknownEndpoint`] for endpoints missing
    /// from the composition table, and [`DispatchError::Update`] when an
    /// edit payload cannot be committed (in which case no handler ran).
    pub fn dispatch(&self, envelope: &RequestEnvelope) -> Result<DispatchOutcome, DispatchError> {
        let kind = self
            .registry
            .response_kind(&envelope.endpoint)
            .ok_or_else(|| DispatchError::UnknownEndpoint {
                endpoint: envelope.endpoint.clone(),
            })?;

        // One snapshot per dispatch; the answer may not change mid-request.
        let languages = self.resolver.owning_languages(&envelope.path);

        if let Some(update) = envelope.buffer_update() {
            self.pipeline.update(&envelope.path, update)?;
        }

        let deadline = envelope.timeout.unwrap_or(self.default_timeout);
        let mut response = kind.empty();
        let mut failures = Vec::new();

        for language in &languages {
            for registered in self.registry.resolve(&envelope.endpoint, language) {
                debug!(
                    target: DISPATCH_TARGET,
                    endpoint = %envelope.endpoint,
                    language = %language,
                    source = registered.source(),
                    "invoking handler"
                );
                let result = invoke_with_deadline(
                    Arc::clone(registered.handler()),
                    envelope.clone(),
                    deadline,
                );
                match result {
                    Ok(answer) if answer.kind() == kind => {
                        response = response.merge(answer);
                    }
                    Ok(answer) => {
                        self.record_failure(
                            &mut failures,
                            envelope,
                            language,
                            registered.source(),
                            HandlerError::KindMismatch {
                                expected: kind,
                                actual: answer.kind(),
                            },
                        );
                    }
                    Err(error) => {
                        self.record_failure(
                            &mut failures,
                            envelope,
                            language,
                            registered.source(),
                            error,
                        );
                    }
                }
            }
        }

        Ok(DispatchOutcome { response, failures })
    }

    fn record_failure(
        &self,
        failures: &mut Vec<HandlerFailure>,
        envelope: &RequestEnvelope,
        language: &str,
        source: &str,
        error: HandlerError,
    ) {
        warn!(
            target: DISPATCH_TARGET,
            endpoint = %envelope.endpoint,
            language,
            source,
            %error,
            "handler failed, continuing with remaining handlers"
        );
        self.relay.emit(
            "handler-failed",
            serde_json::json!({
                "endpoint": envelope.endpoint,
                "path": envelope.path.display().to_string(),
                "language": language,
                "source": source,
                "error": error.to_string(),
            }),
        );
        failures.push(HandlerFailure {
            source: source.to_owned(),
            language: language.to_owned(),
            error,
        });
    }
}

/// Runs a handler on a worker thread and waits at most `deadline`.
///
/// On timeout the worker keeps running to completion, but its answer has
/// nowhere to go: the channel's receiver is gone, so the late result is
/// discarded — the same fate as a late plugin reply.
fn invoke_with_deadline(
    handler: Arc<dyn Handler>,
    envelope: RequestEnvelope,
    deadline: Duration,
) -> Result<EndpointResponse, HandlerError> {
    let (sender, receiver) = channel();
    thread::spawn(move || {
        let _ = sender.send(handler.handle(&envelope));
    });
    match receiver.recv_timeout(deadline) {
        Ok(result) => result,
        Err(RecvTimeoutError::Timeout) => Err(HandlerError::Timeout {
            timeout_secs: deadline.as_secs(),
        }),
        Err(RecvTimeoutError::Disconnected) => {
            Err(HandlerError::failed("handler panicked before answering"))
        }
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use junction_documents::{ChangeRecord, DocumentStore, IndexBase};

    use crate::project::{MockProjectResolver, OrphanResolver, ResolverLanguageLookup};
    use crate::registry::{CapabilityDescriptor, RegistryBuilder};
    use crate::relay::{EventSink, MemorySink};
    use crate::response::{Fix, ResponseKind};

    use super::*;

    const SHORT: Duration = Duration::from_millis(100);

    struct FixHandler(&'static [&'static str]);

    impl Handler for FixHandler {
        fn handle(&self, _request: &RequestEnvelope) -> Result<EndpointResponse, HandlerError> {
            Ok(EndpointResponse::Fixes {
                items: self
                    .0
                    .iter()
                    .map(|text| Fix {
                        text: (*text).to_owned(),
                        line: 0,
                        column: 0,
                    })
                    .collect(),
            })
        }
    }

    struct FailingHandler;

    impl Handler for FailingHandler {
        fn handle(&self, _request: &RequestEnvelope) -> Result<EndpointResponse, HandlerError> {
            Err(HandlerError::failed("engine rejected the request"))
        }
    }

    struct SlowHandler;

    impl Handler for SlowHandler {
        fn handle(&self, _request: &RequestEnvelope) -> Result<EndpointResponse, HandlerError> {
            thread::sleep(Duration::from_millis(400));
            Ok(EndpointResponse::Fixes { items: Vec::new() })
        }
    }

    struct WrongKindHandler;

    impl Handler for WrongKindHandler {
        fn handle(&self, _request: &RequestEnvelope) -> Result<EndpointResponse, HandlerError> {
            Ok(EndpointResponse::Ack)
        }
    }

    /// Answers with the store's current text for the request path.
    struct StoreEchoHandler(Arc<DocumentStore>);

    impl Handler for StoreEchoHandler {
        fn handle(&self, request: &RequestEnvelope) -> Result<EndpointResponse, HandlerError> {
            Ok(EndpointResponse::Text {
                text: self.0.get(&request.path).map(|snapshot| snapshot.text),
            })
        }
    }

    struct CountingHandler(Arc<AtomicUsize>);

    impl Handler for CountingHandler {
        fn handle(&self, _request: &RequestEnvelope) -> Result<EndpointResponse, HandlerError> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(EndpointResponse::Fixes { items: Vec::new() })
        }
    }

    struct Harness {
        dispatcher: Dispatcher,
        store: Arc<DocumentStore>,
        sink: Arc<MemorySink>,
    }

    fn harness(build: impl FnOnce(&Arc<DocumentStore>, RegistryBuilder) -> RegistryBuilder) -> Harness {
        harness_with_resolver(build, Arc::new(OrphanResolver::new("plaintext")))
    }

    fn harness_with_resolver(
        build: impl FnOnce(&Arc<DocumentStore>, RegistryBuilder) -> RegistryBuilder,
        resolver: Arc<dyn ProjectResolver>,
    ) -> Harness {
        let store = Arc::new(DocumentStore::new(IndexBase::Zero));
        let lookup = Arc::new(ResolverLanguageLookup::new(Arc::clone(&resolver), "plaintext"));
        let pipeline = Arc::new(UpdatePipeline::new(Arc::clone(&store), lookup));

        let builder = RegistryBuilder::new()
            .declare_endpoint("update-buffer", ResponseKind::Ack)
            .expect("declare update-buffer")
            .declare_endpoint("document-text", ResponseKind::Text)
            .expect("declare document-text")
            .declare_endpoint("codecheck", ResponseKind::Fixes)
            .expect("declare codecheck");
        let registry = Arc::new(build(&store, builder).build().expect("registry builds"));

        let relay = Arc::new(EventRelay::new());
        let sink = Arc::new(MemorySink::new());
        relay.attach(Arc::clone(&sink) as Arc<dyn EventSink>);

        let dispatcher = Dispatcher::new(registry, pipeline, resolver, relay)
            .with_default_timeout(Duration::from_secs(5));
        Harness {
            dispatcher,
            store,
            sink,
        }
    }

    fn fix_texts(response: &EndpointResponse) -> Vec<&str> {
        match response {
            EndpointResponse::Fixes { items } => {
                items.iter().map(|fix| fix.text.as_str()).collect()
            }
            other => panic!("expected fixes, got {other:?}"),
        }
    }

    #[test]
    fn a_dispatch_reads_its_own_write() {
        let harness = harness(|store, builder| {
            builder.register(CapabilityDescriptor::new(
                "document-text",
                "plaintext",
                "store-echo",
                Arc::new(StoreEchoHandler(Arc::clone(store))),
            ))
        });

        let edit = RequestEnvelope::new("update-buffer", "/ws/a.cs").with_text("class A{}");
        let outcome = harness.dispatcher.dispatch(&edit).expect("edit dispatch");
        assert_eq!(outcome.response, EndpointResponse::Ack);
        assert!(outcome.failures.is_empty());
        assert_eq!(
            harness.store.get(Path::new("/ws/a.cs")).expect("tracked").text,
            "class A{}"
        );

        let read = RequestEnvelope::new("document-text", "/ws/a.cs");
        let outcome = harness.dispatcher.dispatch(&read).expect("read dispatch");
        assert_eq!(
            outcome.response,
            EndpointResponse::Text {
                text: Some("class A{}".to_owned())
            }
        );
    }

    #[test]
    fn missing_capability_yields_the_empty_response() {
        let harness = harness(|_store, builder| builder);

        let outcome = harness
            .dispatcher
            .dispatch(&RequestEnvelope::new("codecheck", "/ws/a.cs"))
            .expect("dispatch succeeds with no handlers");

        assert_eq!(outcome.response, EndpointResponse::Fixes { items: Vec::new() });
        assert!(outcome.failures.is_empty());
    }

    #[test]
    fn unknown_endpoints_are_rejected() {
        let harness = harness(|_store, builder| builder);
        let error = harness
            .dispatcher
            .dispatch(&RequestEnvelope::new("never-declared", "/ws/a.cs"))
            .expect_err("undeclared endpoint");
        assert!(matches!(error, DispatchError::UnknownEndpoint { .. }));
    }

    #[test]
    fn a_failing_handler_does_not_abort_its_siblings() {
        let harness = harness(|_store, builder| {
            builder
                .register(CapabilityDescriptor::new(
                    "codecheck",
                    "plaintext",
                    "a-first",
                    Arc::new(FixHandler(&["f1"])),
                ))
                .register(CapabilityDescriptor::new(
                    "codecheck",
                    "plaintext",
                    "b-broken",
                    Arc::new(FailingHandler),
                ))
                .register(CapabilityDescriptor::new(
                    "codecheck",
                    "plaintext",
                    "c-last",
                    Arc::new(FixHandler(&["f3"])),
                ))
        });

        let outcome = harness
            .dispatcher
            .dispatch(&RequestEnvelope::new("codecheck", "/ws/a.cs"))
            .expect("dispatch survives the failure");

        assert_eq!(fix_texts(&outcome.response), ["f1", "f3"]);
        assert_eq!(outcome.failures.len(), 1);
        assert_eq!(
            outcome.failures.first().map(|f| f.source.as_str()),
            Some("b-broken")
        );

        let events = harness.sink.frames();
        assert_eq!(events.len(), 1);
        assert_eq!(
            events.first().map(|f| f.event.as_str()),
            Some("handler-failed")
        );
    }

    #[test]
    fn a_timed_out_handler_counts_as_failed() {
        let harness = harness(|_store, builder| {
            builder
                .register(CapabilityDescriptor::new(
                    "codecheck",
                    "plaintext",
                    "fast",
                    Arc::new(FixHandler(&["f1"])),
                ))
                .register(CapabilityDescriptor::new(
                    "codecheck",
                    "plaintext",
                    "slow-plugin",
                    Arc::new(SlowHandler),
                )
                .with_after(vec!["fast".to_owned()]))
        });

        let envelope = RequestEnvelope::new("codecheck", "/ws/a.cs").with_timeout(SHORT);
        let outcome = harness.dispatcher.dispatch(&envelope).expect("dispatch");

        assert_eq!(fix_texts(&outcome.response), ["f1"]);
        assert_eq!(outcome.failures.len(), 1);
        assert!(matches!(
            outcome.failures.first().map(|f| &f.error),
            Some(HandlerError::Timeout { .. })
        ));
        assert!(!harness.sink.frames().is_empty());
    }

    #[test]
    fn mismatched_response_kinds_are_isolated() {
        let harness = harness(|_store, builder| {
            builder.register(CapabilityDescriptor::new(
                "codecheck",
                "plaintext",
                "confused",
                Arc::new(WrongKindHandler),
            ))
        });

        let outcome = harness
            .dispatcher
            .dispatch(&RequestEnvelope::new("codecheck", "/ws/a.cs"))
            .expect("dispatch");

        assert_eq!(outcome.response, EndpointResponse::Fixes { items: Vec::new() });
        assert!(matches!(
            outcome.failures.first().map(|f| &f.error),
            Some(HandlerError::KindMismatch { .. })
        ));
    }

    #[test]
    fn failed_edits_abort_before_any_handler_runs() {
        let invocations = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&invocations);
        let harness = harness(move |_store, builder| {
            builder.register(CapabilityDescriptor::new(
                "codecheck",
                "plaintext",
                "counting",
                Arc::new(CountingHandler(counter)),
            ))
        });

        // Incremental changes against an untracked path cannot commit.
        let envelope = RequestEnvelope::new("codecheck", "/ws/never-opened.cs")
            .with_changes(vec![ChangeRecord::insertion(0, 0, "x")]);
        let error = harness
            .dispatcher
            .dispatch(&envelope)
            .expect_err("edit failure aborts");

        assert!(matches!(error, DispatchError::Update(_)));
        assert_eq!(invocations.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn multi_language_paths_aggregate_across_layers() {
        let mut resolver = MockProjectResolver::new();
        resolver
            .expect_owning_languages()
            .returning(|_| vec!["csharp".to_owned(), "generated-overlay".to_owned()]);

        let harness = harness_with_resolver(
            |_store, builder| {
                builder
                    .register(CapabilityDescriptor::new(
                        "codecheck",
                        "csharp",
                        "engine",
                        Arc::new(FixHandler(&["base"])),
                    ))
                    .register(CapabilityDescriptor::new(
                        "codecheck",
                        "generated-overlay",
                        "overlay",
                        Arc::new(FixHandler(&["overlay"])),
                    ))
            },
            Arc::new(resolver),
        );

        let outcome = harness
            .dispatcher
            .dispatch(&RequestEnvelope::new("codecheck", "/ws/page.cshtml"))
            .expect("dispatch");

        assert_eq!(fix_texts(&outcome.response), ["base", "overlay"]);
    }
}
