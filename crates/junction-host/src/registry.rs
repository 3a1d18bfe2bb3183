//! Startup-built capability registry.
//!
//! The registry is the single table answering "who handles endpoint E for
//! language L, and in what order". It is produced by folding an explicit
//! list of [`CapabilityDescriptor`]s — no runtime discovery, no reflection —
//! and is immutable for the lifetime of the process once built, so requests
//! can resolve handlers without locking and aggregate responses are
//! reproducible across runs.
//!
//! Ordering within one (endpoint, language) bucket is topological over the
//! descriptors' `after` constraints, with ties broken by source name. A
//! cycle in the constraints is a composition bug and fails startup.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use thiserror::Error;
use tracing::debug;

use crate::handler::Handler;
use crate::response::ResponseKind;

/// Tracing target for registry composition.
const REGISTRY_TARGET: &str = "junction_host::registry";

/// One capability offered by a registration source.
pub struct CapabilityDescriptor {
    endpoint: String,
    language: String,
    source: String,
    after: Vec<String>,
    handler: Arc<dyn Handler>,
}

impl CapabilityDescriptor {
    /// Creates a descriptor registering `handler` for one
    /// (endpoint, language) pair under the given source name.
    #[must_use]
    pub fn new(
        endpoint: impl Into<String>,
        language: impl Into<String>,
        source: impl Into<String>,
        handler: Arc<dyn Handler>,
    ) -> Self {
        Self {
            endpoint: endpoint.into(),
            language: language.into(),
            source: source.into(),
            after: Vec::new(),
            handler,
        }
    }

    /// Declares sources this capability must run after.
    #[must_use]
    pub fn with_after(mut self, after: Vec<String>) -> Self {
        self.after = after;
        self
    }
}

impl std::fmt::Debug for CapabilityDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CapabilityDescriptor")
            .field("endpoint", &self.endpoint)
            .field("language", &self.language)
            .field("source", &self.source)
            .field("after", &self.after)
            .finish_non_exhaustive()
    }
}

/// Errors raised during registry composition. All are startup-fatal.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// The `after` constraints within one bucket form a cycle.
    #[error(
        "invalid capability graph for ({endpoint}, {language}): ordering cycle through '{source_name}'"
    )]
    InvalidCapabilityGraph {
        /// Endpoint of the cyclic bucket.
        endpoint: String,
        /// Language of the cyclic bucket.
        language: String,
        /// One source participating in the cycle.
        source_name: String,
    },

    /// A descriptor registers an endpoint that was never declared.
    #[error("source '{source_name}' registers unknown endpoint '{endpoint}'")]
    UnknownEndpoint {
        /// Undeclared endpoint name.
        endpoint: String,
        /// Source that referenced it.
        source_name: String,
    },

    /// An endpoint was declared twice.
    #[error("endpoint '{endpoint}' is already declared")]
    DuplicateEndpoint {
        /// Endpoint name declared twice.
        endpoint: String,
    },

    /// Two descriptors share a source name within one bucket.
    #[error("source '{source_name}' is already registered for ({endpoint}, {language})")]
    DuplicateSource {
        /// Endpoint of the bucket.
        endpoint: String,
        /// Language of the bucket.
        language: String,
        /// Source name registered twice.
        source_name: String,
    },
}

/// A handler with its registration source name.
#[derive(Clone)]
pub struct RegisteredHandler {
    source: String,
    handler: Arc<dyn Handler>,
}

impl RegisteredHandler {
    /// Registration source name (stable ordering key).
    #[must_use]
    pub fn source(&self) -> &str {
        &self.source
    }

    /// The handler itself.
    #[must_use]
    pub fn handler(&self) -> &Arc<dyn Handler> {
        &self.handler
    }
}

impl std::fmt::Debug for RegisteredHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegisteredHandler")
            .field("source", &self.source)
            .finish_non_exhaustive()
    }
}

/// Builder folding descriptors into an immutable [`CapabilityRegistry`].
#[derive(Debug, Default)]
pub struct RegistryBuilder {
    endpoints: BTreeMap<String, ResponseKind>,
    descriptors: Vec<CapabilityDescriptor>,
}

impl RegistryBuilder {
    /// Creates an empty builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Declares an endpoint and its response kind.
    ///
    /// The endpoint table is the closed mapping from endpoint name to
    /// response type; it is fixed here and never negotiated per call.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::DuplicateEndpoint`] when the name was
    /// already declared.
    pub fn declare_endpoint(
        mut self,
        endpoint: impl Into<String>,
        kind: ResponseKind,
    ) -> Result<Self, RegistryError> {
        let endpoint = normalise(&endpoint.into());
        if self.endpoints.contains_key(&endpoint) {
            return Err(RegistryError::DuplicateEndpoint { endpoint });
        }
        self.endpoints.insert(endpoint, kind);
        Ok(self)
    }

    /// Adds a capability descriptor. Validation happens in [`Self::build`].
    #[must_use]
    pub fn register(mut self, descriptor: CapabilityDescriptor) -> Self {
        self.descriptors.push(descriptor);
        self
    }

    /// Builds the immutable registry.
    ///
    /// # Errors
    ///
    /// Returns a [`RegistryError`] when a descriptor references an
    /// undeclared endpoint, a source name collides within a bucket, or the
    /// `after` constraints contain a cycle.
    pub fn build(self) -> Result<CapabilityRegistry, RegistryError> {
        let mut buckets: BTreeMap<(String, String), Vec<CapabilityDescriptor>> = BTreeMap::new();

        for descriptor in self.descriptors {
            let endpoint = normalise(&descriptor.endpoint);
            if !self.endpoints.contains_key(&endpoint) {
                return Err(RegistryError::UnknownEndpoint {
                    endpoint,
                    source_name: descriptor.source,
                });
            }
            let language = normalise(&descriptor.language);
            buckets.entry((endpoint, language)).or_default().push(descriptor);
        }

        let mut handlers = HashMap::new();
        for ((endpoint, language), bucket) in buckets {
            let ordered = order_bucket(&endpoint, &language, bucket)?;
            debug!(
                target: REGISTRY_TARGET,
                endpoint = %endpoint,
                language = %language,
                sources = ?ordered.iter().map(RegisteredHandler::source).collect::<Vec<_>>(),
                "capability bucket composed"
            );
            handlers.insert((endpoint, language), ordered);
        }

        Ok(CapabilityRegistry {
            endpoints: self.endpoints,
            handlers,
        })
    }
}

/// Orders one bucket topologically, tie-breaking by source name.
fn order_bucket(
    endpoint: &str,
    language: &str,
    bucket: Vec<CapabilityDescriptor>,
) -> Result<Vec<RegisteredHandler>, RegistryError> {
    let mut by_source: BTreeMap<String, CapabilityDescriptor> = BTreeMap::new();
    for descriptor in bucket {
        let source = descriptor.source.clone();
        if by_source.insert(source.clone(), descriptor).is_some() {
            return Err(RegistryError::DuplicateSource {
                endpoint: endpoint.to_owned(),
                language: language.to_owned(),
                source_name: source,
            });
        }
    }

    // Kahn's algorithm with a BTreeSet ready queue: popping the smallest
    // ready source makes the order deterministic across runs.
    let mut indegree: BTreeMap<String, usize> =
        by_source.keys().map(|source| (source.clone(), 0)).collect();
    let mut successors: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for (source, descriptor) in &by_source {
        for dependency in &descriptor.after {
            if !by_source.contains_key(dependency) {
                // Constraints on absent sources are inert, not errors: a
                // disabled plugin must not invalidate everyone ordered
                // after it.
                continue;
            }
            if let Some(count) = indegree.get_mut(source) {
                *count += 1;
            }
            successors
                .entry(dependency.clone())
                .or_default()
                .push(source.clone());
        }
    }

    let mut ready: BTreeSet<String> = indegree
        .iter()
        .filter(|(_, count)| **count == 0)
        .map(|(source, _)| source.clone())
        .collect();
    let mut ordered_sources: Vec<String> = Vec::with_capacity(by_source.len());

    while let Some(source) = ready.iter().next().cloned() {
        ready.remove(&source);
        for successor in successors.remove(&source).unwrap_or_default() {
            if let Some(count) = indegree.get_mut(&successor) {
                *count -= 1;
                if *count == 0 {
                    ready.insert(successor);
                }
            }
        }
        ordered_sources.push(source);
    }

    if ordered_sources.len() < by_source.len() {
        let stuck = by_source
            .keys()
            .find(|source| !ordered_sources.contains(*source))
            .cloned()
            .unwrap_or_default();
        return Err(RegistryError::InvalidCapabilityGraph {
            endpoint: endpoint.to_owned(),
            language: language.to_owned(),
            source_name: stuck,
        });
    }

    let mut by_source = by_source;
    Ok(ordered_sources
        .into_iter()
        .filter_map(|source| {
            by_source.remove(&source).map(|descriptor| RegisteredHandler {
                source,
                handler: descriptor.handler,
            })
        })
        .collect())
}

/// Immutable (endpoint, language) → ordered handler table.
#[derive(Debug)]
pub struct CapabilityRegistry {
    endpoints: BTreeMap<String, ResponseKind>,
    handlers: HashMap<(String, String), Vec<RegisteredHandler>>,
}

impl CapabilityRegistry {
    /// Ordered handlers for an (endpoint, language) pair.
    ///
    /// An empty slice is a valid answer: no handler serves the combination.
    #[must_use]
    pub fn resolve(&self, endpoint: &str, language: &str) -> &[RegisteredHandler] {
        let key = (normalise(endpoint), normalise(language));
        match self.handlers.get(&key) {
            Some(handlers) => handlers,
            None => &[],
        }
    }

    /// Response kind the endpoint was declared with.
    #[must_use]
    pub fn response_kind(&self, endpoint: &str) -> Option<ResponseKind> {
        self.endpoints.get(&normalise(endpoint)).copied()
    }

    /// Declared endpoints in name order.
    pub fn endpoints(&self) -> impl Iterator<Item = (&str, ResponseKind)> {
        self.endpoints.iter().map(|(name, kind)| (name.as_str(), *kind))
    }

    /// Total number of registered handlers, for introspection.
    #[must_use]
    pub fn handler_count(&self) -> usize {
        self.handlers.values().map(Vec::len).sum()
    }
}

fn normalise(key: &str) -> String {
    key.trim().to_lowercase()
}
