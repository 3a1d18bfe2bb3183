//! Request routing core for the junction daemon.
//!
//! This crate owns the path from a decoded request to an aggregate
//! response:
//!
//! 1. The [`CapabilityRegistry`] — built once at startup from an explicit
//!    descriptor table, immutable afterwards — maps each
//!    (endpoint, language) pair to an ordered handler list.
//! 2. The [`Dispatcher`] resolves the owning languages for the request's
//!    target path, commits any edit payload through the buffer update
//!    pipeline first, invokes the matching handlers with per-handler
//!    failure isolation and deadlines, and folds their responses with the
//!    per-kind merge rule.
//! 3. The [`EventRelay`] carries fire-and-forget progress and error
//!    notifications to whichever transport is attached, without ever
//!    blocking a dispatch.
//!
//! Nothing in here knows how to parse a language or compute a diagnostic;
//! handlers — in-process or behind a plugin connection — supply the
//! semantics.

mod dispatcher;
mod envelope;
mod handler;
mod plugin_handler;
mod project;
mod registry;
mod relay;
mod response;

pub use dispatcher::{DispatchError, DispatchOutcome, Dispatcher, HandlerFailure};
pub use envelope::{Position, RequestEnvelope};
pub use handler::{Handler, HandlerError};
pub use plugin_handler::PluginHandle;
pub use project::{OrphanResolver, ProjectResolver, ResolverLanguageLookup};
pub use registry::{
    CapabilityDescriptor, CapabilityRegistry, RegisteredHandler, RegistryBuilder, RegistryError,
};
pub use relay::{EventFrame, EventRelay, EventSink};
pub use response::{EndpointResponse, Fix, Location, ResponseKind};

#[cfg(any(test, feature = "test-support"))]
pub use relay::MemorySink;
