//! Handler contract for endpoint implementations.

use thiserror::Error;

use junction_plugins::PluginError;

use crate::envelope::RequestEnvelope;
use crate::response::EndpointResponse;

/// A unit implementing one endpoint for one language.
///
/// Handlers are registered for exactly one (endpoint, language) pair during
/// startup composition and must answer with the response variant matching
/// the endpoint's declared kind. A handler may block; the dispatcher runs it
/// under a deadline and isolates its failures from sibling handlers.
pub trait Handler: Send + Sync {
    /// Handles one request.
    ///
    /// # Errors
    ///
    /// Returns [`HandlerError`] when the request cannot be answered; the
    /// dispatcher records the failure and continues with the remaining
    /// handlers.
    fn handle(&self, request: &RequestEnvelope) -> Result<EndpointResponse, HandlerError>;
}

/// Failure of a single handler invocation.
///
/// These are isolated at the dispatcher: a failing handler contributes an
/// error record to the aggregate outcome instead of aborting the dispatch.
#[derive(Debug, Error)]
pub enum HandlerError {
    /// The handler reported a failure.
    #[error("handler failed: {message}")]
    Failed {
        /// Human-readable failure description.
        message: String,
    },

    /// The handler did not answer within the caller's deadline.
    ///
    /// The dispatcher stops waiting but does not interrupt the handler; a
    /// late answer is discarded.
    #[error("handler exceeded its {timeout_secs}s deadline")]
    Timeout {
        /// Deadline that elapsed, in seconds.
        timeout_secs: u64,
    },

    /// The handler answered with a response of the wrong kind.
    #[error("handler returned a {actual:?} response for a {expected:?} endpoint")]
    KindMismatch {
        /// Kind the endpoint was declared with.
        expected: crate::response::ResponseKind,
        /// Kind the handler actually returned.
        actual: crate::response::ResponseKind,
    },

    /// An out-of-process handler failed.
    #[error(transparent)]
    Plugin(#[from] PluginError),
}

impl HandlerError {
    /// Creates a generic handler failure.
    #[must_use]
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed {
            message: message.into(),
        }
    }
}
