//! Response frame encoding and the per-connection event sink.

use std::io::Write;
use std::sync::{Mutex, MutexGuard};

use serde::Serialize;

use junction_host::{DispatchOutcome, EndpointResponse, EventFrame, EventSink, HandlerFailure};

use crate::transport::ConnectionStream;

use super::errors::ProtocolError;

/// One isolated handler failure, encoded for the client.
#[derive(Debug, Serialize)]
pub(crate) struct FailureReport {
    /// Registration source of the failing handler.
    source: String,
    /// Language the handler was resolved for.
    language: String,
    /// Failure description.
    error: String,
}

impl From<&HandlerFailure> for FailureReport {
    fn from(failure: &HandlerFailure) -> Self {
        Self {
            source: failure.source.clone(),
            language: failure.language.clone(),
            error: failure.error.to_string(),
        }
    }
}

/// Frames written back to the client, one JSONL line each.
#[derive(Debug, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub(crate) enum ClientFrame {
    /// Relayed fire-and-forget event.
    Event {
        /// Event name.
        event: String,
        /// Event payload.
        body: serde_json::Value,
    },
    /// Terminal frame carrying the aggregate response.
    Result {
        /// Merged endpoint response.
        body: EndpointResponse,
        /// Isolated handler failures, possibly empty.
        errors: Vec<FailureReport>,
    },
    /// Terminal frame for requests that could not be dispatched.
    Error {
        /// Failure description.
        message: String,
    },
}

/// Serialises frames onto one connection, one line at a time.
///
/// The stream lock makes each line atomic, so relayed events emitted by
/// concurrent dispatches cannot tear the terminal frame.
pub(crate) struct LineSink {
    stream: Mutex<ConnectionStream>,
}

impl LineSink {
    /// Wraps a connection stream.
    pub(crate) fn new(stream: ConnectionStream) -> Self {
        Self {
            stream: Mutex::new(stream),
        }
    }

    /// Writes one frame as a JSONL line and flushes.
    pub(crate) fn write_frame(&self, frame: &ClientFrame) -> Result<(), ProtocolError> {
        let mut line = serde_json::to_vec(frame).map_err(ProtocolError::EncodeFrame)?;
        line.push(b'\n');
        let mut stream = self.lock();
        stream.write_all(&line)?;
        stream.flush()?;
        Ok(())
    }

    /// Writes the terminal result frame for a dispatch outcome.
    pub(crate) fn write_result(&self, outcome: &DispatchOutcome) -> Result<(), ProtocolError> {
        self.write_frame(&ClientFrame::Result {
            body: outcome.response.clone(),
            errors: outcome.failures.iter().map(FailureReport::from).collect(),
        })
    }

    /// Writes the terminal error frame.
    pub(crate) fn write_error(&self, message: impl Into<String>) -> Result<(), ProtocolError> {
        self.write_frame(&ClientFrame::Error {
            message: message.into(),
        })
    }

    fn lock(&self) -> MutexGuard<'_, ConnectionStream> {
        self.stream.lock().unwrap_or_else(|poison| poison.into_inner())
    }
}

impl EventSink for LineSink {
    fn send(&self, frame: &EventFrame) -> std::io::Result<()> {
        self.write_frame(&ClientFrame::Event {
            event: frame.event.clone(),
            body: frame.body.clone(),
        })
        .map_err(std::io::Error::other)
    }
}
