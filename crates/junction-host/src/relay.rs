//! Fire-and-forget event relay.
//!
//! Components report progress and per-handler failures through the relay;
//! whichever transport is attached receives the frames. This is a
//! best-effort side channel, deliberately the weakest-consistency piece of
//! the system: emitting never blocks, never fails the caller, and frames
//! emitted with no sink attached (or into a failing sink) are dropped after
//! a log line. No correctness invariant may depend on delivery.

use std::sync::{Arc, Mutex};

use serde::Serialize;
use tracing::debug;

/// Tracing target for relay operations.
const RELAY_TARGET: &str = "junction_host::relay";

/// One broadcast frame: an event name and an arbitrary JSON body.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EventFrame {
    /// Event name.
    pub event: String,
    /// Event payload.
    pub body: serde_json::Value,
}

/// Receiving end the relay forwards frames into.
pub trait EventSink: Send + Sync {
    /// Delivers one frame.
    ///
    /// # Errors
    ///
    /// Returns an I/O error when delivery fails; the relay logs and
    /// swallows it.
    fn send(&self, frame: &EventFrame) -> std::io::Result<()>;
}

/// Broadcast point with at most one attached sink.
#[derive(Default)]
pub struct EventRelay {
    sink: Mutex<Option<Arc<dyn EventSink>>>,
}

impl std::fmt::Debug for EventRelay {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let attached = self
            .sink
            .lock()
            .map(|guard| guard.is_some())
            .unwrap_or(false);
        f.debug_struct("EventRelay").field("attached", &attached).finish()
    }
}

impl EventRelay {
    /// Creates a relay with no sink attached.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Attaches a sink, replacing any previous one.
    pub fn attach(&self, sink: Arc<dyn EventSink>) {
        *self.lock() = Some(sink);
    }

    /// Detaches the current sink, if any.
    pub fn detach(&self) {
        *self.lock() = None;
    }

    /// Emits one event.
    ///
    /// Never blocks on the sink's consumer and never reports failure to the
    /// caller. The sink reference is cloned out of the lock before sending,
    /// so a slow sink cannot stall concurrent emitters on the lock either.
    pub fn emit(&self, event: impl Into<String>, body: serde_json::Value) {
        let frame = EventFrame {
            event: event.into(),
            body,
        };
        let sink = self.lock().clone();
        let Some(sink) = sink else {
            debug!(
                target: RELAY_TARGET,
                event = %frame.event,
                "dropping event: no sink attached"
            );
            return;
        };
        if let Err(error) = sink.send(&frame) {
            debug!(
                target: RELAY_TARGET,
                event = %frame.event,
                %error,
                "dropping event: sink failed"
            );
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Option<Arc<dyn EventSink>>> {
        self.sink.lock().unwrap_or_else(|poison| poison.into_inner())
    }
}

/// In-memory sink collecting frames, for tests and tooling.
#[cfg(any(test, feature = "test-support"))]
#[derive(Debug, Default)]
pub struct MemorySink {
    frames: Mutex<Vec<EventFrame>>,
}

#[cfg(any(test, feature = "test-support"))]
impl MemorySink {
    /// Creates an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Frames received so far.
    #[must_use]
    pub fn frames(&self) -> Vec<EventFrame> {
        self.frames
            .lock()
            .map(|guard| guard.clone())
            .unwrap_or_default()
    }
}

#[cfg(any(test, feature = "test-support"))]
impl EventSink for MemorySink {
    fn send(&self, frame: &EventFrame) -> std::io::Result<()> {
        if let Ok(mut frames) = self.frames.lock() {
            frames.push(frame.clone());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FailingSink;

    impl EventSink for FailingSink {
        fn send(&self, _frame: &EventFrame) -> std::io::Result<()> {
            Err(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "listener went away",
            ))
        }
    }

    #[test]
    fn emit_without_a_sink_is_a_quiet_no_op() {
        let relay = EventRelay::new();
        relay.emit("restore-started", serde_json::json!({"project": "app"}));
    }

    #[test]
    fn attached_sink_receives_frames() {
        let relay = EventRelay::new();
        let sink = Arc::new(MemorySink::new());
        relay.attach(Arc::clone(&sink) as Arc<dyn EventSink>);

        relay.emit("diagnostics-ready", serde_json::json!({"path": "/ws/a.cs"}));

        let frames = sink.frames();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames.first().map(|f| f.event.as_str()), Some("diagnostics-ready"));
    }

    #[test]
    fn sink_failures_never_reach_the_caller() {
        let relay = EventRelay::new();
        relay.attach(Arc::new(FailingSink));
        relay.emit("handler-failed", serde_json::Value::Null);
    }

    #[test]
    fn detach_stops_delivery() {
        let relay = EventRelay::new();
        let sink = Arc::new(MemorySink::new());
        relay.attach(Arc::clone(&sink) as Arc<dyn EventSink>);
        relay.detach();

        relay.emit("ignored", serde_json::Value::Null);
        assert!(sink.frames().is_empty());
    }
}
