//! Sequence-number reply correlation.
//!
//! Concurrent callers multiplex onto one plugin stream. Each caller
//! registers a waiter for its sequence number before writing the request;
//! the connection's reader thread delivers every parsed reply to the waiter
//! holding its `request_seq`. Replies for abandoned sequence numbers (the
//! caller timed out and forgot its waiter) are discarded, and a dead stream
//! fails every outstanding waiter at once.

use std::collections::HashMap;
use std::sync::mpsc::{Receiver, RecvTimeoutError, Sender, channel};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use tracing::debug;

use crate::protocol::WireResponse;

/// Tracing target for reply routing.
const ROUTER_TARGET: &str = "junction_plugins::router";

/// Outcome of waiting on a registered sequence number.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum WaitOutcome {
    /// The reply for this sequence number arrived.
    Reply(WireResponse),
    /// The deadline elapsed with no reply.
    TimedOut,
    /// The stream died; no reply will ever arrive.
    Closed,
}

/// One caller's pending slot in the router.
#[derive(Debug)]
pub(crate) struct Waiter {
    receiver: Receiver<WireResponse>,
}

impl Waiter {
    /// Blocks until the reply arrives, the deadline elapses, or the stream
    /// dies.
    pub(crate) fn wait(&self, timeout: Duration) -> WaitOutcome {
        match self.receiver.recv_timeout(timeout) {
            Ok(response) => WaitOutcome::Reply(response),
            Err(RecvTimeoutError::Timeout) => WaitOutcome::TimedOut,
            Err(RecvTimeoutError::Disconnected) => WaitOutcome::Closed,
        }
    }
}

#[derive(Debug, Default)]
struct Pending {
    waiters: HashMap<u64, Sender<WireResponse>>,
    closed: bool,
}

/// Table of outstanding calls keyed by sequence number.
#[derive(Debug, Default)]
pub(crate) struct ReplyRouter {
    pending: Mutex<Pending>,
}

impl ReplyRouter {
    /// Creates an empty router.
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Registers a waiter for `seq`.
    ///
    /// Returns `None` when the stream has already died; callers translate
    /// that into an unavailability error without writing anything.
    pub(crate) fn register(&self, seq: u64) -> Option<Waiter> {
        let mut pending = self.lock();
        if pending.closed {
            return None;
        }
        let (sender, receiver) = channel();
        pending.waiters.insert(seq, sender);
        Some(Waiter { receiver })
    }

    /// Delivers a reply to the waiter registered for its sequence number.
    ///
    /// Replies without a pending waiter are discarded; this is how late
    /// replies to timed-out calls disappear.
    pub(crate) fn deliver(&self, response: WireResponse) {
        let seq = response.request_seq();
        let sender = self.lock().waiters.remove(&seq);
        match sender {
            Some(sender) => {
                // The waiter may have raced its own removal; a failed send
                // is equivalent to a discarded late reply.
                let _ = sender.send(response);
            }
            None => {
                debug!(
                    target: ROUTER_TARGET,
                    seq,
                    "discarding reply with no pending waiter"
                );
            }
        }
    }

    /// Drops the waiter for `seq`, discarding any reply that arrives later.
    pub(crate) fn forget(&self, seq: u64) {
        self.lock().waiters.remove(&seq);
    }

    /// Fails every outstanding waiter and refuses new registrations.
    pub(crate) fn close(&self) {
        let mut pending = self.lock();
        pending.closed = true;
        // Dropping the senders disconnects every receiver, which waiters
        // observe as `Closed`.
        pending.waiters.clear();
    }

    /// Number of outstanding waiters.
    #[cfg(test)]
    pub(crate) fn pending_count(&self) -> usize {
        self.lock().waiters.len()
    }

    fn lock(&self) -> MutexGuard<'_, Pending> {
        self.pending
            .lock()
            .unwrap_or_else(|poison| poison.into_inner())
    }
}
