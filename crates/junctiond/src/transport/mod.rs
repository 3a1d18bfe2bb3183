//! Socket transport for the daemon.
//!
//! Binds the configured endpoint (Unix domain socket or TCP), accepts
//! connections on a background thread, and hands each accepted stream to a
//! [`ConnectionHandler`] on its own worker thread. The transport knows
//! nothing about the wire protocol; framing and dispatch live in the
//! `dispatch` module.

mod errors;
mod listener;
mod stream;

pub use self::errors::TransportError;
pub(crate) use self::listener::{ListenerHandle, SocketListener};
pub(crate) use self::stream::{ConnectionHandler, ConnectionStream};

const LISTENER_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::transport");
