//! JSONL wire protocol and per-connection dispatch.
//!
//! Clients send one request line per connection:
//!
//! ```json
//! {"endpoint":"codecheck","path":"/ws/a.cs","line":3,"column":7}
//! ```
//!
//! The daemon answers with zero or more event frames followed by a single
//! terminal frame:
//!
//! ```json
//! {"kind":"event","event":"handler-failed","body":{...}}
//! {"kind":"result","body":{"kind":"fixes","items":[]},"errors":[]}
//! ```
//!
//! Requests that cannot be parsed or dispatched terminate with an error
//! frame instead:
//!
//! ```json
//! {"kind":"error","message":"malformed request: ..."}
//! ```

mod errors;
mod handler;
mod request;
mod response;

pub(crate) use self::handler::DispatchConnectionHandler;

/// Tracing target for wire dispatch.
pub(crate) const DISPATCH_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::dispatch");
