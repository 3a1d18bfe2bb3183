//! Bootstrap and transport for the junction daemon.
//!
//! `junctiond` wires the routing core to the outside world: it loads
//! configuration, installs structured telemetry, composes the capability
//! registry from the built-in endpoint table and the configured plugins,
//! binds the configured socket, and hands each accepted connection to the
//! JSONL dispatch handler.
//!
//! The daemon is deliberately thin. All routing, document-state, and
//! aggregation behaviour lives in `junction-host` and friends; this crate
//! only decodes wire requests into envelopes and encodes outcomes back into
//! response frames.

mod bootstrap;
mod builtins;
mod composition;
mod dispatch;
pub mod telemetry;
mod transport;

pub use bootstrap::{
    BootstrapError, ConfigLoader, Daemon, StaticConfigLoader, SystemConfigLoader, bootstrap,
    bootstrap_with,
};
pub use telemetry::{TelemetryError, TelemetryHandle};
pub use transport::TransportError;

#[cfg(test)]
mod tests;
