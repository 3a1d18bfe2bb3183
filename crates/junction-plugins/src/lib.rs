//! Out-of-process handler support for the junction daemon.
//!
//! A plugin is a long-lived child process that implements one or more
//! endpoints for one or more languages. The daemon owns the process through
//! an explicit lifecycle — start, request/reply loop, explicit shutdown —
//! and talks to it over a single newline-delimited JSON stream on standard
//! I/O.
//!
//! Because several dispatches may be in flight against the same plugin at
//! once, the stream is multiplexed: every request carries a caller-assigned,
//! monotonically increasing sequence number, and a dedicated reader thread
//! routes each reply to the waiter registered for its `request_seq`. The
//! transport's byte order is irrelevant to correctness; the sequence number
//! is the correlation mechanism.
//!
//! # Example
//!
//! ```rust,no_run
//! use junction_plugins::{PluginConnection, PluginManifest};
//! use std::path::PathBuf;
//! use std::time::Duration;
//!
//! let manifest = PluginManifest::new(
//!     "csharp-fixes",
//!     "1.0.0",
//!     PathBuf::from("/usr/lib/junction/csharp-fixes"),
//!     vec!["csharp".into()],
//!     vec!["codecheck".into()],
//! );
//!
//! let connection = PluginConnection::start(&manifest).expect("plugin starts");
//! let reply = connection.call(
//!     "codecheck",
//!     serde_json::json!({"path": "/ws/a.cs"}),
//!     Duration::from_secs(5),
//! );
//! ```

pub mod connection;
pub mod error;
pub mod manifest;
pub mod protocol;
pub mod registry;
pub(crate) mod router;

pub use self::connection::PluginConnection;
pub use self::error::PluginError;
pub use self::manifest::PluginManifest;
pub use self::protocol::{WireRequest, WireResponse};
pub use self::registry::PluginRegistry;
