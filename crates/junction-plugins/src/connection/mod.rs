//! Persistent plugin process ownership and request/reply exchange.
//!
//! A [`PluginConnection`] owns one child process through an explicit
//! lifecycle: `start` spawns it and a reader thread, `call` performs
//! sequence-correlated request/reply exchanges, and `shutdown` closes stdin,
//! waits for exit, and kills the process only if it lingers. `Drop` is a
//! last resort that kills a process the owner forgot to shut down.
//!
//! Stdin is a single-writer resource guarded by a lock held only for the
//! duration of the write; the wait for the reply happens outside any lock,
//! so a slow plugin call never blocks other callers from writing.

use std::io::{BufRead, BufReader, Write};
use std::process::{Child, ChildStdin, Command, Stdio};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{debug, warn};

use crate::error::PluginError;
use crate::manifest::PluginManifest;
use crate::protocol::{WireRequest, WireResponse};
use crate::router::{ReplyRouter, WaitOutcome};

/// Tracing target for connection operations.
const CONNECTION_TARGET: &str = "junction_plugins::connection";

/// Grace period between closing stdin and killing a lingering process.
const EXIT_GRACE: Duration = Duration::from_millis(200);

/// Lifecycle state of the owned child process.
#[derive(Debug)]
enum ProcessState {
    /// The child is (as far as we know) alive.
    Running(Child),
    /// The child has been shut down or reaped.
    Stopped,
}

/// A live connection to one plugin process.
#[derive(Debug)]
pub struct PluginConnection {
    name: String,
    state: Mutex<ProcessState>,
    writer: Mutex<Option<ChildStdin>>,
    router: Arc<ReplyRouter>,
    reader: Mutex<Option<JoinHandle<()>>>,
    next_seq: AtomicU64,
    disabled: AtomicBool,
}

impl PluginConnection {
    /// Spawns the plugin described by `manifest` and starts its reader.
    ///
    /// # Errors
    ///
    /// Returns [`PluginError::SpawnFailed`] when the process cannot be
    /// started or its standard streams cannot be captured.
    pub fn start(manifest: &PluginManifest) -> Result<Self, PluginError> {
        let name = manifest.name().to_owned();

        debug!(
            target: CONNECTION_TARGET,
            plugin = %name,
            executable = %manifest.executable().display(),
            "spawning plugin process"
        );

        let mut child = Command::new(manifest.executable())
            .args(manifest.args())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|source| PluginError::SpawnFailed {
                name: name.clone(),
                message: format!("failed to start {}", manifest.executable().display()),
                source: Some(Arc::new(source)),
            })?;

        let stdin = child.stdin.take().ok_or_else(|| PluginError::SpawnFailed {
            name: name.clone(),
            message: String::from("failed to capture stdin"),
            source: None,
        })?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| PluginError::SpawnFailed {
                name: name.clone(),
                message: String::from("failed to capture stdout"),
                source: None,
            })?;

        let router = Arc::new(ReplyRouter::new());
        let disabled = AtomicBool::new(false);

        let reader = spawn_reader(name.clone(), stdout, Arc::clone(&router));

        debug!(
            target: CONNECTION_TARGET,
            plugin = %name,
            pid = child.id(),
            "plugin process running"
        );

        Ok(Self {
            name,
            state: Mutex::new(ProcessState::Running(child)),
            writer: Mutex::new(Some(stdin)),
            router,
            reader: Mutex::new(Some(reader)),
            next_seq: AtomicU64::new(0),
            disabled,
        })
    }

    /// Plugin name this connection serves.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether the connection still accepts calls.
    ///
    /// A connection becomes unavailable when its process dies, its stream
    /// produces EOF, or it is explicitly shut down; it stays unavailable
    /// until a new connection is started in its place.
    #[must_use]
    pub fn is_available(&self) -> bool {
        !self.disabled.load(Ordering::SeqCst)
    }

    /// Performs one request/reply exchange.
    ///
    /// Assigns the next sequence number, registers a waiter, writes the
    /// request line under the stdin lock, and waits — outside any lock —
    /// for the reply addressed to that sequence number. Replies to other
    /// in-flight calls are never observed here; correlation, not stream
    /// order, decides who gets what.
    ///
    /// # Errors
    ///
    /// Returns [`PluginError::Unavailable`] when the connection is dead,
    /// [`PluginError::Timeout`] when no reply arrives in time (the reply, if
    /// it ever comes, is discarded), [`PluginError::Rejected`] when the
    /// plugin answers with `success: false`, and [`PluginError::Io`] when
    /// the request cannot be written.
    pub fn call(
        &self,
        command: &str,
        arguments: serde_json::Value,
        timeout: Duration,
    ) -> Result<WireResponse, PluginError> {
        if !self.is_available() {
            return Err(PluginError::Unavailable {
                name: self.name.clone(),
            });
        }

        let seq = self.next_seq.fetch_add(1, Ordering::SeqCst) + 1;
        let request = WireRequest::new(seq, command, arguments);
        let line = request.to_line()?;

        let Some(waiter) = self.router.register(seq) else {
            return Err(PluginError::Unavailable {
                name: self.name.clone(),
            });
        };

        {
            let mut writer = lock(&self.writer);
            let Some(stdin) = writer.as_mut() else {
                self.router.forget(seq);
                return Err(PluginError::Unavailable {
                    name: self.name.clone(),
                });
            };
            if let Err(source) = stdin.write_all(line.as_bytes()).and_then(|()| stdin.flush()) {
                self.router.forget(seq);
                self.disabled.store(true, Ordering::SeqCst);
                return Err(PluginError::io(self.name.clone(), source));
            }
        }

        debug!(
            target: CONNECTION_TARGET,
            plugin = %self.name,
            seq,
            command,
            "request written, awaiting reply"
        );

        match waiter.wait(timeout) {
            WaitOutcome::Reply(response) => {
                if response.is_success() {
                    Ok(response)
                } else {
                    Err(PluginError::Rejected {
                        name: self.name.clone(),
                        message: response
                            .message()
                            .unwrap_or("request failed without a message")
                            .to_owned(),
                    })
                }
            }
            WaitOutcome::TimedOut => {
                self.router.forget(seq);
                Err(PluginError::Timeout {
                    name: self.name.clone(),
                    seq,
                    timeout_secs: timeout.as_secs(),
                })
            }
            WaitOutcome::Closed => {
                self.disabled.store(true, Ordering::SeqCst);
                Err(PluginError::Unavailable {
                    name: self.name.clone(),
                })
            }
        }
    }

    /// Shuts the plugin down: closes stdin, fails outstanding calls, waits
    /// briefly for a clean exit, and kills the process only if it lingers.
    pub fn shutdown(&self) {
        debug!(
            target: CONNECTION_TARGET,
            plugin = %self.name,
            "shutting down plugin connection"
        );

        self.disabled.store(true, Ordering::SeqCst);
        // Dropping stdin closes the pipe, which well-behaved plugins treat
        // as the end of input.
        lock(&self.writer).take();
        self.router.close();

        let mut state = lock(&self.state);
        if let ProcessState::Running(mut child) = std::mem::replace(&mut *state, ProcessState::Stopped)
        {
            wait_or_kill(&self.name, &mut child);
        }
        drop(state);

        if let Some(handle) = lock(&self.reader).take() {
            let _ = handle.join();
        }
    }
}

impl Drop for PluginConnection {
    fn drop(&mut self) {
        let mut state = lock(&self.state);
        if let ProcessState::Running(mut child) = std::mem::replace(&mut *state, ProcessState::Stopped)
        {
            if let Err(error) = child.kill() {
                warn!(
                    target: CONNECTION_TARGET,
                    plugin = %self.name,
                    %error,
                    "failed to kill plugin process on drop"
                );
            } else {
                let _ = child.wait();
            }
        }
    }
}

/// Spawns the reader thread that demultiplexes reply lines.
fn spawn_reader(
    name: String,
    stdout: std::process::ChildStdout,
    router: Arc<ReplyRouter>,
) -> JoinHandle<()> {
    thread::spawn(move || {
        let reader = BufReader::new(stdout);
        for line in reader.lines() {
            let line = match line {
                Ok(line) => line,
                Err(error) => {
                    warn!(
                        target: CONNECTION_TARGET,
                        plugin = %name,
                        %error,
                        "plugin stream read failed"
                    );
                    break;
                }
            };
            if line.trim().is_empty() {
                continue;
            }
            match WireResponse::from_line(&line) {
                Ok(response) => router.deliver(response),
                Err(error) => {
                    warn!(
                        target: CONNECTION_TARGET,
                        plugin = %name,
                        %error,
                        "discarding unparseable plugin output line"
                    );
                }
            }
        }
        debug!(
            target: CONNECTION_TARGET,
            plugin = %name,
            "plugin stream ended, failing in-flight calls"
        );
        router.close();
    })
}

/// Waits briefly for the child to exit, killing it if it does not.
fn wait_or_kill(name: &str, child: &mut Child) {
    match child.try_wait() {
        Ok(Some(status)) => {
            debug!(
                target: CONNECTION_TARGET,
                plugin = %name,
                ?status,
                "plugin process exited"
            );
        }
        Ok(None) => {
            thread::sleep(EXIT_GRACE);
            match child.try_wait() {
                Ok(Some(status)) => {
                    debug!(
                        target: CONNECTION_TARGET,
                        plugin = %name,
                        ?status,
                        "plugin process exited during grace period"
                    );
                }
                Ok(None) | Err(_) => {
                    let _ = child.kill();
                    let _ = child.wait();
                }
            }
        }
        Err(error) => {
            warn!(
                target: CONNECTION_TARGET,
                plugin = %name,
                %error,
                "failed to query plugin process status, killing"
            );
            let _ = child.kill();
            let _ = child.wait();
        }
    }
}

/// Locks a mutex, recovering from poisoning.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poison| poison.into_inner())
}
