//! Connection handler decoding wire requests into dispatcher envelopes.

use std::io::{self, Read};
use std::sync::Arc;

use tracing::{debug, warn};

use junction_host::Dispatcher;

use crate::transport::{ConnectionHandler, ConnectionStream};

use super::DISPATCH_TARGET;
use super::errors::ProtocolError;
use super::request::WireCommand;
use super::response::LineSink;

/// Maximum size of a single request line in bytes.
///
/// Sized for full-buffer update payloads, which dwarf every other request.
pub(crate) const MAX_REQUEST_BYTES: usize = 1024 * 1024;

/// Per-connection handler: one request line in, one response stream out.
pub(crate) struct DispatchConnectionHandler {
    dispatcher: Arc<Dispatcher>,
}

impl std::fmt::Debug for DispatchConnectionHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DispatchConnectionHandler").finish_non_exhaustive()
    }
}

impl DispatchConnectionHandler {
    /// Creates a handler over the composed dispatcher.
    pub(crate) fn new(dispatcher: Arc<Dispatcher>) -> Self {
        Self { dispatcher }
    }

    fn serve(&self, mut stream: ConnectionStream) {
        let request_bytes = match read_request_line(&mut stream) {
            Ok(Some(bytes)) => bytes,
            Ok(None) => {
                debug!(target: DISPATCH_TARGET, "client disconnected without a request");
                return;
            }
            Err(error) => {
                warn!(target: DISPATCH_TARGET, %error, "failed to read request");
                let sink = LineSink::new(stream);
                let _ = sink.write_error(error.to_string());
                return;
            }
        };

        let sink = Arc::new(LineSink::new(stream));

        let command = match WireCommand::parse(&request_bytes).and_then(|command| {
            command.validate()?;
            Ok(command)
        }) {
            Ok(command) => command,
            Err(error) => {
                warn!(target: DISPATCH_TARGET, %error, "rejecting request");
                let _ = sink.write_error(error.to_string());
                return;
            }
        };

        debug!(
            target: DISPATCH_TARGET,
            endpoint = command.endpoint(),
            "dispatching request"
        );

        // Attach this connection as the relay's transport for the duration
        // of the dispatch. Last attach wins across concurrent connections;
        // events are best-effort by contract.
        let relay = Arc::clone(self.dispatcher.relay());
        relay.attach(Arc::clone(&sink) as Arc<dyn junction_host::EventSink>);
        let outcome = self.dispatcher.dispatch(&command.into_envelope());
        relay.detach();

        let written = match outcome {
            Ok(outcome) => sink.write_result(&outcome),
            Err(error) => sink.write_error(error.to_string()),
        };
        if let Err(error) = written {
            warn!(target: DISPATCH_TARGET, %error, "failed to write response");
        }
    }
}

impl ConnectionHandler for DispatchConnectionHandler {
    fn handle(&self, stream: ConnectionStream) {
        self.serve(stream);
    }
}

/// Reads a bounded JSONL request line from the stream.
///
/// Returns `Ok(None)` when the client disconnects without sending data;
/// EOF with partial data yields that data so truncated requests produce a
/// parse error rather than silence.
fn read_request_line(stream: &mut ConnectionStream) -> Result<Option<Vec<u8>>, ProtocolError> {
    let mut buffer = Vec::new();
    let mut chunk = [0_u8; 1024];

    loop {
        let bytes_read = read_with_retry(stream, &mut chunk)?;

        if bytes_read == 0 {
            return Ok(if buffer.is_empty() {
                None
            } else {
                Some(buffer)
            });
        }

        let filled = chunk.get(..bytes_read).unwrap_or_default();
        if let Some(newline_pos) = filled.iter().position(|b| *b == b'\n') {
            buffer.extend_from_slice(filled.get(..=newline_pos).unwrap_or_default());
            enforce_limit(buffer.len())?;
            return Ok(Some(buffer));
        }

        buffer.extend_from_slice(filled);
        enforce_limit(buffer.len())?;
    }
}

/// Reads from the stream, retrying on interrupts.
fn read_with_retry(stream: &mut ConnectionStream, buf: &mut [u8]) -> io::Result<usize> {
    loop {
        match stream.read(buf) {
            Ok(read) => return Ok(read),
            Err(error) if error.kind() == io::ErrorKind::Interrupted => continue,
            Err(error) => return Err(error),
        }
    }
}

/// Enforces the maximum request size limit.
fn enforce_limit(size: usize) -> Result<(), ProtocolError> {
    if size > MAX_REQUEST_BYTES {
        return Err(ProtocolError::TooLarge {
            size,
            max_size: MAX_REQUEST_BYTES,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::io::{BufRead, BufReader, Write};
    use std::net::{SocketAddr, TcpListener, TcpStream};
    use std::thread::{self, JoinHandle};

    use rstest::{fixture, rstest};

    use crate::tests::support::test_dispatcher;

    use super::*;

    /// TCP server/client pair driving one `DispatchConnectionHandler`.
    struct HandlerHarness {
        client: TcpStream,
        server: JoinHandle<()>,
    }

    impl HandlerHarness {
        fn send_and_collect(&mut self, request: &[u8]) -> Vec<String> {
            self.client.write_all(request).expect("write request");
            self.client.flush().expect("flush");

            let mut reader = BufReader::new(&mut self.client);
            let mut lines = Vec::new();
            let mut line = String::new();
            while reader.read_line(&mut line).expect("read") > 0 {
                lines.push(line.trim().to_owned());
                line.clear();
            }
            lines
        }

        fn join(self) {
            self.server.join().expect("server join");
        }
    }

    fn create_listener() -> (TcpListener, SocketAddr) {
        let listener = TcpListener::bind(("127.0.0.1", 0)).expect("bind");
        let addr = listener.local_addr().expect("addr");
        (listener, addr)
    }

    #[fixture]
    fn harness() -> HandlerHarness {
        let (listener, addr) = create_listener();
        let dispatcher = test_dispatcher();

        let server = thread::spawn(move || {
            let (stream, _) = listener.accept().expect("accept");
            DispatchConnectionHandler::new(dispatcher).handle(ConnectionStream::Tcp(stream));
        });

        let client = TcpStream::connect(addr).expect("connect");
        HandlerHarness { client, server }
    }

    #[rstest]
    fn edit_requests_are_acknowledged(mut harness: HandlerHarness) {
        let lines = harness.send_and_collect(
            b"{\"endpoint\":\"update-buffer\",\"path\":\"/ws/a.cs\",\"text\":\"class A{}\"}\n",
        );

        assert!(lines.iter().any(|l| l.contains(r#""kind":"result""#)));
        assert!(lines.iter().any(|l| l.contains(r#""kind":"ack""#)));
        harness.join();
    }

    #[rstest]
    fn malformed_requests_get_an_error_frame(mut harness: HandlerHarness) {
        let lines = harness.send_and_collect(b"not valid json\n");

        assert!(lines.iter().any(|l| l.contains(r#""kind":"error""#)));
        assert!(lines.iter().any(|l| l.contains("malformed request")));
        harness.join();
    }

    #[rstest]
    fn undeclared_endpoints_get_an_error_frame(mut harness: HandlerHarness) {
        let lines = harness
            .send_and_collect(b"{\"endpoint\":\"no-such-endpoint\",\"path\":\"/ws/a.cs\"}\n");

        assert!(lines.iter().any(|l| l.contains(r#""kind":"error""#)));
        assert!(lines.iter().any(|l| l.contains("unknown endpoint")));
        harness.join();
    }

    #[rstest]
    fn unserved_endpoints_return_the_empty_response(mut harness: HandlerHarness) {
        let lines =
            harness.send_and_collect(b"{\"endpoint\":\"codecheck\",\"path\":\"/ws/a.cs\"}\n");

        assert!(lines.iter().any(|l| l.contains(r#""kind":"result""#)));
        assert!(lines.iter().any(|l| l.contains(r#""items":[]"#)));
        harness.join();
    }

    #[rstest]
    fn invalid_edit_coordinates_abort_the_request(mut harness: HandlerHarness) {
        let request = b"{\"endpoint\":\"change-buffer\",\"path\":\"/ws/untracked.cs\",\
            \"changes\":[{\"start_line\":0,\"start_column\":0,\"end_line\":0,\
            \"end_column\":0,\"new_text\":\"x\"}]}\n";
        let lines = harness.send_and_collect(request);

        assert!(lines.iter().any(|l| l.contains(r#""kind":"error""#)));
        assert!(lines.iter().any(|l| l.contains("no document tracked")));
        harness.join();
    }
}
