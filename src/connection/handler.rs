//! Connection Handler Module
//!
//! This module holds the per-peer state of the relay server: the inbound
//! accumulator, the outbound queue, and the logic that turns readiness
//! events into reads, dispatched requests and writes.
//!
//! ## Connection Lifecycle
//!
//! ```text
//! 1. Listener accepts, Connection registered for read + write readiness
//!        │
//!        ▼
//! 2. ┌──────────────────────────────────┐
//!    │  readable                        │
//!    │   ├─ drain socket into inbound   │
//!    │   ├─ cut requests (framing)      │
//!    │   ├─ execute each request        │
//!    │   ├─ queue responses             │
//!    │   └─ flush what the socket takes │
//!    │                                  │
//!    │  writable                        │
//!    │   └─ flush the pending remainder │
//!    └──────────────────────────────────┘
//!        │
//!        ▼
//! 3. Peer EOF / reset / oversized request
//!        │
//!        ▼
//! 4. Event loop deregisters and drops the Connection
//! ```
//!
//! ## Buffer Management
//!
//! Readiness is edge-triggered, so a readable event drains the socket in
//! reads of at most [`READ_CHUNK_SIZE`] bytes until it would block, and a
//! flush keeps writing until the queue is empty or the socket would block.
//! Whatever the socket refuses stays queued, in order, for the next
//! writable event.
//!
//! The outbound queue is bounded by [`MAX_PENDING_OUTPUT`]. Once a peer
//! stops reading and the queue reaches the mark, the connection stops
//! reading and dispatching. The writable event that drains the queue below
//! the mark resumes it, since no new readable edge will arrive for bytes
//! already sitting in the socket.

use crate::commands::CommandHandler;
use crate::config::Framing;
use crate::error::ErrorKind;
use crate::protocol::Response;
use crate::relay::RelayController;
use bytes::{Buf, BytesMut};
use std::io::{self, Read, Write};
use std::net::SocketAddr;
use tracing::{debug, trace, warn};

/// Largest single read from a socket.
pub const READ_CHUNK_SIZE: usize = 1024;

/// Reason sent to a client whose request outgrew the inbound bound.
pub const REQUEST_TOO_LARGE: &str = "Request too large.";

/// Queued response bytes at which a connection stops taking requests.
pub const MAX_PENDING_OUTPUT: usize = 64 * 1024;

/// Initial buffer capacity
const INITIAL_BUFFER_SIZE: usize = 256;

/// Statistics for connection handling
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ConnectionStats {
    /// Total number of connections accepted
    pub connections_accepted: u64,
    /// Currently active connections
    pub active_connections: u64,
    /// Total commands processed
    pub commands_processed: u64,
    /// Total bytes read
    pub bytes_read: u64,
    /// Total bytes written
    pub bytes_written: u64,
}

impl ConnectionStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn connection_opened(&mut self) {
        self.connections_accepted += 1;
        self.active_connections += 1;
    }

    pub fn connection_closed(&mut self) {
        self.active_connections = self.active_connections.saturating_sub(1);
    }

    pub fn command_processed(&mut self) {
        self.commands_processed += 1;
    }

    pub fn bytes_read(&mut self, count: usize) {
        self.bytes_read += count as u64;
    }

    pub fn bytes_written(&mut self, count: usize) {
        self.bytes_written += count as u64;
    }
}

/// Errors that end a connection.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    /// I/O error (network issue)
    #[error("I/O error: {0}")]
    IoError(#[from] io::Error),

    /// The socket accepted zero bytes of a non-empty write
    #[error("peer stopped accepting data")]
    WriteZero,
}

impl ConnectionError {
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::Connection
    }

    /// Whether this is an ordinary peer hang-up rather than a fault.
    pub fn is_disconnect(&self) -> bool {
        match self {
            ConnectionError::IoError(e) => matches!(
                e.kind(),
                io::ErrorKind::ConnectionReset
                    | io::ErrorKind::ConnectionAborted
                    | io::ErrorKind::BrokenPipe
                    | io::ErrorKind::UnexpectedEof
            ),
            ConnectionError::WriteZero => true,
        }
    }
}

/// Result of draining the socket once.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ReadStatus {
    /// Bytes appended to the inbound buffer
    pub bytes: usize,
    /// The peer closed its write side
    pub eof: bool,
    /// Reading stopped because the inbound buffer is full
    pub saturated: bool,
}

/// What the event loop should do with a connection after an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    Open,
    Close,
}

/// A single client connection.
///
/// Generic over the stream so the buffering logic runs the same against a
/// real non-blocking socket and against a scripted stream in tests.
pub struct Connection<S> {
    /// The non-blocking stream for this connection
    stream: S,

    /// Client's address (for logging)
    addr: SocketAddr,

    /// Bytes received but not yet cut into requests
    inbound: BytesMut,

    /// Formatted responses not yet accepted by the socket
    outbound: BytesMut,

    framing: Framing,

    max_request_bytes: usize,

    /// Set once the connection must close after its queue drains
    closing: bool,

    /// Reading is suspended until the peer drains the outbound queue
    read_paused: bool,
}

impl<S: Read + Write> Connection<S> {
    /// Creates the state for a freshly accepted peer.
    pub fn new(stream: S, addr: SocketAddr, framing: Framing, max_request_bytes: usize) -> Self {
        Self {
            stream,
            addr,
            inbound: BytesMut::with_capacity(INITIAL_BUFFER_SIZE),
            outbound: BytesMut::with_capacity(INITIAL_BUFFER_SIZE),
            framing,
            max_request_bytes: max_request_bytes.max(1),
            closing: false,
            read_paused: false,
        }
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn stream_mut(&mut self) -> &mut S {
        &mut self.stream
    }

    /// Number of queued response bytes.
    pub fn pending_output(&self) -> usize {
        self.outbound.len()
    }

    pub fn has_pending_output(&self) -> bool {
        !self.outbound.is_empty()
    }

    /// Number of buffered request bytes.
    pub fn buffered_input(&self) -> usize {
        self.inbound.len()
    }

    pub fn is_closing(&self) -> bool {
        self.closing
    }

    /// Whether reading is suspended on a full outbound queue.
    pub fn is_read_paused(&self) -> bool {
        self.read_paused
    }

    /// Handles read readiness.
    ///
    /// Drains the socket, executes every complete request against the relay
    /// controller, queues the responses in request order and flushes as much
    /// as the socket takes right away. Stops early, leaving bytes in the
    /// socket, while the outbound queue is at [`MAX_PENDING_OUTPUT`].
    pub fn on_readable(
        &mut self,
        relay: &mut dyn RelayController,
        stats: &mut ConnectionStats,
    ) -> Result<Disposition, ConnectionError> {
        if self.closing {
            return Ok(self.disposition());
        }

        loop {
            loop {
                if self.output_full() {
                    self.pause_reading();
                    break;
                }
                self.read_paused = false;

                let status = self.read_available(stats)?;
                self.dispatch_ready(relay, stats, !status.saturated);

                // Complete requests held back by a full queue don't count
                if !self.output_full() && self.inbound.len() >= self.max_request_bytes {
                    warn!(
                        client = %self.addr,
                        size = self.inbound.len(),
                        "Request size limit exceeded"
                    );
                    self.inbound.clear();
                    self.queue_response(&Response::error(REQUEST_TOO_LARGE));
                    self.closing = true;
                    break;
                }

                if status.eof {
                    // Half-close counts as a full close; answer what arrived first
                    if let Err(e) = self.flush(stats) {
                        debug!(client = %self.addr, error = %e, "Dropping responses to closed peer");
                    }
                    return Ok(Disposition::Close);
                }

                if self.output_full() {
                    self.pause_reading();
                    break;
                }

                if !status.saturated {
                    break;
                }
            }

            self.flush(stats)?;

            // A flush that got below the mark without blocking produces no
            // writable edge, so resume here
            if !self.read_paused || self.output_full() {
                break;
            }
        }

        Ok(self.disposition())
    }

    /// Handles write readiness by flushing the pending remainder, and
    /// resumes reading once a paused connection's queue is below the mark.
    pub fn on_writable(
        &mut self,
        relay: &mut dyn RelayController,
        stats: &mut ConnectionStats,
    ) -> Result<Disposition, ConnectionError> {
        if self.has_pending_output() {
            self.flush(stats)?;
        }

        if self.read_paused && !self.output_full() {
            trace!(client = %self.addr, pending = self.outbound.len(), "Resuming reads");
            return self.on_readable(relay, stats);
        }

        Ok(self.disposition())
    }

    /// Reads until the socket would block, the peer closes, or the inbound
    /// buffer reaches its bound.
    pub fn read_available(&mut self, stats: &mut ConnectionStats) -> Result<ReadStatus, ConnectionError> {
        let mut status = ReadStatus::default();
        let mut chunk = [0u8; READ_CHUNK_SIZE];

        loop {
            let room = self.max_request_bytes.saturating_sub(self.inbound.len());
            if room == 0 {
                status.saturated = true;
                break;
            }

            let want = room.min(READ_CHUNK_SIZE);
            match self.stream.read(&mut chunk[..want]) {
                Ok(0) => {
                    status.eof = true;
                    break;
                }
                Ok(n) => {
                    self.inbound.extend_from_slice(&chunk[..n]);
                    status.bytes += n;
                    stats.bytes_read(n);
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }

        trace!(
            client = %self.addr,
            bytes = status.bytes,
            buffered = self.inbound.len(),
            eof = status.eof,
            "Read data"
        );
        Ok(status)
    }

    /// Cuts the next complete request out of the inbound buffer.
    ///
    /// `drained` says the socket had nothing more to give, which lets
    /// boundary framing treat an unterminated remainder as a request.
    pub fn next_request(&mut self, drained: bool) -> Option<BytesMut> {
        if let Some(pos) = self.inbound.iter().position(|&b| b == b'\n') {
            return Some(self.inbound.split_to(pos + 1));
        }

        match self.framing {
            Framing::Boundary if drained && !self.inbound.is_empty() => Some(self.inbound.split()),
            _ => None,
        }
    }

    /// Appends a response to the outbound queue.
    pub fn queue_response(&mut self, response: &Response) {
        self.outbound.extend_from_slice(&response.serialize());
    }

    /// Writes queued bytes until the queue is empty or the socket would
    /// block. Returns the number of bytes written.
    pub fn flush(&mut self, stats: &mut ConnectionStats) -> Result<usize, ConnectionError> {
        let mut written = 0;

        while !self.outbound.is_empty() {
            match self.stream.write(&self.outbound) {
                Ok(0) => return Err(ConnectionError::WriteZero),
                Ok(n) => {
                    self.outbound.advance(n);
                    written += n;
                    stats.bytes_written(n);
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }

        if written > 0 {
            trace!(
                client = %self.addr,
                bytes = written,
                pending = self.outbound.len(),
                "Sent response"
            );
        }
        Ok(written)
    }

    fn dispatch_ready(
        &mut self,
        relay: &mut dyn RelayController,
        stats: &mut ConnectionStats,
        drained: bool,
    ) {
        while !self.output_full() {
            let Some(request) = self.next_request(drained) else {
                break;
            };
            let response = CommandHandler::new(&mut *relay).execute(&request);
            stats.command_processed();
            self.queue_response(&response);
        }
    }

    fn output_full(&self) -> bool {
        self.outbound.len() >= MAX_PENDING_OUTPUT
    }

    fn pause_reading(&mut self) {
        if !self.read_paused {
            debug!(
                client = %self.addr,
                pending = self.outbound.len(),
                buffered = self.inbound.len(),
                "Peer not reading, pausing requests"
            );
        }
        self.read_paused = true;
    }

    fn disposition(&self) -> Disposition {
        if self.closing && self.outbound.is_empty() {
            Disposition::Close
        } else {
            Disposition::Open
        }
    }
}
