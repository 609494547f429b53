//! Relay Server Event Loop
//!
//! The server is a single-threaded readiness multiplexer. It owns the
//! listening socket, every client [`Connection`] and the one relay
//! controller, and drives them all from one `mio` poll.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                          Server                              │
//! │                                                              │
//! │   poll.poll() ──┬── LISTENER ──> accept until WouldBlock     │
//! │                 │                register read+write         │
//! │                 │                                            │
//! │                 ├── SIGNALS ───> SIGINT/SIGTERM: stop        │
//! │                 ├── WAKER ─────> ShutdownHandle: stop        │
//! │                 │                                            │
//! │                 └── Token(n) ──> Connection::on_readable     │
//! │                                  Connection::on_writable     │
//! │                                        │                     │
//! │                                        ▼                     │
//! │                                  CommandHandler ──> relay    │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! Because every request is executed to completion inside one event
//! handler on one thread, relay calls are serialized without a lock and no
//! client ever observes a half-applied change made by another.
//!
//! ## Shutdown
//!
//! [`Server::shutdown`] closes every connection, releases the relay
//! controller, closes the listener and flushes the log. It runs at most
//! once: explicitly after [`Server::run`] returns, or from `Drop` on any
//! other exit path.

mod shutdown;

pub use shutdown::ShutdownHandle;

use crate::config::{Framing, ServerConfig};
use crate::connection::{Connection, ConnectionStats, Disposition};
use crate::error::ErrorKind;
use crate::relay::{self, BoxedController, HardwareError, RelayController};
use crate::telemetry::Telemetry;
use mio::event::Event;
use mio::net::{TcpListener, TcpStream};
use mio::{Events, Interest, Poll, Token, Waker};
use shutdown::SignalPipe;
use std::collections::HashMap;
use std::io;
use std::net::{SocketAddr, ToSocketAddrs};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, info, trace, warn};

const LISTENER: Token = Token(0);
const SIGNALS: Token = Token(1);
const WAKER: Token = Token(2);

/// First token handed out to client connections.
const FIRST_CONNECTION_TOKEN: usize = 3;

/// Readiness events collected per poll.
const EVENTS_CAPACITY: usize = 128;

/// Poll timeout while accepting is stalled on a listener error.
const ACCEPT_RETRY_INTERVAL: Duration = Duration::from_millis(100);

/// Startup and event-loop failures. All of them are fatal.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("failed to resolve {address}: {source}")]
    Resolve {
        address: String,
        #[source]
        source: io::Error,
    },

    #[error("no addresses resolved for {address}")]
    ResolveEmpty { address: String },

    #[error("failed to bind TCP listener at {address}: {source}")]
    Bind {
        address: String,
        #[source]
        source: io::Error,
    },

    #[error("failed to enable non-blocking listener: {source}")]
    NonBlocking {
        #[source]
        source: io::Error,
    },

    #[error("failed to initialise relay controller: {0}")]
    Controller(#[from] HardwareError),

    #[error("readiness polling failed: {source}")]
    Poll {
        #[source]
        source: io::Error,
    },

    #[error("failed to install signal handlers: {source}")]
    Signals {
        #[source]
        source: io::Error,
    },
}

impl ServerError {
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::Fatal
    }
}

/// The relay server.
pub struct Server {
    poll: Poll,
    listener: Option<TcpListener>,
    local_addr: SocketAddr,
    connections: HashMap<Token, Connection<TcpStream>>,
    next_token: usize,
    relay: BoxedController,
    signals: Option<SignalPipe>,
    shutdown: ShutdownHandle,
    telemetry: Telemetry,
    framing: Framing,
    max_request_bytes: usize,
    stats: ConnectionStats,
    /// The listener may still hold connections that raised no new event
    accept_stalled: bool,
    shut_down: bool,
}

impl Server {
    /// Opens the configured relay driver, then binds the listener.
    pub fn setup(config: &ServerConfig, telemetry: Telemetry) -> Result<Self, ServerError> {
        let relay = match relay::open(&config.driver) {
            Ok(relay) => relay,
            Err(e) => {
                telemetry.flush();
                return Err(e.into());
            }
        };
        Self::with_controller(config, relay, telemetry)
    }

    /// Like [`Server::setup`], but routes SIGINT and SIGTERM into the loop
    /// before the driver is opened. A signal caught during startup stops
    /// [`Server::run`] as soon as it starts.
    pub fn setup_with_signals(
        config: &ServerConfig,
        telemetry: Telemetry,
    ) -> Result<Self, ServerError> {
        let signals = SignalPipe::install().map_err(|source| ServerError::Signals { source })?;
        let mut server = Self::setup(config, telemetry)?;
        server.attach_signals(signals)?;
        Ok(server)
    }

    /// Binds the listener around an already opened relay controller.
    ///
    /// On failure the controller is released before the error is returned.
    pub fn with_controller(
        config: &ServerConfig,
        mut relay: BoxedController,
        telemetry: Telemetry,
    ) -> Result<Self, ServerError> {
        let (poll, listener, local_addr, shutdown) = match open_listener(config) {
            Ok(parts) => parts,
            Err(e) => {
                relay.release();
                telemetry.flush();
                return Err(e);
            }
        };

        info!(address = %local_addr, framing = ?config.framing, "Listening");

        Ok(Self {
            poll,
            listener: Some(listener),
            local_addr,
            connections: HashMap::new(),
            next_token: FIRST_CONNECTION_TOKEN,
            relay,
            signals: None,
            shutdown,
            telemetry,
            framing: config.framing,
            max_request_bytes: config.max_request_bytes,
            stats: ConnectionStats::new(),
            accept_stalled: false,
            shut_down: false,
        })
    }

    /// Stops the loop on SIGINT or SIGTERM.
    pub fn install_signal_handlers(&mut self) -> Result<(), ServerError> {
        if self.signals.is_none() {
            let pipe = SignalPipe::install().map_err(|source| ServerError::Signals { source })?;
            self.attach_signals(pipe)?;
        }
        Ok(())
    }

    fn attach_signals(&mut self, mut pipe: SignalPipe) -> Result<(), ServerError> {
        pipe.attach(self.poll.registry(), SIGNALS)
            .map_err(|source| ServerError::Signals { source })?;
        self.signals = Some(pipe);
        Ok(())
    }

    /// Returns a handle that stops [`Server::run`] from another thread.
    pub fn shutdown_handle(&self) -> ShutdownHandle {
        self.shutdown.clone()
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn stats(&self) -> &ConnectionStats {
        &self.stats
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down
    }

    /// Runs the event loop until shutdown is requested.
    ///
    /// Blocks only in the readiness wait. The wait has no timeout unless a
    /// listener error left accepting stalled, in which case accepting is
    /// retried every [`ACCEPT_RETRY_INTERVAL`].
    pub fn run(&mut self) -> Result<(), ServerError> {
        if self.shut_down {
            return Ok(());
        }

        let mut events = Events::with_capacity(EVENTS_CAPACITY);

        while !self.shutdown.is_requested() {
            let timeout = self.accept_stalled.then_some(ACCEPT_RETRY_INTERVAL);
            if let Err(e) = self.poll.poll(&mut events, timeout) {
                if e.kind() == io::ErrorKind::Interrupted {
                    continue;
                }
                return Err(ServerError::Poll { source: e });
            }

            for event in events.iter() {
                match event.token() {
                    LISTENER => self.accept_connections(),
                    SIGNALS => self.handle_signals(),
                    WAKER => trace!("Event loop woken"),
                    token => self.service_connection(token, event),
                }
            }

            if self.accept_stalled {
                self.accept_connections();
            }
        }

        info!("Shutdown requested, stopping server...");
        Ok(())
    }

    /// Closes every connection, releases the relay controller and closes
    /// the listener. Only the first call does anything.
    pub fn shutdown(&mut self) {
        if self.shut_down {
            return;
        }
        self.shut_down = true;

        let tokens: Vec<Token> = self.connections.keys().copied().collect();
        for token in tokens {
            self.close_connection(token);
        }

        self.relay.release();

        if let Some(mut listener) = self.listener.take() {
            if let Err(e) = self.poll.registry().deregister(&mut listener) {
                debug!(error = %e, "Failed to deregister listener");
            }
        }

        if let Some(mut signals) = self.signals.take() {
            signals.uninstall(self.poll.registry());
        }

        info!(
            connections_accepted = self.stats.connections_accepted,
            commands_processed = self.stats.commands_processed,
            bytes_read = self.stats.bytes_read,
            bytes_written = self.stats.bytes_written,
            "Server shut down"
        );
        self.telemetry.flush();
    }

    /// Accepts every pending connection.
    ///
    /// Readiness is edge-triggered, so an accept error other than
    /// WouldBlock (EMFILE, ENOBUFS) marks accepting as stalled and the loop
    /// retries on its next turn.
    fn accept_connections(&mut self) {
        self.accept_stalled = false;
        let Some(listener) = self.listener.as_ref() else {
            return;
        };

        loop {
            match listener.accept() {
                Ok((mut stream, addr)) => {
                    let token = Token(self.next_token);
                    self.next_token += 1;

                    if let Err(e) = self.poll.registry().register(
                        &mut stream,
                        token,
                        Interest::READABLE | Interest::WRITABLE,
                    ) {
                        warn!(client = %addr, error = %e, "Failed to register connection");
                        continue;
                    }

                    info!(client = %addr, "Accepted connection");
                    self.connections.insert(
                        token,
                        Connection::new(stream, addr, self.framing, self.max_request_bytes),
                    );
                    self.stats.connection_opened();
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    error!(error = %e, "Failed to accept connection, will retry");
                    self.accept_stalled = true;
                    break;
                }
            }
        }
    }

    fn handle_signals(&mut self) {
        if let Some(signals) = self.signals.as_mut() {
            if signals.drain() {
                self.shutdown.request();
            }
        }
    }

    /// Runs the read half and then the write half for one ready connection.
    fn service_connection(&mut self, token: Token, event: &Event) {
        let Some(conn) = self.connections.get_mut(&token) else {
            return;
        };
        let addr = conn.addr();
        let relay: &mut dyn RelayController = &mut *self.relay;

        let mut result = Ok(Disposition::Open);
        if event.is_readable() || event.is_read_closed() || event.is_error() {
            result = conn.on_readable(relay, &mut self.stats);
        }
        if event.is_writable() && matches!(result, Ok(Disposition::Open)) {
            result = conn.on_writable(relay, &mut self.stats);
        }

        match result {
            Ok(Disposition::Open) => {}
            Ok(Disposition::Close) => self.close_connection(token),
            Err(e) => {
                if e.is_disconnect() {
                    debug!(client = %addr, error = %e, "Connection reset by client");
                } else {
                    warn!(client = %addr, error = %e, "Connection error");
                }
                self.close_connection(token);
            }
        }
    }

    /// Deregisters and drops a connection, closing its socket.
    fn close_connection(&mut self, token: Token) {
        if let Some(mut conn) = self.connections.remove(&token) {
            if let Err(e) = self.poll.registry().deregister(conn.stream_mut()) {
                debug!(client = %conn.addr(), error = %e, "Failed to deregister connection");
            }
            info!(client = %conn.addr(), "Closing connection");
            self.stats.connection_closed();
        }
    }
}

impl Drop for Server {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Resolves, binds and registers the listening socket.
fn open_listener(
    config: &ServerConfig,
) -> Result<(Poll, TcpListener, SocketAddr, ShutdownHandle), ServerError> {
    let address = config.bind_address();
    let addrs: Vec<SocketAddr> = (config.host.as_str(), config.port)
        .to_socket_addrs()
        .map_err(|source| ServerError::Resolve {
            address: address.clone(),
            source,
        })?
        .collect();

    let mut last_err = None;
    let mut bound = None;
    for addr in addrs {
        match std::net::TcpListener::bind(addr) {
            Ok(listener) => {
                bound = Some(listener);
                break;
            }
            Err(e) => last_err = Some(e),
        }
    }

    let std_listener = match (bound, last_err) {
        (Some(listener), _) => listener,
        (None, Some(source)) => return Err(ServerError::Bind { address, source }),
        (None, None) => return Err(ServerError::ResolveEmpty { address }),
    };

    std_listener
        .set_nonblocking(true)
        .map_err(|source| ServerError::NonBlocking { source })?;
    let local_addr = std_listener
        .local_addr()
        .map_err(|source| ServerError::Bind {
            address: address.clone(),
            source,
        })?;

    let poll = Poll::new().map_err(|source| ServerError::Poll { source })?;
    let mut listener = TcpListener::from_std(std_listener);
    poll.registry()
        .register(&mut listener, LISTENER, Interest::READABLE)
        .map_err(|source| ServerError::Poll { source })?;
    let waker = Waker::new(poll.registry(), WAKER).map_err(|source| ServerError::Poll { source })?;

    Ok((poll, listener, local_addr, ShutdownHandle::new(waker)))
}
