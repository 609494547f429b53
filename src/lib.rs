//! # relaymux - A TCP Server for a 4-Channel Relay Board
//!
//! relaymux exposes a relay board to the network. Clients connect over TCP,
//! send one-line text commands and receive one-line text responses. A single
//! thread multiplexes every client with a readiness poll, so requests from
//! different clients are serialized onto the board without locks.
//!
//! ## Features
//!
//! - **Line protocol**: `status` and `<relay_num> <on|off>`, every request
//!   answered with exactly one line
//! - **Single-threaded multiplexer**: `mio` readiness loop with per-client
//!   input accumulation and output queues
//! - **Pluggable drivers**: in-memory board or Linux sysfs GPIO lines
//! - **Clean shutdown**: SIGINT/SIGTERM close every client and release the
//!   board exactly once
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                              relaymux                                   │
//! │                                                                         │
//! │  ┌─────────────┐    ┌─────────────┐    ┌─────────────┐                  │
//! │  │   Server    │───>│ Connection  │───>│  Command    │                  │
//! │  │ (mio poll)  │    │ (buffers)   │    │  Handler    │                  │
//! │  └─────────────┘    └─────────────┘    └──────┬──────┘                  │
//! │         ▲                  │                  │                         │
//! │         │                  ▼                  ▼                         │
//! │  ┌─────────────┐    ┌─────────────┐    ┌──────────────────────────┐     │
//! │  │ SIGINT /    │    │  Protocol   │    │     RelayController      │     │
//! │  │ SIGTERM     │    │  Parser     │    │ SimulatedBoard/GpioBoard │     │
//! │  └─────────────┘    └─────────────┘    └──────────────────────────┘     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```no_run
//! use relaymux::config::ServerConfig;
//! use relaymux::server::Server;
//! use relaymux::telemetry::Telemetry;
//!
//! fn main() -> anyhow::Result<()> {
//!     let config = ServerConfig::default();
//!     let telemetry = Telemetry::init(&config.log)?;
//!
//!     let mut server = Server::setup(&config, telemetry)?;
//!     server.install_signal_handlers()?;
//!     server.run()?;
//!     server.shutdown();
//!     Ok(())
//! }
//! ```
//!
//! ## Module Overview
//!
//! - [`protocol`]: Request parser, relay data model and responses
//! - [`commands`]: Executes commands against the relay controller
//! - [`connection`]: Per-client buffering and framing
//! - [`server`]: The readiness loop, signals and shutdown
//! - [`relay`]: Relay controller trait and drivers
//! - [`client`]: Async client used by `relayctl`
//! - [`config`], [`telemetry`], [`error`]: Flags, logging and error kinds

pub mod client;
pub mod commands;
pub mod config;
pub mod connection;
pub mod error;
pub mod protocol;
pub mod relay;
pub mod server;
pub mod telemetry;

// Re-export commonly used types for convenience
pub use commands::CommandHandler;
pub use config::ServerConfig;
pub use connection::ConnectionStats;
pub use error::ErrorKind;
pub use protocol::{parse_command, Command, ParseError, RelayMask, Response};
pub use relay::{RelayController, SimulatedBoard};
pub use server::{Server, ServerError, ShutdownHandle};

/// The default port relaymux listens on
pub const DEFAULT_PORT: u16 = 65432;

/// The default host relaymux binds to
pub const DEFAULT_HOST: &str = "localhost";

/// Version of relaymux
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
