//! Connection Handler Module
//!
//! This module manages individual client connections to the relay server.
//! All connections are serviced by the single event-loop thread; each one is
//! a plain state object holding its buffers, driven by readiness events.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     Event Loop                              │
//! │                    (server module)                          │
//! └──────────────────────┬──────────────────────────────────────┘
//!                        │
//!                        │ readable / writable
//!                        ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    Connection                               │
//! │                                                             │
//! │  ┌─────────────┐    ┌─────────────┐    ┌─────────────┐      │
//! │  │ Drain bytes │───>│ Cut request │───>│ Execute cmd │      │
//! │  └─────────────┘    └─────────────┘    └─────────────┘      │
//! │                                               │             │
//! │                                               ▼             │
//! │                                      ┌─────────────┐        │
//! │                                      │ Queue+flush │        │
//! │                                      └─────────────┘        │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Features
//!
//! - **Non-blocking I/O**: Every read and write returns immediately
//! - **Partial writes**: Unsent response bytes are kept in order
//! - **Pipelining**: Several newline-terminated requests in one read
//! - **Bounded input**: Oversized requests close the connection
//! - **Statistics**: Tracks connection and command metrics

pub mod handler;

// Re-export commonly used types
pub use handler::{
    Connection, ConnectionError, ConnectionStats, Disposition, ReadStatus, MAX_PENDING_OUTPUT,
    READ_CHUNK_SIZE,
};
