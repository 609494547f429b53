//! Command Handler Module
//!
//! This module implements the command processing layer for the relay server.
//! It receives raw requests, parses them, executes them against the relay
//! driver, and returns the response to write back.
//!
//! ## Architecture
//!
//! ```text
//! Client Request
//!       │
//!       ▼
//! ┌─────────────────┐
//! │ Command Parser  │  (protocol module)
//! └────────┬────────┘
//!          │
//!          ▼
//! ┌─────────────────┐
//! │ CommandHandler  │  (this module)
//! │                 │
//! │  - Dispatch     │
//! │  - Execute      │
//! │  - Render       │
//! └────────┬────────┘
//!          │
//!          ▼
//! ┌─────────────────┐
//! │ RelayController │  (relay module)
//! └─────────────────┘
//! ```

pub mod handler;

// Re-export the main command handler
pub use handler::{CommandError, CommandHandler};
