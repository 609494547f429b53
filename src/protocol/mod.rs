//! Relay Protocol Implementation
//!
//! This module implements the line-oriented text protocol spoken by relay
//! clients.
//!
//! ## Overview
//!
//! A request is either `status` or `<relay_num> <state>`. Every request gets
//! exactly one newline-terminated text response. Malformed or out-of-range
//! requests are answered with an `Error: ...` line; they never close the
//! connection.
//!
//! ## Modules
//!
//! - `types`: Relay data model, `Command` and `Response`
//! - `parser`: Pure request parser
//!
//! ## Example
//!
//! ```
//! use relaymux::protocol::{parse_command, Command, RelayMask, Response};
//!
//! assert_eq!(parse_command(b"status\n"), Command::Status);
//!
//! let response = Response::Status(RelayMask::new(0b0101));
//! assert_eq!(response.serialize(), b"Current Relay State: 00000101\n");
//! ```

pub mod parser;
pub mod types;

// Re-export commonly used types for convenience
pub use parser::{parse_command, try_parse_command, ParseError, ParseResult, STATUS_KEYWORD};
pub use types::{Command, RelayIndex, RelayMask, RelayState, Response, NEWLINE, RELAY_COUNT};
