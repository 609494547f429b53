//! Relay Protocol Data Types
//!
//! This module defines the values that travel through the relay protocol:
//! the validated relay index, the on/off state, the 8-bit relay mask, the
//! parsed [`Command`] and the [`Response`] that is written back to the peer.
//!
//! ## Wire Format
//!
//! Requests are plain text:
//!
//! - `status`
//! - `<relay_num> <state>` where `relay_num` is 1-4 and `state` is `on`/`off`
//!
//! Responses are single newline-terminated lines:
//!
//! - `Current Relay State: 00000101\n`
//! - `Relay 3 set to ON.\n`
//! - `Error: State must be 'on' or 'off'.\n`

use crate::protocol::parser::ParseError;
use std::fmt;
use std::str::FromStr;

/// Number of relay channels on the board.
pub const RELAY_COUNT: u8 = 4;

/// Terminator appended to every response line.
pub const NEWLINE: &[u8] = b"\n";

/// A 1-based relay channel identifier, guaranteed to be in `1..=RELAY_COUNT`.
///
/// The only way to build one is through [`RelayIndex::new`] (or `TryFrom`),
/// so an out-of-range channel can never reach a relay driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RelayIndex(u8);

impl RelayIndex {
    /// Validates a channel number.
    pub fn new(num: i64) -> Option<Self> {
        if (1..=i64::from(RELAY_COUNT)).contains(&num) {
            Some(RelayIndex(num as u8))
        } else {
            None
        }
    }

    /// Returns the 1-based channel number.
    pub fn get(self) -> u8 {
        self.0
    }

    /// Returns the zero-based position of this channel in a [`RelayMask`].
    pub fn bit(self) -> u8 {
        self.0 - 1
    }

    /// Iterates over every channel on the board, in order.
    pub fn all() -> impl Iterator<Item = RelayIndex> {
        (1..=RELAY_COUNT).map(RelayIndex)
    }
}

impl TryFrom<u8> for RelayIndex {
    type Error = ParseError;

    fn try_from(num: u8) -> Result<Self, Self::Error> {
        RelayIndex::new(i64::from(num)).ok_or(ParseError::RelayOutOfRange)
    }
}

impl fmt::Display for RelayIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Commanded state of a single relay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, clap::ValueEnum)]
pub enum RelayState {
    On,
    Off,
}

impl RelayState {
    /// The lowercase token used on the wire.
    pub fn as_str(self) -> &'static str {
        match self {
            RelayState::On => "on",
            RelayState::Off => "off",
        }
    }

    /// The uppercase form used in confirmation responses.
    pub fn as_upper(self) -> &'static str {
        match self {
            RelayState::On => "ON",
            RelayState::Off => "OFF",
        }
    }

    pub fn is_on(self) -> bool {
        matches!(self, RelayState::On)
    }
}

impl FromStr for RelayState {
    type Err = ParseError;

    /// Tokens are case-sensitive: only `on` and `off` are accepted.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "on" => Ok(RelayState::On),
            "off" => Ok(RelayState::Off),
            _ => Err(ParseError::InvalidState),
        }
    }
}

impl fmt::Display for RelayState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 8-bit relay state mask.
///
/// Bit `index - 1` mirrors the last commanded state of relay `index`. Bits
/// above the used channels belong to the driver and are carried through
/// untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct RelayMask(u8);

impl RelayMask {
    pub const fn new(bits: u8) -> Self {
        RelayMask(bits)
    }

    pub fn bits(self) -> u8 {
        self.0
    }

    /// Returns the state of one channel.
    pub fn state(self, index: RelayIndex) -> RelayState {
        if self.0 & (1 << index.bit()) != 0 {
            RelayState::On
        } else {
            RelayState::Off
        }
    }

    /// Returns a copy of this mask with one channel changed.
    #[must_use]
    pub fn with(self, index: RelayIndex, state: RelayState) -> Self {
        let bit = 1 << index.bit();
        match state {
            RelayState::On => RelayMask(self.0 | bit),
            RelayState::Off => RelayMask(self.0 & !bit),
        }
    }
}

impl From<u8> for RelayMask {
    fn from(bits: u8) -> Self {
        RelayMask(bits)
    }
}

impl fmt::Display for RelayMask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:08b}", self.0)
    }
}

impl fmt::Binary for RelayMask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Binary::fmt(&self.0, f)
    }
}

/// A decoded request.
///
/// Produced fresh for every request by [`parse_command`](crate::protocol::parse_command)
/// and never stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Query the current relay mask.
    Status,
    /// Switch one relay.
    SetRelay { index: RelayIndex, state: RelayState },
    /// The request could not be parsed or validated.
    Invalid(ParseError),
}

impl Command {
    /// Short name used in log fields.
    pub fn name(&self) -> &'static str {
        match self {
            Command::Status => "status",
            Command::SetRelay { .. } => "set",
            Command::Invalid(_) => "invalid",
        }
    }
}

/// A response to a single request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    /// `Current Relay State: <mask:08b>`
    Status(RelayMask),
    /// `Relay <index> set to <STATE>.`
    RelaySet { index: RelayIndex, state: RelayState },
    /// `Error: <reason>`
    Error(String),
}

impl Response {
    /// Creates an error response.
    pub fn error(reason: impl Into<String>) -> Self {
        Response::Error(reason.into())
    }

    /// Serializes the response to its UTF-8 wire form, newline included.
    pub fn serialize(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        self.serialize_into(&mut buf);
        buf
    }

    /// Serializes the response into an existing buffer.
    pub fn serialize_into(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(self.to_string().as_bytes());
        buf.extend_from_slice(NEWLINE);
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Response::Error(_))
    }
}

impl fmt::Display for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Response::Status(mask) => write!(f, "Current Relay State: {}", mask),
            Response::RelaySet { index, state } => {
                write!(f, "Relay {} set to {}.", index, state.as_upper())
            }
            Response::Error(reason) => write!(f, "Error: {}", reason),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn relay(n: i64) -> RelayIndex {
        RelayIndex::new(n).unwrap()
    }

    #[test]
    fn test_relay_index_bounds() {
        assert!(RelayIndex::new(0).is_none());
        assert!(RelayIndex::new(5).is_none());
        assert!(RelayIndex::new(-1).is_none());
        assert_eq!(relay(1).get(), 1);
        assert_eq!(relay(4).bit(), 3);
        assert_eq!(RelayIndex::all().count(), 4);
        assert_eq!(RelayIndex::try_from(9u8), Err(ParseError::RelayOutOfRange));
    }

    #[test]
    fn test_relay_state_tokens() {
        assert_eq!("on".parse::<RelayState>(), Ok(RelayState::On));
        assert_eq!("off".parse::<RelayState>(), Ok(RelayState::Off));
        assert_eq!("ON".parse::<RelayState>(), Err(ParseError::InvalidState));
        assert_eq!(RelayState::Off.as_upper(), "OFF");
    }

    #[test]
    fn test_mask_set_and_clear() {
        let mask = RelayMask::new(0)
            .with(relay(1), RelayState::On)
            .with(relay(3), RelayState::On);
        assert_eq!(mask.bits(), 0b0000_0101);
        assert_eq!(mask.state(relay(3)), RelayState::On);
        assert_eq!(mask.state(relay(2)), RelayState::Off);

        let mask = mask.with(relay(1), RelayState::Off);
        assert_eq!(mask.bits(), 0b0000_0100);
    }

    #[test]
    fn test_mask_keeps_upper_bits() {
        let mask = RelayMask::new(0b1010_0000).with(relay(2), RelayState::On);
        assert_eq!(mask.bits(), 0b1010_0010);
        assert_eq!(mask.to_string(), "10100010");
    }

    #[test]
    fn test_status_serialize() {
        let response = Response::Status(RelayMask::new(5));
        assert_eq!(response.serialize(), b"Current Relay State: 00000101\n");
    }

    #[test]
    fn test_relay_set_serialize() {
        let response = Response::RelaySet {
            index: relay(2),
            state: RelayState::Off,
        };
        assert_eq!(response.serialize(), b"Relay 2 set to OFF.\n");
    }

    #[test]
    fn test_error_serialize() {
        let response = Response::error("Relay number must be between 1 and 4.");
        assert!(response.is_error());
        assert_eq!(
            response.serialize(),
            b"Error: Relay number must be between 1 and 4.\n"
        );
    }
}
