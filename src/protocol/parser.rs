//! Relay Command Parser
//!
//! Turns the raw bytes of one request into a [`Command`]. Parsing is pure:
//! it never touches a relay driver and never fails outright. Anything that
//! is not a well-formed request becomes [`Command::Invalid`] carrying the
//! reason that is reported back to the client.
//!
//! ## Grammar
//!
//! The input is decoded as UTF-8, surrounding whitespace is stripped and the
//! remainder is split on whitespace:
//!
//! ```text
//! ["status"]          -> Status
//! [num, state]        -> SetRelay, after validating num and state
//! anything else       -> Invalid(Format)
//! ```
//!
//! For two tokens the checks run in a fixed order: the relay number must be
//! an integer, then it must be in range, then the state must be `on`/`off`.
//! So `"abc sideways"` reports the integer problem and `"5 sideways"` the
//! range problem.

use crate::error::ErrorKind;
use crate::protocol::types::{Command, RelayIndex, RelayState};
use std::num::IntErrorKind;
use thiserror::Error;

/// The status query keyword.
pub const STATUS_KEYWORD: &str = "status";

/// Reasons a request is rejected.
///
/// The `Display` text is the exact reason sent to the client after `Error: `.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// Wrong number of tokens
    #[error("Command format is 'relay_num state'.")]
    Format,

    /// The relay number token is not an integer
    #[error("Command format is 'relay_num state', where relay_num is an integer.")]
    NotInteger,

    /// The request bytes are not valid UTF-8.
    ///
    /// Reported with the same text as [`ParseError::NotInteger`], which is
    /// what existing clients of the relay server expect.
    #[error("Command format is 'relay_num state', where relay_num is an integer.")]
    Undecodable,

    /// The relay number is an integer outside 1-4
    #[error("Relay number must be between 1 and 4.")]
    RelayOutOfRange,

    /// The state token is not `on` or `off`
    #[error("State must be 'on' or 'off'.")]
    InvalidState,
}

impl ParseError {
    /// Classifies the error: syntax problems are protocol errors, well-formed
    /// requests with bad values are validation errors.
    pub fn kind(&self) -> ErrorKind {
        match self {
            ParseError::Format | ParseError::NotInteger | ParseError::Undecodable => {
                ErrorKind::Protocol
            }
            ParseError::RelayOutOfRange | ParseError::InvalidState => ErrorKind::Validation,
        }
    }
}

/// Result type for parsing operations.
pub type ParseResult<T> = Result<T, ParseError>;

/// Decodes one request.
pub fn parse_command(buf: &[u8]) -> Command {
    match try_parse_command(buf) {
        Ok(command) => command,
        Err(e) => Command::Invalid(e),
    }
}

/// Decodes one request, returning the rejection reason as an error.
pub fn try_parse_command(buf: &[u8]) -> ParseResult<Command> {
    let text = std::str::from_utf8(buf).map_err(|_| ParseError::Undecodable)?;
    let tokens: Vec<&str> = text.split_whitespace().collect();

    match tokens.as_slice() {
        [keyword] if *keyword == STATUS_KEYWORD => Ok(Command::Status),
        [num, state] => {
            let index = parse_relay_index(num)?;
            let state = state.parse::<RelayState>()?;
            Ok(Command::SetRelay { index, state })
        }
        _ => Err(ParseError::Format),
    }
}

/// Parses and range-checks the relay number token.
fn parse_relay_index(token: &str) -> ParseResult<RelayIndex> {
    let num: i64 = match token.parse() {
        Ok(n) => n,
        // A well-formed integer that merely doesn't fit is still out of range
        Err(e) if matches!(e.kind(), IntErrorKind::PosOverflow | IntErrorKind::NegOverflow) => {
            return Err(ParseError::RelayOutOfRange)
        }
        Err(_) => return Err(ParseError::NotInteger),
    };

    RelayIndex::new(num).ok_or(ParseError::RelayOutOfRange)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(n: i64, state: RelayState) -> Command {
        Command::SetRelay {
            index: RelayIndex::new(n).unwrap(),
            state,
        }
    }

    #[test]
    fn test_parse_status() {
        assert_eq!(parse_command(b"status"), Command::Status);
        assert_eq!(parse_command(b"  status\r\n"), Command::Status);
    }

    #[test]
    fn test_parse_status_is_case_sensitive() {
        assert_eq!(
            parse_command(b"STATUS"),
            Command::Invalid(ParseError::Format)
        );
    }

    #[test]
    fn test_parse_set_relay() {
        for n in 1..=4 {
            let on = format!("{} on", n);
            let off = format!("{} off\n", n);
            assert_eq!(parse_command(on.as_bytes()), set(n, RelayState::On));
            assert_eq!(parse_command(off.as_bytes()), set(n, RelayState::Off));
        }
    }

    #[test]
    fn test_parse_extra_whitespace() {
        assert_eq!(parse_command(b"\t2   on  \n"), set(2, RelayState::On));
        assert_eq!(parse_command(b"+3 off"), set(3, RelayState::Off));
        assert_eq!(parse_command(b"04 on"), set(4, RelayState::On));
    }

    #[test]
    fn test_parse_relay_out_of_range() {
        assert_eq!(
            parse_command(b"5 on"),
            Command::Invalid(ParseError::RelayOutOfRange)
        );
        assert_eq!(
            parse_command(b"0 off"),
            Command::Invalid(ParseError::RelayOutOfRange)
        );
        assert_eq!(
            parse_command(b"-1 on"),
            Command::Invalid(ParseError::RelayOutOfRange)
        );
        assert_eq!(
            parse_command(b"99999999999999999999999 on"),
            Command::Invalid(ParseError::RelayOutOfRange)
        );
    }

    #[test]
    fn test_parse_invalid_state() {
        assert_eq!(
            parse_command(b"1 sideways"),
            Command::Invalid(ParseError::InvalidState)
        );
        assert_eq!(
            parse_command(b"1 ON"),
            Command::Invalid(ParseError::InvalidState)
        );
    }

    #[test]
    fn test_parse_wrong_token_count() {
        assert_eq!(parse_command(b"1"), Command::Invalid(ParseError::Format));
        assert_eq!(
            parse_command(b"1 on now"),
            Command::Invalid(ParseError::Format)
        );
        assert_eq!(parse_command(b""), Command::Invalid(ParseError::Format));
        assert_eq!(parse_command(b" \r\n"), Command::Invalid(ParseError::Format));
    }

    #[test]
    fn test_parse_not_integer() {
        assert_eq!(
            parse_command(b"abc on"),
            Command::Invalid(ParseError::NotInteger)
        );
        // The integer check runs before the state check
        assert_eq!(
            parse_command(b"abc sideways"),
            Command::Invalid(ParseError::NotInteger)
        );
        assert_eq!(
            parse_command(b"status on"),
            Command::Invalid(ParseError::NotInteger)
        );
    }

    #[test]
    fn test_range_checked_before_state() {
        assert_eq!(
            parse_command(b"5 sideways"),
            Command::Invalid(ParseError::RelayOutOfRange)
        );
    }

    #[test]
    fn test_parse_invalid_utf8() {
        let command = parse_command(b"1 \xff\xfe");
        assert_eq!(command, Command::Invalid(ParseError::Undecodable));
        assert_eq!(
            ParseError::Undecodable.to_string(),
            ParseError::NotInteger.to_string()
        );
    }

    #[test]
    fn test_error_messages() {
        assert_eq!(
            ParseError::Format.to_string(),
            "Command format is 'relay_num state'."
        );
        assert_eq!(
            ParseError::NotInteger.to_string(),
            "Command format is 'relay_num state', where relay_num is an integer."
        );
        assert_eq!(
            ParseError::RelayOutOfRange.to_string(),
            "Relay number must be between 1 and 4."
        );
        assert_eq!(
            ParseError::InvalidState.to_string(),
            "State must be 'on' or 'off'."
        );
    }

    #[test]
    fn test_error_kinds() {
        assert_eq!(ParseError::Format.kind(), ErrorKind::Protocol);
        assert_eq!(ParseError::Undecodable.kind(), ErrorKind::Protocol);
        assert_eq!(ParseError::RelayOutOfRange.kind(), ErrorKind::Validation);
        assert_eq!(ParseError::InvalidState.kind(), ErrorKind::Validation);
    }
}
