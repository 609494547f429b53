//! Command Handler Module
//!
//! Executes parsed relay commands against the relay driver and produces the
//! response for the client.
//!
//! ## Supported Commands
//!
//! - `status` - Read the relay mask
//! - `<relay_num> <on|off>` - Switch one relay
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     CommandHandler                          │
//! │                                                             │
//! │  ┌─────────────┐    ┌─────────────┐    ┌─────────────┐      │
//! │  │   parse()   │───>│  dispatch() │───>│  render()   │      │
//! │  └─────────────┘    └─────────────┘    └─────────────┘      │
//! │                            │                                │
//! │                            ▼                                │
//! │                     RelayController                         │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! The handler only borrows the controller for one request. Every failure,
//! including driver failures, ends up as an `Error: ...` response; nothing
//! escapes to the event loop.

use crate::error::ErrorKind;
use crate::protocol::{parse_command, Command, ParseError, Response};
use crate::relay::{HardwareError, RelayController};
use thiserror::Error;
use tracing::{debug, error};

/// Why a command could not be carried out.
#[derive(Debug, Error)]
pub enum CommandError {
    /// The request was malformed or out of range
    #[error(transparent)]
    Parse(#[from] ParseError),

    /// The relay driver failed
    #[error(transparent)]
    Hardware(#[from] HardwareError),
}

impl CommandError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            CommandError::Parse(e) => e.kind(),
            CommandError::Hardware(e) => e.kind(),
        }
    }
}

/// Executes relay commands against a borrowed controller.
pub struct CommandHandler<'a> {
    relay: &'a mut dyn RelayController,
}

impl<'a> CommandHandler<'a> {
    /// Creates a handler that borrows the controller for its lifetime.
    pub fn new(relay: &'a mut dyn RelayController) -> Self {
        Self { relay }
    }

    /// Parses and executes one raw request.
    pub fn execute(&mut self, request: &[u8]) -> Response {
        let command = parse_command(request);
        self.execute_command(command)
    }

    /// Executes a parsed command, converting every failure into an error
    /// response.
    pub fn execute_command(&mut self, command: Command) -> Response {
        let name = command.name();
        match self.dispatch(command) {
            Ok(response) => {
                debug!(command = name, response = %response, "Command executed");
                response
            }
            Err(e) => {
                match &e {
                    CommandError::Parse(parse_err) => {
                        debug!(kind = %e.kind(), error = %parse_err, "Rejected command")
                    }
                    CommandError::Hardware(hw_err) => {
                        error!(command = name, error = %hw_err, "Relay driver failed")
                    }
                }
                Response::error(e.to_string())
            }
        }
    }

    /// Dispatches a command to the relay driver.
    pub fn dispatch(&mut self, command: Command) -> Result<Response, CommandError> {
        match command {
            Command::Status => {
                let mask = self.relay.read_mask()?;
                Ok(Response::Status(mask))
            }
            Command::SetRelay { index, state } => {
                self.relay.set(index, state)?;
                Ok(Response::RelaySet { index, state })
            }
            Command::Invalid(reason) => Err(CommandError::Parse(reason)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{RelayIndex, RelayMask, RelayState};
    use crate::relay::SimulatedBoard;

    /// A driver whose every call fails.
    struct BrokenBoard;

    impl RelayController for BrokenBoard {
        fn read_mask(&mut self) -> Result<RelayMask, HardwareError> {
            Err(HardwareError::Fault("adapter not responding".to_string()))
        }

        fn set(&mut self, _: RelayIndex, _: RelayState) -> Result<(), HardwareError> {
            Err(HardwareError::Fault("adapter not responding".to_string()))
        }

        fn release(&mut self) {}
    }

    fn run(relay: &mut dyn RelayController, request: &str) -> String {
        let response = CommandHandler::new(relay).execute(request.as_bytes());
        String::from_utf8(response.serialize()).unwrap()
    }

    #[test]
    fn test_status_format() {
        let mut board = SimulatedBoard::default();
        let response = run(&mut board, "status");
        assert_eq!(response, "Current Relay State: 00000000\n");

        let bits = response
            .strip_prefix("Current Relay State: ")
            .and_then(|s| s.strip_suffix('\n'))
            .unwrap();
        assert_eq!(bits.len(), 8);
        assert!(bits.chars().all(|c| c == '0' || c == '1'));
    }

    #[test]
    fn test_set_then_status() {
        for n in 1..=4u8 {
            for (token, state) in [("on", RelayState::On), ("off", RelayState::Off)] {
                let mut board = SimulatedBoard::new(RelayMask::new(if state.is_on() {
                    0
                } else {
                    0x0F
                }));

                let response = run(&mut board, &format!("{} {}", n, token));
                assert_eq!(
                    response,
                    format!("Relay {} set to {}.\n", n, token.to_uppercase())
                );

                let mask = board.read_mask().unwrap();
                let index = RelayIndex::try_from(n).unwrap();
                assert_eq!(mask.state(index), state);

                let status = run(&mut board, "status");
                assert_eq!(status, format!("Current Relay State: {}\n", mask));
            }
        }
    }

    #[test]
    fn test_set_twice_is_idempotent() {
        let mut board = SimulatedBoard::default();
        assert_eq!(run(&mut board, "2 on"), "Relay 2 set to ON.\n");
        assert_eq!(run(&mut board, "2 on"), "Relay 2 set to ON.\n");
        assert_eq!(run(&mut board, "status"), "Current Relay State: 00000010\n");
    }

    #[test]
    fn test_invalid_requests() {
        let mut board = SimulatedBoard::default();
        assert_eq!(
            run(&mut board, "5 on"),
            "Error: Relay number must be between 1 and 4.\n"
        );
        assert_eq!(
            run(&mut board, "1 sideways"),
            "Error: State must be 'on' or 'off'.\n"
        );
        assert_eq!(
            run(&mut board, "1"),
            "Error: Command format is 'relay_num state'.\n"
        );
        assert_eq!(
            run(&mut board, "abc on"),
            "Error: Command format is 'relay_num state', where relay_num is an integer.\n"
        );
        // Rejected commands never reach the driver
        assert_eq!(board.read_mask().unwrap().bits(), 0);
    }

    #[test]
    fn test_upper_bits_reported() {
        let mut board = SimulatedBoard::new(RelayMask::new(0b1100_0000));
        run(&mut board, "1 on");
        assert_eq!(run(&mut board, "status"), "Current Relay State: 11000001\n");
    }

    #[test]
    fn test_hardware_failure_becomes_response() {
        let mut board = BrokenBoard;
        assert_eq!(run(&mut board, "status"), "Error: adapter not responding\n");
        assert_eq!(run(&mut board, "3 off"), "Error: adapter not responding\n");
    }

    #[test]
    fn test_released_board_becomes_response() {
        let mut board = SimulatedBoard::default();
        board.release();
        assert_eq!(
            run(&mut board, "1 on"),
            "Error: relay controller has been released\n"
        );
    }

    #[test]
    fn test_dispatch_classifies_errors() {
        let mut board = BrokenBoard;
        let mut handler = CommandHandler::new(&mut board);

        let err = handler.dispatch(Command::Status).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Hardware);

        let err = handler
            .dispatch(Command::Invalid(ParseError::InvalidState))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }
}
