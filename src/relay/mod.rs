//! Relay Driver Module
//!
//! The relay board is an external, stateful resource reached through the
//! [`RelayController`] trait. The event loop owns exactly one controller and
//! lends it to the command handler for the duration of a single request, so
//! every driver call is made from one thread, one at a time.
//!
//! ## Drivers
//!
//! - [`SimulatedBoard`]: in-memory board, the default and the test double
//! - [`GpioBoard`]: one Linux sysfs GPIO line per relay
//!
//! Drivers are not assumed to be re-entrant or thread-safe. Code that ever
//! calls a controller from more than one thread must put it behind a mutex.

pub mod gpio;
pub mod simulated;

pub use gpio::GpioBoard;
pub use simulated::SimulatedBoard;

use crate::config::{DriverConfig, DriverKind};
use crate::error::ErrorKind;
use crate::protocol::{RelayIndex, RelayMask, RelayState, RELAY_COUNT};
use std::io;
use std::path::PathBuf;
use thiserror::Error;
use tracing::info;

/// Errors raised by relay drivers.
#[derive(Debug, Error)]
pub enum HardwareError {
    /// Reading or writing a device file failed
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// A GPIO value file held something other than `0` or `1`
    #[error("unexpected value {value:?} in {path}")]
    InvalidValue { path: PathBuf, value: String },

    /// The driver was configured with the wrong number of lines
    #[error("expected {expected} GPIO pins, got {actual}")]
    PinCount { expected: usize, actual: usize },

    /// The controller has already been released
    #[error("relay controller has been released")]
    Released,

    /// Any other driver-reported failure
    #[error("{0}")]
    Fault(String),
}

impl HardwareError {
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::Hardware
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        HardwareError::Io {
            path: path.into(),
            source,
        }
    }
}

/// Capabilities of a relay board.
pub trait RelayController {
    /// Reads the current state of every channel.
    fn read_mask(&mut self) -> Result<RelayMask, HardwareError>;

    /// Switches one channel. Setting a channel to the state it already has
    /// is not an error.
    fn set(&mut self, index: RelayIndex, state: RelayState) -> Result<(), HardwareError>;

    /// Releases the underlying hardware. Safe to call more than once.
    fn release(&mut self);
}

impl<R: RelayController + ?Sized> RelayController for Box<R> {
    fn read_mask(&mut self) -> Result<RelayMask, HardwareError> {
        (**self).read_mask()
    }

    fn set(&mut self, index: RelayIndex, state: RelayState) -> Result<(), HardwareError> {
        (**self).set(index, state)
    }

    fn release(&mut self) {
        (**self).release()
    }
}

/// A controller that can be moved onto the event-loop thread.
pub type BoxedController = Box<dyn RelayController + Send>;

/// Opens the driver selected in the configuration.
pub fn open(config: &DriverConfig) -> Result<BoxedController, HardwareError> {
    match config.kind {
        DriverKind::Simulated => {
            info!(initial_mask = config.initial_mask, "Using simulated relay board");
            Ok(Box::new(SimulatedBoard::new(RelayMask::new(
                config.initial_mask,
            ))))
        }
        DriverKind::Gpio => {
            let pins: [u32; RELAY_COUNT as usize] =
                config
                    .gpio_pins
                    .as_slice()
                    .try_into()
                    .map_err(|_| HardwareError::PinCount {
                        expected: RELAY_COUNT as usize,
                        actual: config.gpio_pins.len(),
                    })?;
            let board = GpioBoard::open(&config.gpio_root, pins, config.invert_outputs)?;
            info!(
                root = %config.gpio_root.display(),
                pins = ?pins,
                invert = config.invert_outputs,
                "Using GPIO relay board"
            );
            Ok(Box::new(board))
        }
    }
}
