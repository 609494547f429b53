//! In-memory relay board.

use crate::protocol::{RelayIndex, RelayMask, RelayState};
use crate::relay::{HardwareError, RelayController};
use tracing::{debug, info};

/// A relay board that only exists in memory.
///
/// The mask starts at the configured power-on value. Bits above the four
/// relay channels are never touched, so a board that reports extra lines
/// keeps reporting them.
#[derive(Debug, Clone)]
pub struct SimulatedBoard {
    mask: RelayMask,
    released: bool,
}

impl SimulatedBoard {
    pub fn new(initial: RelayMask) -> Self {
        Self {
            mask: initial,
            released: false,
        }
    }

    pub fn is_released(&self) -> bool {
        self.released
    }

    fn ensure_open(&self) -> Result<(), HardwareError> {
        if self.released {
            Err(HardwareError::Released)
        } else {
            Ok(())
        }
    }
}

impl Default for SimulatedBoard {
    fn default() -> Self {
        Self::new(RelayMask::default())
    }
}

impl RelayController for SimulatedBoard {
    fn read_mask(&mut self) -> Result<RelayMask, HardwareError> {
        self.ensure_open()?;
        Ok(self.mask)
    }

    fn set(&mut self, index: RelayIndex, state: RelayState) -> Result<(), HardwareError> {
        self.ensure_open()?;
        self.mask = self.mask.with(index, state);
        debug!(relay = %index, state = %state, mask = %self.mask, "Simulated relay switched");
        Ok(())
    }

    fn release(&mut self) {
        if !self.released {
            self.released = true;
            info!("Simulated relay board released");
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
    fn test_set_and_read() {
        let mut board = SimulatedBoard::default();
        board.set(relay(1), RelayState::On).unwrap();
        board.set(relay(4), RelayState::On).unwrap();
        assert_eq!(board.read_mask().unwrap().bits(), 0b0000_1001);

        board.set(relay(1), RelayState::Off).unwrap();
        assert_eq!(board.read_mask().unwrap().bits(), 0b0000_1000);
    }

    #[test]
    fn test_set_is_idempotent() {
        let mut board = SimulatedBoard::default();
        board.set(relay(2), RelayState::On).unwrap();
        let once = board.read_mask().unwrap();
        board.set(relay(2), RelayState::On).unwrap();
        assert_eq!(board.read_mask().unwrap(), once);
    }

    #[test]
    fn test_upper_bits_preserved() {
        let mut board = SimulatedBoard::new(RelayMask::new(0xF0));
        board.set(relay(3), RelayState::On).unwrap();
        assert_eq!(board.read_mask().unwrap().bits(), 0xF4);
    }

    #[test]
    fn test_released_board_fails() {
        let mut board = SimulatedBoard::default();
        board.release();
        board.release();
        assert!(board.is_released());
        assert!(matches!(board.read_mask(), Err(HardwareError::Released)));
        assert!(matches!(
            board.set(relay(1), RelayState::On),
            Err(HardwareError::Released)
        ));
    }
}
