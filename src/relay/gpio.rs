//! Linux sysfs GPIO relay board.
//!
//! Each relay is wired to one GPIO line. Lines are driven through the legacy
//! sysfs interface:
//!
//! ```text
//! <root>/export              write the line number to expose gpio<N>/
//! <root>/gpio<N>/direction   "out"
//! <root>/gpio<N>/value       "1" or "0"
//! <root>/unexport            write the line number to remove gpio<N>/
//! ```
//!
//! Many relay modules are active-low; `invert_outputs` flips the level that
//! is written for `on` and the level that is read back as `on`.

use crate::protocol::{RelayIndex, RelayMask, RelayState, RELAY_COUNT};
use crate::relay::{HardwareError, RelayController};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

const PIN_COUNT: usize = RELAY_COUNT as usize;

/// A relay board driven through sysfs GPIO lines.
#[derive(Debug)]
pub struct GpioBoard {
    root: PathBuf,
    pins: [u32; PIN_COUNT],
    invert: bool,
    /// Lines this board exported itself and must unexport on release.
    exported: Vec<u32>,
    released: bool,
}

impl GpioBoard {
    /// Exposes every line and configures it as an output.
    ///
    /// Lines that are already exported are reused as they are.
    pub fn open(
        root: impl AsRef<Path>,
        pins: [u32; PIN_COUNT],
        invert: bool,
    ) -> Result<Self, HardwareError> {
        let root = root.as_ref().to_path_buf();
        let mut board = GpioBoard {
            root,
            pins,
            invert,
            exported: Vec::new(),
            released: false,
        };

        for pin in pins {
            if let Err(e) = board.configure_line(pin) {
                board.release();
                return Err(e);
            }
        }

        Ok(board)
    }

    fn configure_line(&mut self, pin: u32) -> Result<(), HardwareError> {
        let line = self.line_dir(pin);
        if !line.exists() {
            write_file(&self.root.join("export"), &pin.to_string())?;
            self.exported.push(pin);
            debug!(pin, "Exported GPIO line");
        }
        write_file(&line.join("direction"), "out")
    }

    fn line_dir(&self, pin: u32) -> PathBuf {
        self.root.join(format!("gpio{}", pin))
    }

    fn value_path(&self, index: RelayIndex) -> PathBuf {
        self.line_dir(self.pins[usize::from(index.bit())])
            .join("value")
    }

    fn level_for(&self, state: RelayState) -> &'static str {
        if state.is_on() != self.invert {
            "1"
        } else {
            "0"
        }
    }

    fn ensure_open(&self) -> Result<(), HardwareError> {
        if self.released {
            Err(HardwareError::Released)
        } else {
            Ok(())
        }
    }
}

impl RelayController for GpioBoard {
    fn read_mask(&mut self) -> Result<RelayMask, HardwareError> {
        self.ensure_open()?;

        let mut mask = RelayMask::default();
        for index in RelayIndex::all() {
            let path = self.value_path(index);
            let raw = fs::read_to_string(&path).map_err(|e| HardwareError::io(&path, e))?;
            let high = match raw.trim() {
                "1" => true,
                "0" => false,
                other => {
                    return Err(HardwareError::InvalidValue {
                        path,
                        value: other.to_string(),
                    })
                }
            };
            let state = if high != self.invert {
                RelayState::On
            } else {
                RelayState::Off
            };
            mask = mask.with(index, state);
        }

        Ok(mask)
    }

    fn set(&mut self, index: RelayIndex, state: RelayState) -> Result<(), HardwareError> {
        self.ensure_open()?;
        let path = self.value_path(index);
        write_file(&path, self.level_for(state))?;
        debug!(relay = %index, state = %state, path = %path.display(), "GPIO relay switched");
        Ok(())
    }

    fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;

        for pin in std::mem::take(&mut self.exported) {
            if let Err(e) = write_file(&self.root.join("unexport"), &pin.to_string()) {
                warn!(pin, error = %e, "Failed to unexport GPIO line");
            }
        }
        info!(root = %self.root.display(), "GPIO relay board released");
    }
}

impl Drop for GpioBoard {
    fn drop(&mut self) {
        self.release();
    }
}

fn write_file(path: &Path, contents: &str) -> Result<(), HardwareError> {
    fs::write(path, contents).map_err(|e| HardwareError::io(path, e))
}
