//! Error classification.
//!
//! Each error type in the crate maps onto one [`ErrorKind`]. The kind decides
//! how far an error is allowed to travel:
//!
//! | Kind         | Recovery                                             |
//! |--------------|------------------------------------------------------|
//! | `Protocol`   | answered with `Error: ...`, connection stays open    |
//! | `Validation` | answered with `Error: ...`, connection stays open    |
//! | `Hardware`   | logged, answered with `Error: ...`, server stays up  |
//! | `Connection` | that connection is cleaned up silently               |
//! | `Fatal`      | startup aborts, shutdown sequence still runs         |

use std::fmt;

/// The coarse category of an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Malformed request syntax.
    Protocol,
    /// Well-formed request with an out-of-range value.
    Validation,
    /// A relay driver call failed.
    Hardware,
    /// The peer closed or reset its connection.
    Connection,
    /// Startup failure; the process cannot continue.
    Fatal,
}

impl ErrorKind {
    /// Whether an error of this kind may end the process.
    pub fn is_fatal(self) -> bool {
        matches!(self, ErrorKind::Fatal)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::Protocol => "protocol",
            ErrorKind::Validation => "validation",
            ErrorKind::Hardware => "hardware",
            ErrorKind::Connection => "connection",
            ErrorKind::Fatal => "fatal",
        };
        f.write_str(name)
    }
}
