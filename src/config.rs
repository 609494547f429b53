//! Server configuration.
//!
//! Every option is a command-line flag of the `relaymux` binary. The defaults
//! reproduce the classic deployment: listen on `localhost:65432` and accept
//! requests terminated by the client's send boundary.

use crate::{DEFAULT_HOST, DEFAULT_PORT};
use clap::{Args, Parser, ValueEnum};
use std::path::PathBuf;

/// Default bound on a single buffered request.
pub const DEFAULT_MAX_REQUEST_BYTES: usize = 4096;

/// How the inbound byte stream is cut into requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum Framing {
    /// Newline-terminated lines are requests; once the socket has been
    /// drained, any unterminated remainder is a request as well.
    #[default]
    Boundary,
    /// Only newline-terminated lines are requests. Partial lines wait for
    /// more bytes.
    Newline,
}

/// Which relay driver to open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum DriverKind {
    /// In-memory board
    #[default]
    Simulated,
    /// Linux sysfs GPIO lines
    Gpio,
}

/// Relay driver options.
#[derive(Debug, Clone, PartialEq, Eq, Args)]
pub struct DriverConfig {
    /// Relay driver to use
    #[arg(long = "driver", value_enum, default_value_t = DriverKind::Simulated)]
    pub kind: DriverKind,

    /// Power-on mask of the simulated board
    #[arg(long, default_value_t = 0)]
    pub initial_mask: u8,

    /// sysfs GPIO directory
    #[arg(long, default_value = "/sys/class/gpio")]
    pub gpio_root: PathBuf,

    /// GPIO line numbers for relays 1-4
    #[arg(long, value_delimiter = ',', default_values_t = [17u32, 27, 22, 23])]
    pub gpio_pins: Vec<u32>,

    /// Drive lines low to switch a relay on
    #[arg(long)]
    pub invert_outputs: bool,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            kind: DriverKind::Simulated,
            initial_mask: 0,
            gpio_root: PathBuf::from("/sys/class/gpio"),
            gpio_pins: vec![17, 27, 22, 23],
            invert_outputs: false,
        }
    }
}

/// Logging options.
#[derive(Debug, Clone, PartialEq, Eq, Args)]
pub struct LogConfig {
    /// Append log lines to this file instead of stderr
    #[arg(long)]
    pub log_file: Option<PathBuf>,

    /// Log filter, overridden by RUST_LOG
    #[arg(long, default_value = "info")]
    pub log_level: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            log_file: None,
            log_level: "info".to_string(),
        }
    }
}

/// Server configuration
#[derive(Debug, Clone, PartialEq, Eq, Parser)]
#[command(
    name = "relaymux",
    version,
    about = "Serve a 4-channel relay board over TCP"
)]
pub struct ServerConfig {
    /// Host to bind to
    #[arg(long, default_value = DEFAULT_HOST)]
    pub host: String,

    /// Port to listen on
    #[arg(short, long, default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// How requests are delimited on the wire
    #[arg(long, value_enum, default_value_t = Framing::Boundary)]
    pub framing: Framing,

    /// Largest request the server will buffer before dropping the client
    #[arg(long, default_value_t = DEFAULT_MAX_REQUEST_BYTES)]
    pub max_request_bytes: usize,

    #[command(flatten)]
    pub driver: DriverConfig,

    #[command(flatten)]
    pub log: LogConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            framing: Framing::default(),
            max_request_bytes: DEFAULT_MAX_REQUEST_BYTES,
            driver: DriverConfig::default(),
            log: LogConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Returns the bind address as a string
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_default_impl() {
        let parsed = ServerConfig::try_parse_from(["relaymux"]).unwrap();
        assert_eq!(parsed, ServerConfig::default());
        assert_eq!(parsed.bind_address(), "localhost:65432");
        assert_eq!(parsed.framing, Framing::Boundary);
    }

    #[test]
    fn test_parse_flags() {
        let parsed = ServerConfig::try_parse_from([
            "relaymux",
            "--host",
            "0.0.0.0",
            "-p",
            "7000",
            "--framing",
            "newline",
            "--driver",
            "gpio",
            "--gpio-pins",
            "5,6,13,19",
            "--invert-outputs",
            "--log-file",
            "relay_control.log",
        ])
        .unwrap();

        assert_eq!(parsed.bind_address(), "0.0.0.0:7000");
        assert_eq!(parsed.framing, Framing::Newline);
        assert_eq!(parsed.driver.kind, DriverKind::Gpio);
        assert_eq!(parsed.driver.gpio_pins, vec![5, 6, 13, 19]);
        assert!(parsed.driver.invert_outputs);
        assert_eq!(
            parsed.log.log_file,
            Some(PathBuf::from("relay_control.log"))
        );
    }

    #[test]
    fn test_rejects_bad_port() {
        assert!(ServerConfig::try_parse_from(["relaymux", "--port", "70000"]).is_err());
    }
}
