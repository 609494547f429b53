//! Logging context for the server process.
//!
//! [`Telemetry::init`] installs the global `tracing` subscriber once, at
//! process start, and returns a handle that the event loop keeps for its
//! whole life. The handle owns the log file (if any) and flushes it when the
//! server shuts down.

use crate::config::LogConfig;
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// Errors encountered while configuring logging.
#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    /// The log filter expression did not parse.
    #[error("invalid log filter: {0}")]
    Filter(String),

    /// The log file could not be opened.
    #[error("failed to open log file: {0}")]
    LogFile(#[from] io::Error),

    /// A global subscriber was already installed.
    #[error("failed to install log subscriber: {0}")]
    Subscriber(String),
}

/// Handle to the installed logging pipeline.
#[derive(Debug, Clone, Default)]
pub struct Telemetry {
    log_file: Option<Arc<File>>,
}

impl Telemetry {
    /// Installs the global subscriber.
    ///
    /// `RUST_LOG` takes precedence over the configured level. With a log
    /// file configured, lines are appended to it without colour codes.
    pub fn init(config: &LogConfig) -> Result<Self, TelemetryError> {
        let filter = build_filter(&config.log_level)?;
        let builder = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_thread_ids(false)
            .with_file(false)
            .with_line_number(false);

        match &config.log_file {
            Some(path) => {
                let file = Arc::new(OpenOptions::new().create(true).append(true).open(path)?);
                builder
                    .with_ansi(false)
                    .with_writer(Arc::clone(&file))
                    .try_init()
                    .map_err(|e| TelemetryError::Subscriber(e.to_string()))?;
                Ok(Self {
                    log_file: Some(file),
                })
            }
            None => {
                builder
                    .with_writer(io::stderr)
                    .try_init()
                    .map_err(|e| TelemetryError::Subscriber(e.to_string()))?;
                Ok(Self::default())
            }
        }
    }

    /// A handle that owns nothing. Events still go to whatever subscriber
    /// is installed, if any.
    pub fn disabled() -> Self {
        Self::default()
    }

    pub fn log_to_file(&self) -> bool {
        self.log_file.is_some()
    }

    /// Pushes buffered log output to stable storage.
    pub fn flush(&self) {
        if let Some(file) = &self.log_file {
            let mut writer: &File = file;
            // Nothing useful can be logged about a failing log file
            let _ = writer.flush();
            let _ = file.sync_data();
        }
    }
}

fn build_filter(level: &str) -> Result<EnvFilter, TelemetryError> {
    match std::env::var(EnvFilter::DEFAULT_ENV) {
        Ok(env) if !env.trim().is_empty() => {
            EnvFilter::try_new(env).map_err(|e| TelemetryError::Filter(e.to_string()))
        }
        _ => EnvFilter::try_new(level).map_err(|e| TelemetryError::Filter(e.to_string())),
    }
}
