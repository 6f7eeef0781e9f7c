//! Top-level error type for the command-line front end.

use crate::config::ConfigError;
use crate::port::PortError;
use thiserror::Error;

/// Unified application error type.
#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Port(#[from] PortError),

    /// No port given on the command line or in the configuration
    #[error("No serial port configured; pass --port or set serial.port")]
    NoPort,

    /// Bytes read back differ from the bytes written
    #[error("Loopback mismatch: sent {sent} bytes, received {received} back")]
    LoopbackMismatch { sent: usize, received: usize },

    #[error("Failed to set up logging: {0}")]
    Logging(String),

    #[error("An I/O error occurred: {0}")]
    Io(#[from] std::io::Error),

    #[error("A serialization error occurred: {0}")]
    Serde(#[from] serde_json::Error),
}

/// A specialized `Result` type for the CLI.
pub type AppResult<T> = Result<T, AppError>;
