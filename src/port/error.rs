//! Port-specific error types.
//!
//! There is no timeout variant: a read or write that runs out of time
//! returns a short count.

use thiserror::Error;

/// Errors that can occur during serial port operations.
#[derive(Debug, Error)]
pub enum PortError {
    /// The port could not be opened or configured as requested.
    #[error("Failed to open serial port '{port}': {reason}")]
    OpenFailed { port: String, reason: String },

    /// An operation needing a live handle was issued while the port is closed.
    /// Carries the name of the operation that was attempted.
    #[error("{0} failed: port not opened")]
    NotOpen(&'static str),

    /// Attempted to open a port that's already open.
    #[error("Port is already open")]
    AlreadyOpen,

    /// The backend cannot express the requested setting.
    #[error("Unsupported setting: {0}")]
    Unsupported(String),

    /// An I/O error occurred during port operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A serialport-specific error occurred.
    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),
}

impl PortError {
    /// Create an OpenFailed error for a port.
    pub fn open_failed(port: impl Into<String>, reason: impl ToString) -> Self {
        Self::OpenFailed {
            port: port.into(),
            reason: reason.to_string(),
        }
    }

    /// Create an Unsupported error from a message.
    pub fn unsupported(message: impl Into<String>) -> Self {
        Self::Unsupported(message.into())
    }

    /// Whether this is an OS-level I/O failure, as opposed to a lifecycle
    /// or configuration problem.
    pub fn is_io_failure(&self) -> bool {
        matches!(self, Self::Io(_) | Self::Serial(_))
    }
}
