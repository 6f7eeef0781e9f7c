//! Atlas Serial Library
//!
//! Blocking serial port I/O with per-call deadlines, line framing and
//! independent read and write locks, so one thread can read while another
//! writes to the same port.
//!
//! # Modules
//!
//! - `port`: the [`SerialPort`] type, its timeout model and backends
//! - `config`: TOML configuration and `ROS_SONIA_WS` workspace paths
//! - `error`: the CLI's unified error type
//!
//! # Example
//!
//! ```rust
//! use atlas_serial::{MockConnector, PortSettings, SerialPort, Timeout};
//! use std::sync::Arc;
//!
//! let connector = Arc::new(MockConnector::new());
//! let device = connector.add_device("/dev/ttyMOCK0");
//!
//! let settings = PortSettings {
//!     timeout: Timeout::simple(100),
//!     ..PortSettings::default()
//! };
//! let port = SerialPort::with_connector("/dev/ttyMOCK0", settings, connector);
//! port.open()?;
//! device.feed(b"$GPGGA,1\r\n");
//! assert_eq!(port.read_line_string(64, "\r\n")?, "$GPGGA,1\r\n");
//! # Ok::<(), atlas_serial::PortError>(())
//! ```

pub mod config;
pub mod error;
pub mod port;

// Re-export commonly used types for convenience
pub use error::{AppError, AppResult};
pub use port::{
    list_ports, ClearBuffer, Connector, DataBits, FlowControl, MockConnector, MockDevice,
    ModemLine, ModemStatus, Parity, PortError, PortInfo, PortSettings, SerialPort, StopBits,
    SystemConnector, Timeout, Transport,
};

#[cfg(feature = "async")]
pub use port::{AsyncSerialPort, AsyncSerialPortAdapter};

// Re-export config types
pub use config::{Config, ConfigError, ConfigLoader, ConfigResult, WorkspacePaths};
