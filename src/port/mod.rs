//! Serial port layer.
//!
//! [`SerialPort`] is the public type. It reaches the operating system through
//! the [`Connector`]/[`Transport`] seam, with [`SystemConnector`] for real
//! devices and [`MockConnector`] for tests.

pub mod error;
pub mod mock;
pub mod native;
pub mod serial;
pub mod settings;
pub mod timeout;
pub mod traits;

#[cfg(feature = "async")]
pub mod async_port;

pub use error::PortError;
pub use mock::{MockConnector, MockDevice, MockTransport};
pub use native::{list_ports, NativeTransport, PortInfo, SystemConnector};
pub use serial::SerialPort;
pub use settings::{DataBits, FlowControl, Parity, PortSettings, StopBits};
pub use timeout::Timeout;
pub use traits::{ClearBuffer, Connector, ModemLine, ModemStatus, Transport};

#[cfg(feature = "async")]
pub use async_port::{AsyncSerialPort, AsyncSerialPortAdapter};
