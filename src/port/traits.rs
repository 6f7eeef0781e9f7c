//! Platform seam for serial devices.
//!
//! [`Connector`] turns a device path into a live [`Transport`]. The real
//! implementation sits on the `serialport` crate, and the mock implementation
//! keeps everything in memory so that the port logic can be tested without
//! hardware.

use super::error::PortError;
use super::settings::PortSettings;
use serde::Serialize;
use std::thread;
use std::time::{Duration, Instant};

pub use serialport::ClearBuffer;

/// Polling period of the default [`Transport::wait_readable`].
const READABLE_POLL_INTERVAL: Duration = Duration::from_millis(1);

/// Modem status lines readable from a serial device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModemLine {
    /// Clear To Send.
    Cts,
    /// Data Set Ready.
    Dsr,
    /// Ring Indicator.
    Ri,
    /// Carrier Detect.
    Cd,
}

impl ModemLine {
    pub const ALL: [ModemLine; 4] = [ModemLine::Cts, ModemLine::Dsr, ModemLine::Ri, ModemLine::Cd];
}

/// Snapshot of all modem status lines.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ModemStatus {
    pub cts: bool,
    pub dsr: bool,
    pub ri: bool,
    pub cd: bool,
}

/// An open OS serial handle.
///
/// Reads and writes take an explicit timeout per call and report a timeout
/// as `Ok(0)`, never as an error. The caller owns the deadline arithmetic.
pub trait Transport: Send + std::fmt::Debug {
    /// Wait up to `timeout` for data, then read what is available into
    /// `buffer`. Returns `Ok(0)` if nothing arrived in time.
    fn read_timeout(&mut self, buffer: &mut [u8], timeout: Duration) -> Result<usize, PortError>;

    /// Wait up to `timeout` for the device to accept data, then write as much
    /// of `data` as it takes. Returns `Ok(0)` if the device never became
    /// writable.
    fn write_timeout(&mut self, data: &[u8], timeout: Duration) -> Result<usize, PortError>;

    /// Number of received bytes waiting in the input buffer.
    fn bytes_to_read(&self) -> Result<usize, PortError>;

    /// Wait up to `timeout` for received data without consuming it.
    ///
    /// The default polls [`Transport::bytes_to_read`].
    fn wait_readable(&mut self, timeout: Duration) -> Result<bool, PortError> {
        let started = Instant::now();
        loop {
            if self.bytes_to_read()? > 0 {
                return Ok(true);
            }
            let Some(remaining) = timeout
                .checked_sub(started.elapsed())
                .filter(|r| !r.is_zero())
            else {
                return Ok(false);
            };
            thread::sleep(READABLE_POLL_INTERVAL.min(remaining));
        }
    }

    /// Apply line settings to the live handle.
    fn apply(&mut self, settings: &PortSettings) -> Result<(), PortError>;

    /// Discard pending bytes in the given direction.
    fn clear(&mut self, buffer: ClearBuffer) -> Result<(), PortError>;

    /// Block until all pending output has been transmitted.
    fn drain(&mut self) -> Result<(), PortError>;

    /// Assert (`true`) or release (`false`) a break condition.
    fn set_break(&mut self, level: bool) -> Result<(), PortError>;

    /// Drive the Request To Send line.
    fn set_rts(&mut self, level: bool) -> Result<(), PortError>;

    /// Drive the Data Terminal Ready line.
    fn set_dtr(&mut self, level: bool) -> Result<(), PortError>;

    /// Read one modem status line.
    fn read_modem_line(&mut self, line: ModemLine) -> Result<bool, PortError>;

    /// Read all modem status lines.
    fn modem_status(&mut self) -> Result<ModemStatus, PortError> {
        Ok(ModemStatus {
            cts: self.read_modem_line(ModemLine::Cts)?,
            dsr: self.read_modem_line(ModemLine::Dsr)?,
            ri: self.read_modem_line(ModemLine::Ri)?,
            cd: self.read_modem_line(ModemLine::Cd)?,
        })
    }

    /// Obtain a second handle to the same device.
    ///
    /// The clone shares the device but has its own timeout state, so the
    /// read path and the write path can each hold one.
    fn try_clone(&self) -> Result<Box<dyn Transport>, PortError>;
}

/// Opens device paths into transports.
pub trait Connector: Send + Sync + std::fmt::Debug {
    /// Open `path` and configure it with `settings`.
    ///
    /// Implementations report every failure (missing device, permission,
    /// unsupported setting) as [`PortError::OpenFailed`].
    fn connect(&self, path: &str, settings: &PortSettings)
        -> Result<Box<dyn Transport>, PortError>;
}
