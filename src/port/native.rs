//! System serial devices through the `serialport` crate.
//!
//! [`SystemConnector`] is the default connector of every
//! [`SerialPort`](super::SerialPort).

use super::error::PortError;
use super::settings::{Parity, PortSettings};
use super::traits::{ClearBuffer, Connector, ModemLine, Transport};
use serde::Serialize;
use serialport::{SerialPort as _, SerialPortBuilder, SerialPortInfo, SerialPortType};
use std::io::{ErrorKind, Read, Write};
use std::time::Duration;

/// Linux keeps a TTY handle so mark/space parity can be set through termios.
#[cfg(target_os = "linux")]
type DevicePort = serialport::TTYPort;
#[cfg(not(target_os = "linux"))]
type DevicePort = Box<dyn serialport::SerialPort>;

/// Whether mark and space parity can be set on this platform (`CMSPAR`).
const STICK_PARITY: bool = cfg!(target_os = "linux");

/// Opens real serial devices.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemConnector;

impl Connector for SystemConnector {
    fn connect(
        &self,
        path: &str,
        settings: &PortSettings,
    ) -> Result<Box<dyn Transport>, PortError> {
        let (parity, stick) =
            line_parity(settings.parity).map_err(|e| PortError::open_failed(path, e))?;

        let builder = serialport::new(path, settings.baud_rate)
            .data_bits(settings.data_bits.into())
            .flow_control(settings.flow_control.into())
            .parity(parity)
            .stop_bits(settings.stop_bits.into())
            .timeout(Duration::ZERO);
        let port = open_device(&builder).map_err(|e| PortError::open_failed(path, e))?;
        set_stick_parity(&port, stick).map_err(|e| PortError::open_failed(path, e))?;

        Ok(Box::new(NativeTransport {
            port,
            name: path.to_string(),
            io_timeout: Some(Duration::ZERO),
        }))
    }
}

/// Map a parity onto what `serialport` understands, plus whether `CMSPAR`
/// goes on top. With `CMSPAR` set, odd parity sends a constant 1 (mark) and
/// even parity a constant 0 (space).
fn line_parity(parity: Parity) -> Result<(serialport::Parity, bool), PortError> {
    match parity {
        Parity::Mark if STICK_PARITY => Ok((serialport::Parity::Odd, true)),
        Parity::Space if STICK_PARITY => Ok((serialport::Parity::Even, true)),
        other => Ok((serialport::Parity::try_from(other)?, false)),
    }
}

#[cfg(target_os = "linux")]
fn open_device(builder: &SerialPortBuilder) -> serialport::Result<DevicePort> {
    builder.clone().open_native()
}

#[cfg(not(target_os = "linux"))]
fn open_device(builder: &SerialPortBuilder) -> serialport::Result<DevicePort> {
    builder.open()
}

#[cfg(target_os = "linux")]
fn clone_device(port: &DevicePort) -> serialport::Result<DevicePort> {
    port.try_clone_native()
}

#[cfg(not(target_os = "linux"))]
fn clone_device(port: &DevicePort) -> serialport::Result<DevicePort> {
    port.try_clone()
}

/// Set or clear `CMSPAR`, leaving every other termios flag as `serialport`
/// programmed it.
#[cfg(target_os = "linux")]
fn set_stick_parity(port: &DevicePort, enabled: bool) -> std::io::Result<()> {
    use std::mem::MaybeUninit;
    use std::os::unix::io::AsRawFd;

    let fd = port.as_raw_fd();
    let mut termios = MaybeUninit::<libc::termios>::uninit();
    // SAFETY: `fd` is an open TTY owned by `port`; tcgetattr fully
    // initializes `termios` when it returns 0.
    let mut termios = unsafe {
        if libc::tcgetattr(fd, termios.as_mut_ptr()) != 0 {
            return Err(std::io::Error::last_os_error());
        }
        termios.assume_init()
    };

    if enabled {
        termios.c_cflag |= libc::CMSPAR;
    } else {
        termios.c_cflag &= !libc::CMSPAR;
    }

    // SAFETY: `termios` is a valid struct read back from the same fd.
    if unsafe { libc::tcsetattr(fd, libc::TCSANOW, &termios) } != 0 {
        return Err(std::io::Error::last_os_error());
    }
    Ok(())
}

#[cfg(not(target_os = "linux"))]
fn set_stick_parity(_port: &DevicePort, _enabled: bool) -> std::io::Result<()> {
    Ok(())
}

/// Handle to an open system serial device.
pub struct NativeTransport {
    port: DevicePort,
    /// The port name/path for identification.
    name: String,
    /// Timeout currently programmed into `port`, if known.
    io_timeout: Option<Duration>,
}

impl NativeTransport {
    fn program_timeout(&mut self, timeout: Duration) -> Result<(), PortError> {
        if self.io_timeout != Some(timeout) {
            self.port.set_timeout(timeout)?;
            self.io_timeout = Some(timeout);
        }
        Ok(())
    }
}

fn timed_out(err: &std::io::Error) -> bool {
    matches!(err.kind(), ErrorKind::TimedOut | ErrorKind::WouldBlock)
}

impl Transport for NativeTransport {
    fn read_timeout(&mut self, buffer: &mut [u8], timeout: Duration) -> Result<usize, PortError> {
        self.program_timeout(timeout)?;
        match self.port.read(buffer) {
            Ok(n) => Ok(n),
            Err(e) if timed_out(&e) => Ok(0),
            Err(e) if e.kind() == ErrorKind::Interrupted => Ok(0),
            Err(e) => Err(PortError::Io(e)),
        }
    }

    fn write_timeout(&mut self, data: &[u8], timeout: Duration) -> Result<usize, PortError> {
        self.program_timeout(timeout)?;
        match self.port.write(data) {
            Ok(n) => Ok(n),
            Err(e) if timed_out(&e) => Ok(0),
            Err(e) if e.kind() == ErrorKind::Interrupted => Ok(0),
            Err(e) => Err(PortError::Io(e)),
        }
    }

    fn bytes_to_read(&self) -> Result<usize, PortError> {
        Ok(self.port.bytes_to_read()? as usize)
    }

    fn apply(&mut self, settings: &PortSettings) -> Result<(), PortError> {
        let (parity, stick) = line_parity(settings.parity)?;
        self.port.set_baud_rate(settings.baud_rate)?;
        self.port.set_data_bits(settings.data_bits.into())?;
        self.port.set_parity(parity)?;
        set_stick_parity(&self.port, stick)?;
        self.port.set_stop_bits(settings.stop_bits.into())?;
        self.port.set_flow_control(settings.flow_control.into())?;
        Ok(())
    }

    fn clear(&mut self, buffer: ClearBuffer) -> Result<(), PortError> {
        self.port.clear(buffer).map_err(PortError::Serial)
    }

    fn drain(&mut self) -> Result<(), PortError> {
        self.port.flush().map_err(PortError::Io)
    }

    fn set_break(&mut self, level: bool) -> Result<(), PortError> {
        if level {
            self.port.set_break()?;
        } else {
            self.port.clear_break()?;
        }
        Ok(())
    }

    fn set_rts(&mut self, level: bool) -> Result<(), PortError> {
        self.port
            .write_request_to_send(level)
            .map_err(PortError::Serial)
    }

    fn set_dtr(&mut self, level: bool) -> Result<(), PortError> {
        self.port
            .write_data_terminal_ready(level)
            .map_err(PortError::Serial)
    }

    fn read_modem_line(&mut self, line: ModemLine) -> Result<bool, PortError> {
        let level = match line {
            ModemLine::Cts => self.port.read_clear_to_send()?,
            ModemLine::Dsr => self.port.read_data_set_ready()?,
            ModemLine::Ri => self.port.read_ring_indicator()?,
            ModemLine::Cd => self.port.read_carrier_detect()?,
        };
        Ok(level)
    }

    fn try_clone(&self) -> Result<Box<dyn Transport>, PortError> {
        Ok(Box::new(NativeTransport {
            port: clone_device(&self.port)?,
            name: self.name.clone(),
            io_timeout: None,
        }))
    }
}

impl std::fmt::Debug for NativeTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NativeTransport")
            .field("name", &self.name)
            .field("baud_rate", &self.port.baud_rate().ok())
            .finish()
    }
}

/// Information about an available serial port.
#[derive(Debug, Clone, Serialize)]
pub struct PortInfo {
    /// Port name (e.g., "/dev/ttyUSB0" or "COM3")
    pub name: String,
    /// USB vendor ID (if USB device)
    pub vid: Option<u16>,
    /// USB product ID (if USB device)
    pub pid: Option<u16>,
    pub manufacturer: Option<String>,
    pub product: Option<String>,
    pub serial_number: Option<String>,
}

impl From<SerialPortInfo> for PortInfo {
    fn from(info: SerialPortInfo) -> Self {
        match info.port_type {
            SerialPortType::UsbPort(usb) => Self {
                name: info.port_name,
                vid: Some(usb.vid),
                pid: Some(usb.pid),
                manufacturer: usb.manufacturer,
                product: usb.product,
                serial_number: usb.serial_number,
            },
            _ => Self {
                name: info.port_name,
                vid: None,
                pid: None,
                manufacturer: None,
                product: None,
                serial_number: None,
            },
        }
    }
}

/// List the serial ports present on this system, sorted by name.
pub fn list_ports() -> Result<Vec<PortInfo>, PortError> {
    let mut ports: Vec<PortInfo> = serialport::available_ports()?
        .into_iter()
        .map(PortInfo::from)
        .collect();
    ports.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(ports)
}
