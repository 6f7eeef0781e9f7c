//! In-memory serial devices for tests and demos.
//!
//! A [`MockConnector`] holds a set of [`MockDevice`]s keyed by path. Opening a
//! path that was never registered fails like a missing device node. The test
//! side keeps a `MockDevice` clone to feed input, inspect output, flip modem
//! lines and inject faults while a `SerialPort` uses the same device.
//!
//! # Example
//! ```
//! use atlas_serial::port::{MockConnector, PortSettings, SerialPort};
//! use std::sync::Arc;
//!
//! let connector = Arc::new(MockConnector::new());
//! let device = connector.add_device("/dev/mock0");
//! device.feed(b"hello\n");
//!
//! let port = SerialPort::with_connector("/dev/mock0", PortSettings::default(), connector);
//! port.open()?;
//! assert_eq!(port.read_line_string(64, "\n")?, "hello\n");
//!
//! port.write(b"ACK")?;
//! assert_eq!(device.written(), b"ACK");
//! # Ok::<(), atlas_serial::PortError>(())
//! ```

use super::error::PortError;
use super::settings::PortSettings;
use super::traits::{ClearBuffer, Connector, ModemLine, ModemStatus, Transport};
use parking_lot::{Condvar, Mutex, MutexGuard};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// State of one simulated device, shared by every handle to it.
#[derive(Debug, Default)]
struct DeviceState {
    /// Bytes waiting to be read by the port.
    rx: VecDeque<u8>,
    /// Everything the port has written.
    tx: Vec<u8>,
    /// Written bytes are also queued for reading.
    loopback: bool,
    /// Settings most recently applied to the device.
    applied: Option<PortSettings>,
    /// Highest baud rate the device accepts.
    max_baud: Option<u32>,
    /// Number of live handles.
    open_handles: usize,
    /// Writes wait out their timeout and accept nothing.
    stalled: bool,
    /// Every read and write fails with an I/O error.
    faulted: bool,
    /// How long applying settings to a live handle takes.
    apply_delay: Duration,
    break_level: bool,
    rts: bool,
    dtr: bool,
    modem: ModemStatus,
    input_clears: usize,
    output_clears: usize,
    drains: usize,
}

#[derive(Debug, Default)]
struct Shared {
    state: Mutex<DeviceState>,
    changed: Condvar,
}

/// Test-side view of a simulated serial device.
#[derive(Debug, Clone, Default)]
pub struct MockDevice {
    shared: Arc<Shared>,
}

impl MockDevice {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, DeviceState> {
        self.shared.state.lock()
    }

    fn update(&self, f: impl FnOnce(&mut DeviceState)) {
        let mut state = self.lock();
        f(&mut state);
        drop(state);
        self.shared.changed.notify_all();
    }

    /// Queue bytes to be received by the port.
    pub fn feed(&self, data: &[u8]) {
        self.update(|s| s.rx.extend(data));
    }

    /// Copy of everything the port has written so far.
    pub fn written(&self) -> Vec<u8> {
        self.lock().tx.clone()
    }

    /// Take and clear the written bytes.
    pub fn take_written(&self) -> Vec<u8> {
        std::mem::take(&mut self.lock().tx)
    }

    /// Bytes queued for the port and not yet read.
    pub fn pending_input(&self) -> usize {
        self.lock().rx.len()
    }

    /// Wire TX back to RX.
    pub fn set_loopback(&self, enabled: bool) {
        self.update(|s| s.loopback = enabled);
    }

    /// Make writes block for their whole budget without accepting data.
    pub fn set_stalled(&self, stalled: bool) {
        self.update(|s| s.stalled = stalled);
    }

    /// Make reads and writes fail with an I/O error.
    pub fn set_faulted(&self, faulted: bool) {
        self.update(|s| s.faulted = faulted);
    }

    /// Make every settings change on a live handle take `delay`.
    pub fn set_apply_delay(&self, delay: Duration) {
        self.update(|s| s.apply_delay = delay);
    }

    /// Reject any baud rate above `max`.
    pub fn set_max_baud(&self, max: u32) {
        self.update(|s| s.max_baud = Some(max));
    }

    /// Set the modem status lines seen by the port.
    pub fn set_modem_status(&self, status: ModemStatus) {
        self.update(|s| s.modem = status);
    }

    pub fn applied_settings(&self) -> Option<PortSettings> {
        self.lock().applied
    }

    /// Whether any handle to the device is currently open.
    pub fn is_open(&self) -> bool {
        self.lock().open_handles > 0
    }

    pub fn open_handles(&self) -> usize {
        self.lock().open_handles
    }

    pub fn break_level(&self) -> bool {
        self.lock().break_level
    }

    pub fn rts(&self) -> bool {
        self.lock().rts
    }

    pub fn dtr(&self) -> bool {
        self.lock().dtr
    }

    /// Times the input and output buffers were discarded.
    pub fn clear_counts(&self) -> (usize, usize) {
        let state = self.lock();
        (state.input_clears, state.output_clears)
    }

    /// Times pending output was drained.
    pub fn drain_count(&self) -> usize {
        self.lock().drains
    }

    fn check_settings(&self, settings: &PortSettings) -> Result<(), PortError> {
        match self.lock().max_baud {
            Some(max) if settings.baud_rate > max => Err(PortError::unsupported(format!(
                "baud rate {} exceeds device maximum {}",
                settings.baud_rate, max
            ))),
            _ => Ok(()),
        }
    }

    fn handle(&self, name: &str) -> MockTransport {
        self.update(|s| s.open_handles += 1);
        MockTransport {
            device: self.clone(),
            name: name.to_string(),
        }
    }
}

fn deadline(timeout: Duration) -> Option<Instant> {
    Instant::now().checked_add(timeout)
}

fn io_fault() -> PortError {
    PortError::Io(std::io::Error::new(
        std::io::ErrorKind::BrokenPipe,
        "mock device fault",
    ))
}

/// Connector over a registry of [`MockDevice`]s.
#[derive(Debug, Default)]
pub struct MockConnector {
    devices: Mutex<HashMap<String, MockDevice>>,
}

impl MockConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a device under `path`, replacing any previous one.
    pub fn add_device(&self, path: impl Into<String>) -> MockDevice {
        let device = MockDevice::new();
        self.devices.lock().insert(path.into(), device.clone());
        device
    }

    /// Unregister `path`; later opens of it fail.
    pub fn remove_device(&self, path: &str) -> Option<MockDevice> {
        self.devices.lock().remove(path)
    }

    pub fn device(&self, path: &str) -> Option<MockDevice> {
        self.devices.lock().get(path).cloned()
    }
}

impl Connector for MockConnector {
    fn connect(
        &self,
        path: &str,
        settings: &PortSettings,
    ) -> Result<Box<dyn Transport>, PortError> {
        let device = self
            .device(path)
            .ok_or_else(|| PortError::open_failed(path, "No such file or directory"))?;
        device
            .check_settings(settings)
            .map_err(|e| PortError::open_failed(path, e))?;
        device.update(|s| s.applied = Some(*settings));
        Ok(Box::new(device.handle(path)))
    }
}

/// Port-side handle to a [`MockDevice`].
#[derive(Debug)]
pub struct MockTransport {
    device: MockDevice,
    name: String,
}

impl MockTransport {
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl Drop for MockTransport {
    fn drop(&mut self) {
        self.device
            .update(|s| s.open_handles = s.open_handles.saturating_sub(1));
    }
}

impl Transport for MockTransport {
    fn read_timeout(&mut self, buffer: &mut [u8], timeout: Duration) -> Result<usize, PortError> {
        let until = deadline(timeout);
        let mut state = self.device.lock();
        loop {
            if state.faulted {
                return Err(io_fault());
            }
            if !state.rx.is_empty() {
                let n = buffer.len().min(state.rx.len());
                for (slot, byte) in buffer.iter_mut().zip(state.rx.drain(..n)) {
                    *slot = byte;
                }
                return Ok(n);
            }
            match until {
                Some(until) => {
                    if Instant::now() >= until {
                        return Ok(0);
                    }
                    self.device.shared.changed.wait_until(&mut state, until);
                }
                None => self.device.shared.changed.wait(&mut state),
            }
        }
    }

    fn write_timeout(&mut self, data: &[u8], timeout: Duration) -> Result<usize, PortError> {
        let until = deadline(timeout);
        let mut state = self.device.lock();
        loop {
            if state.faulted {
                return Err(io_fault());
            }
            if !state.stalled {
                break;
            }
            match until {
                Some(until) => {
                    if Instant::now() >= until {
                        return Ok(0);
                    }
                    self.device.shared.changed.wait_until(&mut state, until);
                }
                None => self.device.shared.changed.wait(&mut state),
            }
        }
        state.tx.extend_from_slice(data);
        if state.loopback {
            state.rx.extend(data);
        }
        drop(state);
        self.device.shared.changed.notify_all();
        Ok(data.len())
    }

    fn bytes_to_read(&self) -> Result<usize, PortError> {
        Ok(self.device.pending_input())
    }

    fn wait_readable(&mut self, timeout: Duration) -> Result<bool, PortError> {
        let until = deadline(timeout);
        let mut state = self.device.lock();
        loop {
            if state.faulted {
                return Err(io_fault());
            }
            if !state.rx.is_empty() {
                return Ok(true);
            }
            match until {
                Some(until) => {
                    if Instant::now() >= until {
                        return Ok(false);
                    }
                    self.device.shared.changed.wait_until(&mut state, until);
                }
                None => self.device.shared.changed.wait(&mut state),
            }
        }
    }

    fn apply(&mut self, settings: &PortSettings) -> Result<(), PortError> {
        let delay = self.device.lock().apply_delay;
        if !delay.is_zero() {
            std::thread::sleep(delay);
        }
        self.device.check_settings(settings)?;
        self.device.update(|s| s.applied = Some(*settings));
        Ok(())
    }

    fn clear(&mut self, buffer: ClearBuffer) -> Result<(), PortError> {
        self.device.update(|s| {
            if matches!(buffer, ClearBuffer::Input | ClearBuffer::All) {
                s.rx.clear();
                s.input_clears += 1;
            }
            if matches!(buffer, ClearBuffer::Output | ClearBuffer::All) {
                s.output_clears += 1;
            }
        });
        Ok(())
    }

    fn drain(&mut self) -> Result<(), PortError> {
        self.device.update(|s| s.drains += 1);
        Ok(())
    }

    fn set_break(&mut self, level: bool) -> Result<(), PortError> {
        self.device.update(|s| s.break_level = level);
        Ok(())
    }

    fn set_rts(&mut self, level: bool) -> Result<(), PortError> {
        self.device.update(|s| s.rts = level);
        Ok(())
    }

    fn set_dtr(&mut self, level: bool) -> Result<(), PortError> {
        self.device.update(|s| s.dtr = level);
        Ok(())
    }

    fn read_modem_line(&mut self, line: ModemLine) -> Result<bool, PortError> {
        let modem = self.device.lock().modem;
        Ok(match line {
            ModemLine::Cts => modem.cts,
            ModemLine::Dsr => modem.dsr,
            ModemLine::Ri => modem.ri,
            ModemLine::Cd => modem.cd,
        })
    }

    fn try_clone(&self) -> Result<Box<dyn Transport>, PortError> {
        Ok(Box::new(self.device.handle(&self.name)))
    }
}
