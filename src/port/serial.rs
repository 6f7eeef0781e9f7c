//! The serial port proper.
//!
//! [`SerialPort`] splits its OS handle into a read half and a write half, each
//! behind its own lock, so one thread can read while another writes. Two reads
//! (or two writes) never overlap. Operations that need both halves always
//! take the read lock before the write lock.
//!
//! Every read and write computes its budget from the current [`Timeout`] when
//! it starts. Running out of time is not an error: the call returns the short
//! count and the caller decides what an incomplete transfer means.

use super::error::PortError;
use super::native::SystemConnector;
use super::settings::{DataBits, FlowControl, Parity, PortSettings, StopBits};
use super::timeout::Timeout;
use super::traits::{ClearBuffer, Connector, ModemLine, ModemStatus, Transport};
use parking_lot::{Mutex, MutexGuard};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, info, trace};

/// Wait slice used when a timeout blocks forever.
const BLOCKING_SLICE: Duration = Duration::from_secs(1);

/// Polling period of [`SerialPort::wait_for_change`].
const MODEM_POLL_INTERVAL: Duration = Duration::from_millis(10);

type Half = Option<Box<dyn Transport>>;

#[derive(Debug, Clone)]
struct PortConfig {
    path: String,
    settings: PortSettings,
}

/// A serial device with deadline-bounded I/O and line framing.
///
/// All methods take `&self`; share the port between threads with an `Arc`.
///
/// # Example
/// ```no_run
/// use atlas_serial::port::{PortSettings, SerialPort, Timeout};
///
/// let settings = PortSettings {
///     baud_rate: 115_200,
///     timeout: Timeout::simple(500),
///     ..PortSettings::default()
/// };
/// let port = SerialPort::new("/dev/ttyUSB0", settings);
/// port.open()?;
/// port.write("status\r\n")?;
/// let reply = port.read_line_string(256, "\r\n")?;
/// # Ok::<(), atlas_serial::PortError>(())
/// ```
pub struct SerialPort {
    connector: Arc<dyn Connector>,
    config: Mutex<PortConfig>,
    reader: Mutex<Half>,
    writer: Mutex<Half>,
    open: AtomicBool,
}

impl SerialPort {
    /// Create a closed port for a system device.
    pub fn new(path: impl Into<String>, settings: PortSettings) -> Self {
        Self::with_connector(path, settings, Arc::new(SystemConnector))
    }

    /// Create a closed port that opens its device through `connector`.
    pub fn with_connector(
        path: impl Into<String>,
        settings: PortSettings,
        connector: Arc<dyn Connector>,
    ) -> Self {
        Self {
            connector,
            config: Mutex::new(PortConfig {
                path: path.into(),
                settings,
            }),
            reader: Mutex::new(None),
            writer: Mutex::new(None),
            open: AtomicBool::new(false),
        }
    }

    // ---- lifecycle ----

    /// Open the device and apply every stored setting to it.
    ///
    /// On failure the port stays closed.
    pub fn open(&self) -> Result<(), PortError> {
        let mut reader = self.reader.lock();
        let mut writer = self.writer.lock();
        if reader.is_some() {
            return Err(PortError::AlreadyOpen);
        }
        self.open_halves(&mut reader, &mut writer)
    }

    /// Release the device. Closing a closed port does nothing.
    pub fn close(&self) {
        let mut reader = self.reader.lock();
        let mut writer = self.writer.lock();
        self.close_halves(&mut reader, &mut writer);
    }

    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }

    fn open_halves(
        &self,
        reader: &mut MutexGuard<'_, Half>,
        writer: &mut MutexGuard<'_, Half>,
    ) -> Result<(), PortError> {
        let PortConfig { path, settings } = self.config.lock().clone();
        if path.is_empty() {
            return Err(PortError::open_failed(path, "empty port path"));
        }

        let mut read_half = self.connector.connect(&path, &settings)?;
        read_half
            .clear(ClearBuffer::Input)
            .map_err(|e| PortError::open_failed(&path, e))?;
        let write_half = read_half
            .try_clone()
            .map_err(|e| PortError::open_failed(&path, e))?;

        **reader = Some(read_half);
        **writer = Some(write_half);
        self.open.store(true, Ordering::Release);
        info!(
            port = %path,
            baud_rate = settings.baud_rate,
            "Serial port opened"
        );
        Ok(())
    }

    fn close_halves(&self, reader: &mut MutexGuard<'_, Half>, writer: &mut MutexGuard<'_, Half>) {
        let was_open = reader.take().is_some() | writer.take().is_some();
        self.open.store(false, Ordering::Release);
        if was_open {
            info!(port = %self.config.lock().path, "Serial port closed");
        }
    }

    // ---- configuration ----

    /// Change the device path. An open port is closed and reopened on the
    /// new path; if that reopen fails the port is left closed.
    pub fn set_port(&self, path: impl Into<String>) -> Result<(), PortError> {
        let mut reader = self.reader.lock();
        let mut writer = self.writer.lock();
        let was_open = reader.is_some();
        if was_open {
            self.close_halves(&mut reader, &mut writer);
        }
        let path = path.into();
        debug!(port = %path, was_open, "Serial port path changed");
        self.config.lock().path = path;
        if was_open {
            self.open_halves(&mut reader, &mut writer)?;
        }
        Ok(())
    }

    pub fn port(&self) -> String {
        self.config.lock().path.clone()
    }

    /// Replace the timeout. Calls already in progress keep their budget.
    pub fn set_timeout(&self, timeout: Timeout) {
        self.config.lock().settings.timeout = timeout;
    }

    pub fn timeout(&self) -> Timeout {
        self.config.lock().settings.timeout
    }

    pub fn settings(&self) -> PortSettings {
        self.config.lock().settings
    }

    pub fn set_baud_rate(&self, baud_rate: u32) -> Result<(), PortError> {
        self.reconfigure(|s| s.baud_rate = baud_rate)
    }

    pub fn baud_rate(&self) -> u32 {
        self.settings().baud_rate
    }

    pub fn set_data_bits(&self, data_bits: DataBits) -> Result<(), PortError> {
        self.reconfigure(|s| s.data_bits = data_bits)
    }

    pub fn data_bits(&self) -> DataBits {
        self.settings().data_bits
    }

    pub fn set_parity(&self, parity: Parity) -> Result<(), PortError> {
        self.reconfigure(|s| s.parity = parity)
    }

    pub fn parity(&self) -> Parity {
        self.settings().parity
    }

    pub fn set_stop_bits(&self, stop_bits: StopBits) -> Result<(), PortError> {
        self.reconfigure(|s| s.stop_bits = stop_bits)
    }

    pub fn stop_bits(&self) -> StopBits {
        self.settings().stop_bits
    }

    pub fn set_flow_control(&self, flow_control: FlowControl) -> Result<(), PortError> {
        self.reconfigure(|s| s.flow_control = flow_control)
    }

    pub fn flow_control(&self) -> FlowControl {
        self.settings().flow_control
    }

    /// Update the stored settings, pushing them to the live handle first when
    /// open. A setting the device rejects is not stored.
    ///
    /// Only the changed field is committed, so a `set_timeout` racing with
    /// the device update is kept.
    fn reconfigure(&self, change: impl Fn(&mut PortSettings)) -> Result<(), PortError> {
        let mut writer = self.writer.lock();
        let mut settings = self.settings();
        change(&mut settings);
        if let Some(handle) = writer.as_deref_mut() {
            handle.apply(&settings)?;
        }
        let mut config = self.config.lock();
        change(&mut config.settings);
        debug!(settings = ?config.settings, "Serial port reconfigured");
        Ok(())
    }

    // ---- reading ----

    /// Read up to `buffer.len()` bytes, waiting at most the read budget for
    /// that many bytes. Returns the number of bytes read.
    pub fn read(&self, buffer: &mut [u8]) -> Result<usize, PortError> {
        let mut reader = self.reader.lock();
        let handle = reader.as_deref_mut().ok_or(PortError::NotOpen("read"))?;
        read_within(handle, buffer, &self.settings())
    }

    /// Read up to `size` bytes, appending them to `buffer`.
    pub fn read_to_vec(&self, buffer: &mut Vec<u8>, size: usize) -> Result<usize, PortError> {
        let start = buffer.len();
        buffer.resize(start + size, 0);
        let result = self.read(&mut buffer[start..]);
        let read = *result.as_ref().unwrap_or(&0);
        buffer.truncate(start + read);
        result
    }

    /// Read up to `size` bytes, appending them to `buffer` as text.
    ///
    /// Invalid UTF-8 is replaced; the returned count is in bytes received.
    pub fn read_to_string(&self, buffer: &mut String, size: usize) -> Result<usize, PortError> {
        let mut bytes = Vec::with_capacity(size);
        let read = self.read_to_vec(&mut bytes, size)?;
        buffer.push_str(&String::from_utf8_lossy(&bytes));
        Ok(read)
    }

    /// Read up to `size` bytes as text.
    pub fn read_string(&self, size: usize) -> Result<String, PortError> {
        let mut buffer = String::new();
        self.read_to_string(&mut buffer, size)?;
        Ok(buffer)
    }

    /// Read one line, delimiter included, appending it to `buffer`.
    ///
    /// Stops when the received bytes end with `eol`, when a single byte
    /// fails to arrive within its budget, or after `max_size` bytes. The
    /// count alone does not say which; check whether `buffer` ends with `eol`.
    pub fn read_line(
        &self,
        buffer: &mut Vec<u8>,
        max_size: usize,
        eol: impl AsRef<[u8]>,
    ) -> Result<usize, PortError> {
        let eol = eol.as_ref();
        let mut reader = self.reader.lock();
        let handle = reader.as_deref_mut().ok_or(PortError::NotOpen("readline"))?;
        let settings = self.settings();

        let start = buffer.len();
        while buffer.len() - start < max_size {
            let Some(byte) = read_byte(handle, &settings)? else {
                break;
            };
            buffer.push(byte);
            if ends_with_delimiter(&buffer[start..], eol) {
                break;
            }
        }
        Ok(buffer.len() - start)
    }

    /// [`read_line`](Self::read_line) returning text.
    pub fn read_line_string(
        &self,
        max_size: usize,
        eol: impl AsRef<[u8]>,
    ) -> Result<String, PortError> {
        let mut buffer = Vec::new();
        self.read_line(&mut buffer, max_size, eol)?;
        Ok(String::from_utf8_lossy(&buffer).into_owned())
    }

    /// Read lines until a byte fails to arrive in time or `max_size` bytes
    /// have been consumed. A trailing fragment without delimiter is kept as
    /// the last element.
    pub fn read_lines(
        &self,
        max_size: usize,
        eol: impl AsRef<[u8]>,
    ) -> Result<Vec<String>, PortError> {
        let eol = eol.as_ref();
        let mut reader = self.reader.lock();
        let handle = reader.as_deref_mut().ok_or(PortError::NotOpen("readlines"))?;
        let settings = self.settings();

        let mut lines = Vec::new();
        let mut line = Vec::new();
        let mut consumed = 0;
        while consumed < max_size {
            let Some(byte) = read_byte(handle, &settings)? else {
                break;
            };
            consumed += 1;
            line.push(byte);
            if ends_with_delimiter(&line, eol) {
                lines.push(String::from_utf8_lossy(&line).into_owned());
                line.clear();
            }
        }
        if !line.is_empty() {
            lines.push(String::from_utf8_lossy(&line).into_owned());
        }
        Ok(lines)
    }

    /// Number of received bytes waiting to be read.
    pub fn available(&self) -> Result<usize, PortError> {
        let reader = self.reader.lock();
        let handle = reader.as_deref().ok_or(PortError::NotOpen("available"))?;
        handle.bytes_to_read()
    }

    /// Wait up to the read timeout's constant for data to arrive. Returns
    /// `true` if data is ready.
    pub fn wait_readable(&self) -> Result<bool, PortError> {
        let mut reader = self.reader.lock();
        let handle = reader
            .as_deref_mut()
            .ok_or(PortError::NotOpen("waitReadable"))?;
        let wait = self.settings().timeout.read_budget(0);
        match wait {
            Some(wait) => handle.wait_readable(wait),
            None => loop {
                if handle.wait_readable(BLOCKING_SLICE)? {
                    return Ok(true);
                }
            },
        }
    }

    /// Sleep for as long as `count` characters take on the wire at the
    /// configured baud rate and framing.
    pub fn wait_byte_times(&self, count: usize) {
        thread::sleep(self.settings().byte_times(count));
    }

    // ---- writing ----

    /// Write `data`, waiting at most the write budget for the device to take
    /// it. Returns the number of bytes written.
    pub fn write(&self, data: impl AsRef<[u8]>) -> Result<usize, PortError> {
        let data = data.as_ref();
        let mut writer = self.writer.lock();
        let handle = writer.as_deref_mut().ok_or(PortError::NotOpen("write"))?;
        write_within(handle, data, &self.settings())
    }

    /// Drain pending output and discard pending input.
    pub fn flush(&self) -> Result<(), PortError> {
        let mut reader = self.reader.lock();
        let mut writer = self.writer.lock();
        let (Some(read_half), Some(write_half)) = (reader.as_deref_mut(), writer.as_deref_mut())
        else {
            return Err(PortError::NotOpen("flush"));
        };
        write_half.drain()?;
        read_half.clear(ClearBuffer::Input)?;
        debug!("Serial port flushed");
        Ok(())
    }

    /// Discard received bytes that have not been read.
    pub fn flush_input(&self) -> Result<(), PortError> {
        let mut reader = self.reader.lock();
        let handle = reader
            .as_deref_mut()
            .ok_or(PortError::NotOpen("flushInput"))?;
        handle.clear(ClearBuffer::Input)
    }

    /// Discard written bytes that have not been transmitted.
    pub fn flush_output(&self) -> Result<(), PortError> {
        let mut writer = self.writer.lock();
        let handle = writer
            .as_deref_mut()
            .ok_or(PortError::NotOpen("flushOutput"))?;
        handle.clear(ClearBuffer::Output)
    }

    // ---- control lines ----

    /// Hold a break condition for `duration`, then release it.
    pub fn send_break(&self, duration: Duration) -> Result<(), PortError> {
        let mut writer = self.writer.lock();
        let handle = writer.as_deref_mut().ok_or(PortError::NotOpen("sendBreak"))?;
        handle.set_break(true)?;
        thread::sleep(duration);
        handle.set_break(false)
    }

    pub fn set_break(&self, level: bool) -> Result<(), PortError> {
        self.with_writer("setBreak", |h| h.set_break(level))
    }

    pub fn set_rts(&self, level: bool) -> Result<(), PortError> {
        self.with_writer("setRTS", |h| h.set_rts(level))
    }

    pub fn set_dtr(&self, level: bool) -> Result<(), PortError> {
        self.with_writer("setDTR", |h| h.set_dtr(level))
    }

    pub fn get_cts(&self) -> Result<bool, PortError> {
        self.with_reader("getCTS", |h| h.read_modem_line(ModemLine::Cts))
    }

    pub fn get_dsr(&self) -> Result<bool, PortError> {
        self.with_reader("getDSR", |h| h.read_modem_line(ModemLine::Dsr))
    }

    pub fn get_ri(&self) -> Result<bool, PortError> {
        self.with_reader("getRI", |h| h.read_modem_line(ModemLine::Ri))
    }

    pub fn get_cd(&self) -> Result<bool, PortError> {
        self.with_reader("getCD", |h| h.read_modem_line(ModemLine::Cd))
    }

    /// All modem status lines at once.
    pub fn modem_status(&self) -> Result<ModemStatus, PortError> {
        self.with_reader("modemStatus", |h| h.modem_status())
    }

    /// Block until CTS, DSR, RI or CD changes level.
    ///
    /// The read lock is only held while sampling, so reads keep running in
    /// between. Fails if the port is closed while waiting.
    pub fn wait_for_change(&self) -> Result<bool, PortError> {
        let initial = self.with_reader("waitForChange", |h| h.modem_status())?;
        loop {
            thread::sleep(MODEM_POLL_INTERVAL);
            let current = self.with_reader("waitForChange", |h| h.modem_status())?;
            if current != initial {
                trace!(?initial, ?current, "Modem status changed");
                return Ok(true);
            }
        }
    }

    fn with_reader<T>(
        &self,
        operation: &'static str,
        f: impl FnOnce(&mut dyn Transport) -> Result<T, PortError>,
    ) -> Result<T, PortError> {
        let mut reader = self.reader.lock();
        f(reader.as_deref_mut().ok_or(PortError::NotOpen(operation))?)
    }

    fn with_writer<T>(
        &self,
        operation: &'static str,
        f: impl FnOnce(&mut dyn Transport) -> Result<T, PortError>,
    ) -> Result<T, PortError> {
        let mut writer = self.writer.lock();
        f(writer.as_deref_mut().ok_or(PortError::NotOpen(operation))?)
    }
}

impl Drop for SerialPort {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for SerialPort {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let config = self.config.lock();
        f.debug_struct("SerialPort")
            .field("path", &config.path)
            .field("settings", &config.settings)
            .field("open", &self.is_open())
            .finish()
    }
}

/// Fill `buffer` within the read budget for `buffer.len()` bytes.
fn read_within(
    handle: &mut dyn Transport,
    buffer: &mut [u8],
    settings: &PortSettings,
) -> Result<usize, PortError> {
    let size = buffer.len();
    if size == 0 {
        return Ok(0);
    }
    let timeout = settings.timeout;
    let budget = timeout.read_budget(size);
    let started = Instant::now();

    // Whatever is already buffered costs no waiting.
    let mut read = handle.read_timeout(buffer, Duration::ZERO)?;
    while read < size {
        let remaining = match time_left(budget, started) {
            Some(remaining) => remaining,
            None => break,
        };
        let wait = timeout
            .inter_byte()
            .map_or(remaining, |gap| gap.min(remaining));
        let n = handle.read_timeout(&mut buffer[read..], wait)?;
        read += n;

        // Without an inter-byte bound, give the rest of the request time to
        // arrive instead of returning to the device once per byte.
        if n > 0 && read < size && timeout.inter_byte().is_none() {
            let missing = (size - read).saturating_sub(handle.bytes_to_read()?);
            if missing > 0 {
                if let Some(remaining) = time_left(budget, started) {
                    thread::sleep(settings.byte_times(missing).min(remaining));
                }
            }
        }
    }
    if read < size {
        trace!(requested = size, read, "Read returned short");
    }
    Ok(read)
}

/// Write `data` within the write budget for `data.len()` bytes. The first
/// attempt is made even when the budget is zero.
fn write_within(
    handle: &mut dyn Transport,
    data: &[u8],
    settings: &PortSettings,
) -> Result<usize, PortError> {
    let budget = settings.timeout.write_budget(data.len());
    let started = Instant::now();
    let mut written = 0;
    let mut first_attempt = true;
    while written < data.len() {
        let wait = match time_left(budget, started) {
            Some(remaining) => remaining,
            None if first_attempt => Duration::ZERO,
            None => break,
        };
        first_attempt = false;
        written += handle.write_timeout(&data[written..], wait)?;
    }
    if written < data.len() {
        trace!(requested = data.len(), written, "Write returned short");
    }
    Ok(written)
}

/// Time left in `budget`, a slice of waiting for unbounded budgets, or
/// `None` once the budget is spent.
fn time_left(budget: Option<Duration>, started: Instant) -> Option<Duration> {
    match budget {
        Some(budget) => budget
            .checked_sub(started.elapsed())
            .filter(|r| !r.is_zero()),
        None => Some(BLOCKING_SLICE),
    }
}

fn read_byte(
    handle: &mut dyn Transport,
    settings: &PortSettings,
) -> Result<Option<u8>, PortError> {
    let mut byte = [0u8; 1];
    Ok((read_within(handle, &mut byte, settings)? == 1).then_some(byte[0]))
}

/// An empty delimiter never matches.
fn ends_with_delimiter(line: &[u8], eol: &[u8]) -> bool {
    !eol.is_empty() && line.ends_with(eol)
}
