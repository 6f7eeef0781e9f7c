//! Tokio front end for [`SerialPort`].
//!
//! Port operations block their thread, so every call is moved onto Tokio's
//! blocking pool with `spawn_blocking`. Reads and writes issued from two tasks
//! still run concurrently because the underlying port keeps separate read and
//! write locks.
//!
//! Note: This module is gated behind the `async` feature flag.

use super::error::PortError;
use super::serial::SerialPort;
use async_trait::async_trait;
use std::sync::Arc;

/// Async trait for serial port operations using Tokio.
#[async_trait]
pub trait AsyncSerialPortAdapter: Send + Sync {
    /// Write bytes within the port's write budget.
    ///
    /// Returns the number of bytes actually written.
    async fn write_bytes(&self, data: &[u8]) -> Result<usize, PortError>;

    /// Read up to `size` bytes within the port's read budget.
    async fn read_bytes(&self, size: usize) -> Result<Vec<u8>, PortError>;

    /// Read one line terminated by `eol`, capped at `max_size` bytes.
    async fn read_line(&self, max_size: usize, eol: &str) -> Result<String, PortError>;

    /// Get the name/path of this serial port.
    fn name(&self) -> String;
}

/// Shares a [`SerialPort`] with async code.
#[derive(Debug, Clone)]
pub struct AsyncSerialPort {
    inner: Arc<SerialPort>,
}

impl AsyncSerialPort {
    pub fn new(port: SerialPort) -> Self {
        Self::from_arc(Arc::new(port))
    }

    pub fn from_arc(port: Arc<SerialPort>) -> Self {
        Self { inner: port }
    }

    /// The wrapped port, for synchronous use.
    pub fn inner(&self) -> &Arc<SerialPort> {
        &self.inner
    }

    pub async fn open(&self) -> Result<(), PortError> {
        self.run(|port| port.open()).await
    }

    pub async fn close(&self) -> Result<(), PortError> {
        self.run(|port| {
            port.close();
            Ok(())
        })
        .await
    }

    pub async fn read_lines(
        &self,
        max_size: usize,
        eol: impl AsRef<[u8]> + Send,
    ) -> Result<Vec<String>, PortError> {
        let eol = eol.as_ref().to_vec();
        self.run(move |port| port.read_lines(max_size, &eol)).await
    }

    pub async fn flush(&self) -> Result<(), PortError> {
        self.run(|port| port.flush()).await
    }

    async fn run<T, F>(&self, f: F) -> Result<T, PortError>
    where
        T: Send + 'static,
        F: FnOnce(&SerialPort) -> Result<T, PortError> + Send + 'static,
    {
        let port = Arc::clone(&self.inner);
        tokio::task::spawn_blocking(move || f(port.as_ref()))
            .await
            .map_err(|e| PortError::Io(std::io::Error::other(e)))?
    }
}

#[async_trait]
impl AsyncSerialPortAdapter for AsyncSerialPort {
    async fn write_bytes(&self, data: &[u8]) -> Result<usize, PortError> {
        let data = data.to_vec();
        self.run(move |port| port.write(&data)).await
    }

    async fn read_bytes(&self, size: usize) -> Result<Vec<u8>, PortError> {
        self.run(move |port| {
            let mut buffer = Vec::with_capacity(size);
            port.read_to_vec(&mut buffer, size)?;
            Ok(buffer)
        })
        .await
    }

    async fn read_line(&self, max_size: usize, eol: &str) -> Result<String, PortError> {
        let eol = eol.to_string();
        self.run(move |port| port.read_line_string(max_size, &eol))
            .await
    }

    fn name(&self) -> String {
        self.inner.port()
    }
}
