//! Shared test utilities for atlas-serial integration tests.
//!
//! Builds `SerialPort`s over the in-memory mock backend so tests can feed
//! input, inspect output and flip modem lines without hardware.

#![allow(dead_code)]

use atlas_serial::port::{MockConnector, MockDevice, PortSettings, SerialPort, Timeout};
use std::sync::Arc;
use std::time::Duration;

/// Path every mock fixture registers its device under.
pub const MOCK_PATH: &str = "/dev/ttyMOCK0";

/// A closed port wired to a fresh mock device.
pub struct MockFixture {
    pub port: SerialPort,
    pub device: MockDevice,
    pub connector: Arc<MockConnector>,
}

impl MockFixture {
    pub fn new(settings: PortSettings) -> Self {
        let connector = Arc::new(MockConnector::new());
        let device = connector.add_device(MOCK_PATH);
        let port = SerialPort::with_connector(MOCK_PATH, settings, connector.clone());
        Self {
            port,
            device,
            connector,
        }
    }

    /// Default settings with the given timeout.
    pub fn with_timeout(timeout: Timeout) -> Self {
        Self::new(settings_with(timeout))
    }

    /// Like [`Self::with_timeout`], already open.
    pub fn opened(timeout: Timeout) -> Self {
        let fixture = Self::with_timeout(timeout);
        fixture.port.open().expect("mock port should open");
        fixture
    }

    /// Open fixture whose device echoes every write back.
    pub fn loopback(timeout: Timeout) -> Self {
        let fixture = Self::opened(timeout);
        fixture.device.set_loopback(true);
        fixture
    }
}

pub fn settings_with(timeout: Timeout) -> PortSettings {
    PortSettings {
        timeout,
        ..PortSettings::default()
    }
}

/// Read timeout of `constant_ms` plus `per_byte_ms` per requested byte,
/// without an inter-byte limit.
pub fn read_timeout(constant_ms: u32, per_byte_ms: u32) -> Timeout {
    Timeout::new(Timeout::MAX, constant_ms, per_byte_ms, constant_ms, per_byte_ms)
}

/// Slack allowed for thread scheduling when checking deadlines.
pub const SCHEDULING_SLACK: Duration = Duration::from_millis(150);

/// Assert an operation returned no earlier than `at_least` and no later than
/// `at_most` plus scheduling slack.
pub fn assert_elapsed_between(elapsed: Duration, at_least: Duration, at_most: Duration) {
    assert!(
        elapsed >= at_least,
        "returned after {:?}, expected at least {:?}",
        elapsed,
        at_least
    );
    assert!(
        elapsed <= at_most + SCHEDULING_SLACK,
        "returned after {:?}, expected at most {:?}",
        elapsed,
        at_most
    );
}
