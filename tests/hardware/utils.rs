//! Utility functions for hardware testing.
//!
//! Reads the test port from the environment and provides timing helpers.

use atlas_serial::port::{list_ports, PortSettings, SerialPort, Timeout};
use std::env;
use std::time::{Duration, Instant};

/// Test port configuration from environment.
pub struct TestPortConfig {
    pub port_name: String,
    pub baud_rate: u32,
    pub loopback_enabled: bool,
}

impl TestPortConfig {
    /// Get test configuration from environment variables.
    ///
    /// - `TEST_PORT`: device path, required
    /// - `TEST_BAUD`: baud rate, default 9600
    /// - `TEST_LOOPBACK=1`: TX is wired to RX
    pub fn from_env() -> Option<Self> {
        let port_name = env::var("TEST_PORT").ok()?;
        let baud_rate = env::var("TEST_BAUD")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(9600);
        let loopback_enabled = env::var("TEST_LOOPBACK").ok().as_deref() == Some("1");

        Some(TestPortConfig {
            port_name,
            baud_rate,
            loopback_enabled,
        })
    }

    pub fn settings(&self, timeout: Timeout) -> PortSettings {
        PortSettings {
            baud_rate: self.baud_rate,
            timeout,
            ..PortSettings::default()
        }
    }
}

/// An open port on the configured test device.
pub struct PortTestFixture {
    pub port: SerialPort,
    pub config: TestPortConfig,
}

impl PortTestFixture {
    /// Open the test port with a one second constant timeout.
    pub fn setup() -> Option<Self> {
        Self::setup_with(Timeout::simple(1000))
    }

    pub fn setup_with(timeout: Timeout) -> Option<Self> {
        let config = TestPortConfig::from_env()?;

        println!(
            "Setting up test fixture for {} at {} baud",
            config.port_name, config.baud_rate
        );

        let port = SerialPort::new(config.port_name.clone(), config.settings(timeout));
        if let Err(e) = port.open() {
            println!("Failed to open port: {}", e);
            return None;
        }
        if let Err(e) = port.flush() {
            println!("Failed to flush port: {}", e);
            return None;
        }

        Some(PortTestFixture { port, config })
    }

    pub fn is_loopback(&self) -> bool {
        self.config.loopback_enabled
    }
}

/// Check if a specific port is listed by the system.
pub fn is_port_available(port_name: &str) -> bool {
    list_ports()
        .unwrap_or_default()
        .iter()
        .any(|p| p.name == port_name)
}

/// Timing helper for measuring operation duration.
pub struct TimingHelper {
    start: Instant,
    name: String,
}

impl TimingHelper {
    pub fn new(name: &str) -> Self {
        println!("Starting: {}", name);
        TimingHelper {
            start: Instant::now(),
            name: name.to_string(),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    pub fn finish(self) -> Duration {
        let elapsed = self.elapsed();
        println!("Completed: {} in {:?}", self.name, elapsed);
        elapsed
    }
}

/// Skip test with a clear message if hardware is not available.
#[macro_export]
macro_rules! skip_without_hardware {
    () => {
        if $crate::hardware::utils::TestPortConfig::from_env().is_none() {
            println!("Skipping: TEST_PORT environment variable not set");
            println!("   Set TEST_PORT=/dev/ttyUSB0 (or COM3) to run hardware tests");
            return;
        }
    };
}

/// Skip test with a clear message if loopback is not enabled.
#[macro_export]
macro_rules! skip_without_loopback {
    () => {
        match $crate::hardware::utils::TestPortConfig::from_env() {
            Some(config) if config.loopback_enabled => {}
            Some(_) => {
                println!("Skipping: TEST_LOOPBACK not set to 1");
                println!("   This test requires a loopback adapter (TX connected to RX)");
                return;
            }
            None => {
                println!("Skipping: TEST_PORT environment variable not set");
                return;
            }
        }
    };
}

/// Assert that duration is within expected range.
pub fn assert_duration_within(
    actual: Duration,
    expected: Duration,
    tolerance: Duration,
    message: &str,
) {
    let lower = expected.saturating_sub(tolerance);
    let upper = expected + tolerance;

    assert!(
        actual >= lower && actual <= upper,
        "{}: expected {:?} ± {:?}, got {:?}",
        message,
        expected,
        tolerance,
        actual
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timing_helper() {
        let timer = TimingHelper::new("test operation");
        std::thread::sleep(Duration::from_millis(10));
        let elapsed = timer.finish();
        assert!(elapsed >= Duration::from_millis(10));
    }

    #[test]
    fn test_assert_duration_within() {
        assert_duration_within(
            Duration::from_millis(100),
            Duration::from_millis(95),
            Duration::from_millis(10),
            "should be within tolerance",
        );
    }

    #[test]
    #[should_panic]
    fn test_assert_duration_out_of_range() {
        assert_duration_within(
            Duration::from_millis(200),
            Duration::from_millis(100),
            Duration::from_millis(10),
            "should panic",
        );
    }
}
