//! Tests requiring an actual serial port.
//!
//! # Running Hardware Tests
//!
//! ```bash
//! export TEST_PORT=/dev/ttyUSB0   # or COM3 on Windows
//! export TEST_BAUD=115200         # optional, default: 9600
//! cargo test --test integration_hardware -- --ignored
//! ```

use super::utils::{
    assert_duration_within, is_port_available, PortTestFixture, TestPortConfig, TimingHelper,
};
use crate::skip_without_hardware;
use atlas_serial::port::{Parity, PortError, PortSettings, SerialPort, Timeout};
use std::time::Duration;

#[test]
#[ignore] // Run with --ignored flag
fn test_real_port_open_close() {
    skip_without_hardware!();
    let Some(fixture) = PortTestFixture::setup() else {
        panic!("TEST_PORT is set but the port could not be opened");
    };

    assert!(fixture.port.is_open());
    assert!(is_port_available(&fixture.config.port_name));

    fixture.port.close();
    fixture.port.close();
    assert!(!fixture.port.is_open());
    assert!(matches!(
        fixture.port.write(b"x"),
        Err(PortError::NotOpen("write"))
    ));
}

#[test]
#[ignore]
fn test_real_port_second_open_is_rejected() {
    skip_without_hardware!();
    let Some(fixture) = PortTestFixture::setup() else {
        panic!("TEST_PORT is set but the port could not be opened");
    };

    assert!(matches!(fixture.port.open(), Err(PortError::AlreadyOpen)));
}

#[test]
#[ignore]
fn test_real_port_read_timeout_is_respected() {
    skip_without_hardware!();
    let Some(fixture) = PortTestFixture::setup_with(Timeout::simple(300)) else {
        panic!("TEST_PORT is set but the port could not be opened");
    };
    if fixture.is_loopback() {
        // Nothing is written, so a loopback adapter stays silent too.
        println!("Loopback adapter present; expecting an idle line");
    }

    let timer = TimingHelper::new("idle read");
    let mut buffer = [0u8; 16];
    let read = fixture.port.read(&mut buffer).expect("read failed");
    let elapsed = timer.finish();

    println!("Read {} bytes from idle line", read);
    if read == 0 {
        assert_duration_within(
            elapsed,
            Duration::from_millis(300),
            Duration::from_millis(150),
            "idle read should last one timeout",
        );
    }
}

#[test]
#[ignore]
fn test_real_port_reconfigure_while_open() {
    skip_without_hardware!();
    let Some(fixture) = PortTestFixture::setup() else {
        panic!("TEST_PORT is set but the port could not be opened");
    };

    fixture.port.set_baud_rate(19_200).expect("baud change failed");
    fixture.port.set_parity(Parity::Even).expect("parity change failed");
    assert_eq!(fixture.port.baud_rate(), 19_200);
    assert_eq!(fixture.port.parity(), Parity::Even);
}

#[test]
#[ignore]
#[cfg(target_os = "linux")]
fn test_real_port_mark_and_space_parity() {
    skip_without_hardware!();
    let Some(config) = TestPortConfig::from_env() else {
        return;
    };

    for parity in [Parity::Mark, Parity::Space] {
        let port = SerialPort::new(
            config.port_name.clone(),
            PortSettings {
                parity,
                ..config.settings(Timeout::simple(100))
            },
        );
        port.open()
            .unwrap_or_else(|e| panic!("{parity:?} parity open failed: {e}"));
        assert_eq!(port.parity(), parity);

        // Switching back to a plain parity clears the stick bit again.
        port.set_parity(Parity::None).expect("parity change failed");
        port.close();
    }
}

#[test]
#[ignore]
fn test_real_port_modem_lines() {
    skip_without_hardware!();
    let Some(fixture) = PortTestFixture::setup() else {
        panic!("TEST_PORT is set but the port could not be opened");
    };

    fixture.port.set_rts(true).expect("setRTS failed");
    fixture.port.set_dtr(true).expect("setDTR failed");
    let status = fixture.port.modem_status().expect("modem status failed");
    println!("Modem status: {:?}", status);
    fixture.port.set_rts(false).expect("setRTS failed");
    fixture.port.set_dtr(false).expect("setDTR failed");
}

#[test]
#[ignore]
fn test_real_port_bad_path_fails() {
    let port = SerialPort::new("/dev/atlas-serial-missing", Default::default());
    assert!(matches!(port.open(), Err(PortError::OpenFailed { .. })));
    assert!(!port.is_open());
}
