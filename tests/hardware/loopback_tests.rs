//! Tests for a port whose TX is wired to its RX (`TEST_LOOPBACK=1`).

use super::utils::{PortTestFixture, TimingHelper};
use crate::skip_without_loopback;
use atlas_serial::port::Timeout;
use std::sync::Arc;
use std::thread;

fn loopback_fixture() -> PortTestFixture {
    PortTestFixture::setup_with(Timeout::simple(1000))
        .expect("TEST_PORT is set but the port could not be opened")
}

#[test]
#[ignore]
fn test_loopback_round_trip() {
    skip_without_loopback!();
    let fixture = loopback_fixture();

    let test_data = b"LOOPBACK TEST\r\n";
    let written = fixture.port.write(test_data).expect("write failed");
    assert_eq!(written, test_data.len());

    let mut echo = Vec::new();
    let read = fixture
        .port
        .read_to_vec(&mut echo, test_data.len())
        .expect("read failed");
    assert_eq!(read, test_data.len());
    assert_eq!(echo, test_data, "Loopback data should match written data");
}

#[test]
#[ignore]
fn test_loopback_lines() {
    skip_without_loopback!();
    let fixture = loopback_fixture();
    fixture.port.set_timeout(Timeout::simple(200));

    fixture.port.write("alpha\nbeta\ngam").expect("write failed");
    let lines = fixture.port.read_lines(64, "\n").expect("readlines failed");
    assert_eq!(lines, vec!["alpha\n", "beta\n", "gam"]);
}

#[test]
#[ignore]
fn test_loopback_concurrent_read_write() {
    skip_without_loopback!();
    let fixture = loopback_fixture();
    let port = Arc::new(fixture.port);
    let payload: Vec<u8> = (0..512).map(|i| (i % 251) as u8).collect();

    let reader = {
        let port = Arc::clone(&port);
        let len = payload.len();
        thread::spawn(move || {
            let mut received = Vec::with_capacity(len);
            while received.len() < len {
                let missing = len - received.len();
                match port.read_to_vec(&mut received, missing) {
                    Ok(0) | Err(_) => break,
                    Ok(_) => {}
                }
            }
            received
        })
    };

    let timer = TimingHelper::new("concurrent loopback");
    for chunk in payload.chunks(64) {
        assert_eq!(port.write(chunk).expect("write failed"), chunk.len());
    }
    let received = reader.join().expect("reader panicked");
    timer.finish();

    assert_eq!(received, payload);
}
