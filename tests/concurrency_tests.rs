//! Read/write locking under concurrent use of one port.

mod common;

use atlas_serial::port::{PortError, SerialPort, Timeout};
use common::MockFixture;
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::{Duration, Instant};

#[test]
fn test_read_and_write_run_concurrently() {
    let fixture = MockFixture::opened(Timeout::simple(2_000));
    let port = Arc::new(fixture.port);
    let device = fixture.device;

    // The reader parks inside `read` holding the read lock; the write must
    // still go through and the reader must still get its bytes.
    let reader = {
        let port = Arc::clone(&port);
        thread::spawn(move || port.read_string(6))
    };
    thread::sleep(Duration::from_millis(50));

    let started = Instant::now();
    let payload = b"outbound payload";
    assert_eq!(port.write(payload).unwrap(), payload.len());
    assert!(started.elapsed() < Duration::from_millis(500));

    device.feed(b"inbound");
    let received = reader.join().unwrap().unwrap();

    assert_eq!(received, "inboun");
    assert_eq!(device.written(), payload);
    assert_eq!(device.pending_input(), 1);
}

#[test]
fn test_writers_do_not_interleave() {
    let fixture = MockFixture::opened(Timeout::simple(500));
    let port = Arc::new(fixture.port);
    let barrier = Arc::new(Barrier::new(4));

    let writers: Vec<_> = (b'a'..=b'd')
        .map(|tag| {
            let port = Arc::clone(&port);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                let chunk = vec![tag; 64];
                barrier.wait();
                for _ in 0..25 {
                    assert_eq!(port.write(&chunk).unwrap(), chunk.len());
                }
            })
        })
        .collect();
    for writer in writers {
        writer.join().unwrap();
    }

    let written = fixture.device.written();
    assert_eq!(written.len(), 4 * 25 * 64);
    for chunk in written.chunks(64) {
        assert!(chunk.iter().all(|&b| b == chunk[0]), "interleaved write: {chunk:?}");
    }
}

#[test]
fn test_loopback_traffic_in_both_directions() {
    let fixture = MockFixture::loopback(Timeout::simple(1_000));
    let port = Arc::new(fixture.port);
    let total: usize = 200 * 8;

    let reader = {
        let port = Arc::clone(&port);
        thread::spawn(move || {
            let mut received = Vec::with_capacity(total);
            while received.len() < total {
                let missing = total - received.len();
                if port.read_to_vec(&mut received, missing)? == 0 {
                    break;
                }
            }
            Ok::<_, PortError>(received)
        })
    };

    let mut sent = Vec::with_capacity(total);
    for i in 0..200u32 {
        let frame = format!("F{:06}\n", i);
        port.write(&frame).unwrap();
        sent.extend_from_slice(frame.as_bytes());
    }

    let received = reader.join().unwrap().unwrap();
    assert_eq!(received, sent);
}

#[test]
fn test_set_timeout_survives_concurrent_reconfigure() {
    let fixture = MockFixture::opened(Timeout::non_blocking());
    fixture.device.set_apply_delay(Duration::from_millis(200));
    let port = Arc::new(fixture.port);

    let reconfigure = {
        let port = Arc::clone(&port);
        thread::spawn(move || port.set_baud_rate(57_600))
    };
    thread::sleep(Duration::from_millis(50));

    // The baud change is still inside the device; the timeout must not wait
    // for it and must not be rolled back when it finishes.
    let started = Instant::now();
    port.set_timeout(Timeout::simple(500));
    assert!(started.elapsed() < Duration::from_millis(100));

    reconfigure.join().unwrap().unwrap();
    assert_eq!(port.timeout(), Timeout::simple(500));
    assert_eq!(port.baud_rate(), 57_600);
    assert_eq!(fixture.device.applied_settings().unwrap().baud_rate, 57_600);
}

#[test]
fn test_close_waits_for_in_flight_read() {
    let fixture = MockFixture::opened(Timeout::simple(200));
    let port = Arc::new(fixture.port);

    let reader = {
        let port = Arc::clone(&port);
        thread::spawn(move || port.read_string(4))
    };
    thread::sleep(Duration::from_millis(30));

    port.close();
    let result = reader.join().unwrap();

    // The read finished on a live handle before close took it away.
    assert_eq!(result.unwrap(), "");
    assert!(!port.is_open());
    assert_eq!(fixture.device.open_handles(), 0);
}

#[test]
fn test_control_lines_during_blocked_read() {
    let fixture = MockFixture::opened(Timeout::simple(300));
    let port = Arc::new(fixture.port);

    let reader = {
        let port = Arc::clone(&port);
        thread::spawn(move || port.read_string(1))
    };
    thread::sleep(Duration::from_millis(30));

    // RTS goes through the write half while the reader holds the read half.
    let started = Instant::now();
    port.set_rts(true).unwrap();
    assert!(started.elapsed() < Duration::from_millis(150));
    assert!(fixture.device.rts());

    reader.join().unwrap().unwrap();
}

#[test]
fn test_shared_port_drop_closes_device() {
    let fixture = MockFixture::opened(Timeout::default());
    let port: Arc<SerialPort> = Arc::new(fixture.port);
    let clone = Arc::clone(&port);

    drop(port);
    assert!(fixture.device.is_open());
    drop(clone);
    assert!(!fixture.device.is_open());
}
