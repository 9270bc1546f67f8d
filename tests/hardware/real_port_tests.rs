//! Tests requiring actual serial hardware.
//!
//! These tests are skipped if no hardware is available.
//!
//! # Running Hardware Tests
//!
//! ```bash
//! export TEST_PORT=/dev/ttyUSB0
//! export TEST_BAUD=115200                # optional, default: 115200
//! export TEST_LOOPBACK=1                 # if TX and RX are jumpered
//! export TEST_MODEM=1                    # if the DB9 modem-line plug is fitted
//!
//! cargo test --test integration_hardware -- --ignored --test-threads=1
//! ```

use super::utils::skip_without_hardware;
use nexbox_qc::busy::SystemBusyProbe;
use nexbox_qc::loopback::SerialLoopbackTester;
use nexbox_qc::port::{
    PortConfiguration, SerialPortAdapter, SyncSerialPort, SystemPortOpener, TerminalSnapshot,
};
use nexbox_qc::report::{QcReport, Status};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

#[tokio::test]
#[ignore] // Run with --ignored flag
async fn test_loopback_leaves_terminal_as_found() {
    let Some(bench) = skip_without_hardware() else {
        return;
    };

    let watcher = TerminalSnapshot::capture(Path::new(&bench.port_name))
        .expect("capture terminal attributes");
    let before = watcher.original();

    let tester = SerialLoopbackTester::new(
        bench.settings(),
        Arc::new(SystemPortOpener),
        Arc::new(SystemBusyProbe::new()),
    );
    let mut report = QcReport::new(bench.port_name.clone());
    tester.run(&mut report).await.expect("no hard failure");
    println!("{report}");

    let after = watcher.current().expect("read terminal attributes");
    assert_eq!(before, after, "terminal attributes changed by the test");

    let loopback = report.find("rs232.loopback").expect("loopback line");
    if bench.loopback_enabled {
        assert_eq!(loopback.status, Status::Pass);
    } else {
        assert_eq!(loopback.status, Status::Warn);
        assert!(loopback.message.starts_with("no data received"));
    }

    if bench.modem_jumpers {
        for check in [
            "rs232.modem.rts-cts",
            "rs232.modem.dtr-dsr",
            "rs232.modem.dtr-dcd",
            "rs232.modem.dtr-ri",
        ] {
            assert_eq!(report.find(check).map(|l| l.status), Some(Status::Pass));
        }
    }
}

#[tokio::test]
#[ignore]
async fn test_repeated_runs_give_same_verdict() {
    let Some(bench) = skip_without_hardware() else {
        return;
    };

    let mut verdicts = Vec::new();
    for _ in 0..3 {
        let tester = SerialLoopbackTester::new(
            bench.settings(),
            Arc::new(SystemPortOpener),
            Arc::new(SystemBusyProbe::new()),
        );
        let mut report = QcReport::new(bench.port_name.clone());
        tester.run(&mut report).await.expect("no hard failure");
        verdicts.push(report.find("rs232.loopback").map(|l| l.status));
    }

    assert_eq!(verdicts[0], verdicts[1]);
    assert_eq!(verdicts[1], verdicts[2]);
}

#[test]
#[ignore]
fn test_sync_port_restores_on_drop() {
    let Some(bench) = skip_without_hardware() else {
        return;
    };

    let config = PortConfiguration::raw(bench.baud_rate, Duration::from_millis(100));
    let port = SyncSerialPort::open(&bench.port_name, config).expect("open port");
    let before = port
        .terminal()
        .expect("snapshot taken on open")
        .original();
    println!("opened {}", port.name());
    drop(port);

    let watcher = TerminalSnapshot::capture(Path::new(&bench.port_name))
        .expect("capture terminal attributes");
    assert_eq!(watcher.original(), before);
}

#[test]
#[ignore]
fn test_raw_echo_roundtrip() {
    let Some(bench) = skip_without_hardware() else {
        return;
    };
    if !bench.loopback_enabled {
        println!("Skipping: TEST_LOOPBACK not set");
        return;
    }

    let config = PortConfiguration::raw(bench.baud_rate, Duration::from_millis(500));
    let mut port = SyncSerialPort::open(&bench.port_name, config).expect("open port");
    port.clear_input().expect("flush");
    port.write_bytes(b"nexbox").expect("write");

    let mut received = Vec::new();
    let mut buffer = [0u8; 32];
    while received.len() < 6 {
        match port.read_bytes(&mut buffer) {
            Ok(n) => received.extend_from_slice(&buffer[..n]),
            Err(e) if e.is_idle() => break,
            Err(e) => panic!("read failed: {e}"),
        }
    }
    assert_eq!(received, b"nexbox");
    port.restore_terminal().expect("restore");
}
