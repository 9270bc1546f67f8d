//! Shared test utilities for the QC integration tests.
//!
//! This module provides common test infrastructure including:
//! - Fake device nodes the tester can `stat`
//! - A tester wired to a `MockSerialPort` and no busy probe
//! - Report assertion helpers

#![allow(dead_code)]

use nexbox_qc::busy::{BusyProbe, NoBusyProbe};
use nexbox_qc::loopback::{LoopbackSettings, SerialLoopbackTester};
use nexbox_qc::port::{MockSerialPort, Wiring};
use nexbox_qc::report::{QcReport, Status};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// A regular file standing in for a device node.
///
/// The mock opener ignores the path; the tester only needs it to exist.
pub struct FakeNode {
    path: PathBuf,
    _dir: Option<tempfile::TempDir>,
}

impl FakeNode {
    /// Node in a fresh temporary directory.
    pub fn temp() -> Self {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("ttyFAKE0");
        std::fs::write(&path, b"").expect("create fake node");
        Self {
            path,
            _dir: Some(dir),
        }
    }

    /// Node at a fixed path, removed on drop. Callers must serialize access.
    pub fn at(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        std::fs::write(&path, b"").expect("create fake node");
        Self { path, _dir: None }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn device(&self) -> String {
        self.path.display().to_string()
    }
}

impl Drop for FakeNode {
    fn drop(&mut self) {
        if self._dir.is_none() {
            let _ = std::fs::remove_file(&self.path);
        }
    }
}

/// Settings with a short deadline so that no-data cases finish quickly.
pub fn quick_settings(device: &str) -> LoopbackSettings {
    LoopbackSettings {
        device: device.to_string(),
        timeout: Duration::from_millis(700),
        ..Default::default()
    }
}

/// Mock device with the given TX/RX wiring.
pub fn mock_device(wiring: Wiring) -> MockSerialPort {
    let device = MockSerialPort::new("mock-tty");
    device.set_wiring(wiring);
    device
}

pub fn tester(settings: LoopbackSettings, device: &MockSerialPort) -> SerialLoopbackTester {
    tester_with_probe(settings, device, Arc::new(NoBusyProbe))
}

pub fn tester_with_probe(
    settings: LoopbackSettings,
    device: &MockSerialPort,
    probe: Arc<dyn BusyProbe>,
) -> SerialLoopbackTester {
    SerialLoopbackTester::new(settings, Arc::new(device.clone()), probe)
}

/// Status of `check`, panicking with the whole report if it is missing.
pub fn status_of(report: &QcReport, check: &str) -> Status {
    match report.find(check) {
        Some(line) => line.status,
        None => panic!("no line for {check} in report:\n{report}"),
    }
}

/// Message of `check`, panicking with the whole report if it is missing.
pub fn message_of<'a>(report: &'a QcReport, check: &str) -> &'a str {
    match report.find(check) {
        Some(line) => &line.message,
        None => panic!("no line for {check} in report:\n{report}"),
    }
}

/// The device was released and its terminal put back.
pub fn assert_released(device: &MockSerialPort) {
    assert_eq!(device.open_handles(), 0, "a port handle outlived the test");
    assert_eq!(
        device.terminal_mode(),
        nexbox_qc::port::TerminalMode::Cooked,
        "terminal settings were not restored"
    );
}
