//! RS-232 loopback self-test.
//!
//! One run against one device:
//!
//! ```text
//! exists? ──no──> SKIP
//!    │
//! busy?  ──yes─> SKIP (holder PIDs listed, never killed)
//!    │
//! open (termios captured, raw 8N1) ──denied/rejected──> QcError
//!    │
//! byte loopback:  reader worker ──┐
//!                 settle, write ──┴─> join ─> PASS / WARN
//!    │
//! modem lines (opt-in): RTS→CTS, DTR→DSR, DTR→DCD, DTR→RI
//!    │
//! restore termios, drop every handle
//! ```

pub mod modem;
pub mod payload;
pub mod trial;

pub use modem::{exercise_pair, LinePair, ModemLineSample, PairResult, LINE_PAIRS};
pub use payload::{generate_payload, strip_line_noise, MAX_PAYLOAD_LEN};
pub use trial::{LoopbackTrial, TrialVerdict};

use crate::busy::BusyProbe;
use crate::error::QcError;
use crate::port::{PortConfiguration, PortError, PortOpener, SerialPortAdapter};
use crate::report::QcReport;
use payload::significant_len;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Delay between attaching the reader and sending the payload.
pub const WRITE_SETTLE: Duration = Duration::from_millis(300);

/// Length of one blocking read on the worker; bounds deadline overshoot.
pub const READ_SLICE: Duration = Duration::from_millis(50);

/// Time a control line is given to propagate through the jumper.
pub const MODEM_SETTLE: Duration = Duration::from_millis(50);

/// Extra time granted to the reader join beyond its own deadline.
const JOIN_GRACE: Duration = Duration::from_secs(1);

const CHECK_DEVICE: &str = "rs232.device";
const CHECK_LOOPBACK: &str = "rs232.loopback";
const CHECK_MODEM: &str = "rs232.modem";

/// Parameters for one tester run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoopbackSettings {
    pub device: String,
    pub baud_rate: u32,
    /// Hard deadline for the loopback read.
    pub timeout: Duration,
    pub payload_len: usize,
    pub byte_loopback: bool,
    pub modem_lines: bool,
}

impl Default for LoopbackSettings {
    fn default() -> Self {
        Self {
            device: "/dev/ttyUSB0".to_string(),
            baud_rate: 115200,
            timeout: Duration::from_secs(5),
            payload_len: 64,
            byte_loopback: true,
            modem_lines: false,
        }
    }
}

/// Runs the byte loopback and modem-line checks against one device.
pub struct SerialLoopbackTester {
    settings: LoopbackSettings,
    opener: Arc<dyn PortOpener>,
    probe: Arc<dyn BusyProbe>,
}

impl SerialLoopbackTester {
    pub fn new(
        settings: LoopbackSettings,
        opener: Arc<dyn PortOpener>,
        probe: Arc<dyn BusyProbe>,
    ) -> Self {
        Self {
            settings,
            opener,
            probe,
        }
    }

    pub fn settings(&self) -> &LoopbackSettings {
        &self.settings
    }

    /// Run every enabled check, appending lines to `report`.
    ///
    /// Returns `Err` only for hard failures: permission denied, or the OS
    /// rejecting the configuration or its restoration.
    pub async fn run(&self, report: &mut QcReport) -> Result<(), QcError> {
        let device = self.settings.device.as_str();

        if !self.settings.byte_loopback && !self.settings.modem_lines {
            report.skip(CHECK_DEVICE, "all RS-232 checks disabled");
            return Ok(());
        }

        if !Path::new(device).exists() {
            report.skip(CHECK_DEVICE, format!("{device} not present"));
            return Ok(());
        }

        match self.probe.holders(Path::new(device)) {
            Ok(pids) if !pids.is_empty() => {
                let pids: Vec<String> = pids.iter().map(ToString::to_string).collect();
                report.skip(
                    CHECK_DEVICE,
                    format!(
                        "{device} is in use by PID {}; stop the owning service and retry",
                        pids.join(", ")
                    ),
                );
                return Ok(());
            }
            Ok(_) => debug!(probe = self.probe.name(), device, "device is free"),
            Err(e) => debug!(probe = self.probe.name(), "{}; assuming {} is free", e, device),
        }

        let config = PortConfiguration::raw(self.settings.baud_rate, READ_SLICE);
        let mut port = match self.opener.open(device, &config) {
            Ok(port) => port,
            Err(e) => return self.open_failed(report, e),
        };
        info!(device, baud = self.settings.baud_rate, "port opened for QC");

        let outcome = self.exercise(port.as_mut(), report).await;
        let restored = port.restore_terminal();
        drop(port);

        if let Err(e) = restored {
            let hard = QcError::from_port(device, e).unwrap_or_else(|soft| QcError::ConfigRejected {
                device: device.to_string(),
                message: soft.to_string(),
            });
            if let Err(first) = outcome {
                warn!("{}", hard);
                return Err(first);
            }
            return Err(hard);
        }
        outcome
    }

    fn open_failed(&self, report: &mut QcReport, err: PortError) -> Result<(), QcError> {
        let device = self.settings.device.as_str();
        match QcError::from_port(device, err) {
            Ok(hard) => Err(hard),
            Err(PortError::NotFound(_)) => {
                report.skip(CHECK_DEVICE, format!("{device} disappeared before it could be opened"));
                Ok(())
            }
            Err(soft) => {
                report.warn(CHECK_DEVICE, format!("could not open {device}: {soft}"));
                Ok(())
            }
        }
    }

    async fn exercise(
        &self,
        port: &mut dyn SerialPortAdapter,
        report: &mut QcReport,
    ) -> Result<(), QcError> {
        if self.settings.byte_loopback {
            self.byte_loopback(port, report).await?;
        }
        if self.settings.modem_lines {
            self.modem_lines(port, report).await?;
        }
        Ok(())
    }

    /// Turn a port failure into a WARN line, or a hard error if it is one.
    fn soften(&self, report: &mut QcReport, check: &str, what: &str, err: PortError) -> Result<(), QcError> {
        match QcError::from_port(&self.settings.device, err) {
            Ok(hard) => Err(hard),
            Err(soft) => {
                report.warn(check, format!("{what}: {soft}"));
                Ok(())
            }
        }
    }

    async fn byte_loopback(
        &self,
        port: &mut dyn SerialPortAdapter,
        report: &mut QcReport,
    ) -> Result<(), QcError> {
        let payload = generate_payload(self.settings.payload_len);
        if payload.is_empty() {
            report.skip(CHECK_LOOPBACK, "payload length is zero");
            return Ok(());
        }

        if let Err(e) = port.clear_input() {
            return self.soften(report, CHECK_LOOPBACK, "could not flush input", e);
        }
        let reader = match port.try_clone_adapter() {
            Ok(reader) => reader,
            Err(e) => return self.soften(report, CHECK_LOOPBACK, "could not attach reader", e),
        };

        let expected = payload.len();
        let deadline = Instant::now() + self.settings.timeout;
        let handle = tokio::task::spawn_blocking(move || read_until(reader, expected, deadline));

        tokio::time::sleep(WRITE_SETTLE).await;
        let written = self.write_payload(port, &payload).await;

        let received = match tokio::time::timeout(self.settings.timeout + JOIN_GRACE, handle).await {
            Ok(Ok(Ok(bytes))) => bytes,
            Ok(Ok(Err(e))) => {
                warn!("loopback reader failed: {}", e);
                Vec::new()
            }
            Ok(Err(e)) => {
                warn!("loopback reader panicked: {}", e);
                Vec::new()
            }
            Err(_) => {
                warn!("loopback reader missed its deadline");
                Vec::new()
            }
        };

        if let Err(e) = written {
            return self.soften(report, CHECK_LOOPBACK, "write failed", e);
        }

        let trial = LoopbackTrial::new(payload, received);
        match trial.verdict() {
            TrialVerdict::Pass => report.pass(
                CHECK_LOOPBACK,
                format!(
                    "{expected}/{expected} bytes echoed at {} baud",
                    self.settings.baud_rate
                ),
            ),
            TrialVerdict::Garbled { received, expected } => report.warn(
                CHECK_LOOPBACK,
                format!("data mismatch: received {received} of {expected} bytes"),
            ),
            TrialVerdict::NoData => report.warn(
                CHECK_LOOPBACK,
                format!(
                    "no data received within {:?} (check TX/RX loopback wiring)",
                    self.settings.timeout
                ),
            ),
        }
        Ok(())
    }

    /// Send `payload` from a cloned handle on the blocking pool.
    ///
    /// `write_bytes` drains the output queue, which can stall on a wedged
    /// adapter; the wait is bounded like the reader join.
    async fn write_payload(
        &self,
        port: &mut dyn SerialPortAdapter,
        payload: &[u8],
    ) -> Result<(), PortError> {
        let mut writer = port.try_clone_adapter()?;
        let data = payload.to_vec();
        let bound = self.settings.timeout + JOIN_GRACE;
        let handle = tokio::task::spawn_blocking(move || writer.write_bytes(&data).map(|_| ()));

        match tokio::time::timeout(bound, handle).await {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => Err(PortError::Io(std::io::Error::other(format!(
                "writer task failed: {e}"
            )))),
            Err(_) => Err(PortError::timeout(bound)),
        }
    }

    async fn modem_lines(
        &self,
        port: &mut dyn SerialPortAdapter,
        report: &mut QcReport,
    ) -> Result<(), QcError> {
        let idle = port.set_rts(false).and_then(|()| port.set_dtr(false));
        if let Err(e) = idle {
            return self.soften(report, CHECK_MODEM, "could not drive RTS/DTR low", e);
        }
        tokio::time::sleep(MODEM_SETTLE).await;

        for pair in LINE_PAIRS {
            let check = pair.check_name();
            match exercise_pair(port, pair, MODEM_SETTLE).await {
                Ok(result) if result.changed() => {
                    let crosstalk = result.crosstalk();
                    if !crosstalk.is_empty() {
                        debug!(jumper = %pair.jumper(), ?crosstalk, "other inputs moved too");
                    }
                    report.pass(&check, format!("{} toggle seen on {}", pair.output, pair.input));
                }
                Ok(_) => report.warn(
                    &check,
                    format!(
                        "no {} transition when toggling {} (expected jumper {})",
                        pair.input,
                        pair.output,
                        pair.jumper()
                    ),
                ),
                Err(e) => self.soften(report, &check, "control-line access failed", e)?,
            }
        }
        Ok(())
    }
}

/// Blocking read loop run on the worker thread.
///
/// Returns once `expected` non-CR/LF bytes arrived or the deadline passed. Each
/// read blocks for at most [`READ_SLICE`]. The handle is dropped on return.
fn read_until(
    mut port: Box<dyn SerialPortAdapter>,
    expected: usize,
    deadline: Instant,
) -> Result<Vec<u8>, PortError> {
    port.set_timeout(READ_SLICE)?;

    let mut received = Vec::with_capacity(expected + 2);
    let mut buffer = [0u8; 256];

    while Instant::now() < deadline {
        match port.read_bytes(&mut buffer) {
            Ok(0) => std::thread::sleep(READ_SLICE),
            Ok(n) => {
                received.extend_from_slice(&buffer[..n]);
                if significant_len(&received) >= expected {
                    break;
                }
            }
            Err(e) if e.is_idle() => {}
            Err(e) => return Err(e),
        }
    }

    debug!(bytes = received.len(), "loopback reader finished");
    Ok(received)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::busy::{MockBusyProbe, NoBusyProbe};
    use crate::port::{MockSerialPort, Wiring};
    use crate::report::Status;

    fn settings(device: &Path) -> LoopbackSettings {
        LoopbackSettings {
            device: device.display().to_string(),
            timeout: Duration::from_millis(800),
            payload_len: 16,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_busy_device_is_never_opened() {
        let node = tempfile::NamedTempFile::new().unwrap();
        let device = MockSerialPort::new("fake");

        let mut probe = MockBusyProbe::new();
        probe.expect_holders().times(1).returning(|_| Ok(vec![4242]));
        probe.expect_name().return_const("mock");

        let tester = SerialLoopbackTester::new(
            settings(node.path()),
            Arc::new(device.clone()),
            Arc::new(probe),
        );
        let mut report = QcReport::new("fake");
        tester.run(&mut report).await.unwrap();

        assert_eq!(device.open_count(), 0);
        let line = report.find(CHECK_DEVICE).unwrap();
        assert_eq!(line.status, Status::Skip);
        assert!(line.message.contains("4242"));
    }

    #[tokio::test]
    async fn test_probe_failure_assumes_free() {
        let node = tempfile::NamedTempFile::new().unwrap();
        let device = MockSerialPort::new("fake");
        device.set_wiring(Wiring::Loopback);

        let mut probe = MockBusyProbe::new();
        probe.expect_holders().returning(|_| {
            Err(crate::busy::BusyProbeError::Tool {
                tool: "fuser",
                message: "boom".into(),
            })
        });
        probe.expect_name().return_const("mock");

        let tester = SerialLoopbackTester::new(
            settings(node.path()),
            Arc::new(device.clone()),
            Arc::new(probe),
        );
        let mut report = QcReport::new("fake");
        tester.run(&mut report).await.unwrap();

        assert_eq!(device.open_count(), 1);
        assert_eq!(report.find(CHECK_LOOPBACK).unwrap().status, Status::Pass);
    }

    #[tokio::test]
    async fn test_everything_disabled_skips_without_touching_device() {
        let node = tempfile::NamedTempFile::new().unwrap();
        let device = MockSerialPort::new("fake");
        let tester = SerialLoopbackTester::new(
            LoopbackSettings {
                byte_loopback: false,
                modem_lines: false,
                ..settings(node.path())
            },
            Arc::new(device.clone()),
            Arc::new(NoBusyProbe),
        );
        let mut report = QcReport::new("fake");
        tester.run(&mut report).await.unwrap();

        assert_eq!(device.open_count(), 0);
        assert_eq!(report.count(Status::Skip), 1);
    }

    #[tokio::test]
    async fn test_write_payload_uses_its_own_handle() {
        let node = tempfile::NamedTempFile::new().unwrap();
        let device = MockSerialPort::new("fake");
        let tester = SerialLoopbackTester::new(
            settings(node.path()),
            Arc::new(device.clone()),
            Arc::new(NoBusyProbe),
        );
        let mut port = device
            .open("fake", &PortConfiguration::default())
            .unwrap();

        tester.write_payload(port.as_mut(), b"nexbox").await.unwrap();
        assert_eq!(device.get_write_log(), vec![b"nexbox".to_vec()]);
        assert_eq!(device.open_handles(), 1);

        device.fail_next_write(crate::port::MockFault::Io);
        let err = tester.write_payload(port.as_mut(), b"again").await.unwrap_err();
        assert!(matches!(err, PortError::Io(_)));
        assert_eq!(device.get_write_log().len(), 1);
        assert_eq!(device.open_handles(), 1);
    }

    #[test]
    fn test_read_until_respects_deadline() {
        let device = MockSerialPort::new("fake");
        let port = device
            .open("fake", &PortConfiguration::default())
            .unwrap();
        let reader = port.try_clone_adapter().unwrap();

        let started = Instant::now();
        let received = read_until(reader, 8, started + Duration::from_millis(200)).unwrap();
        assert!(received.is_empty());
        assert!(started.elapsed() < Duration::from_millis(200) + READ_SLICE * 2);
    }

    #[test]
    fn test_read_until_stops_when_payload_arrived() {
        let device = MockSerialPort::new("fake");
        device.enqueue_read(b"abcd\r\n");
        let port = device
            .open("fake", &PortConfiguration::default())
            .unwrap();
        let reader = port.try_clone_adapter().unwrap();

        let started = Instant::now();
        let received = read_until(reader, 4, started + Duration::from_secs(5)).unwrap();
        assert_eq!(received, b"abcd\r\n");
        assert!(started.elapsed() < Duration::from_secs(1));
    }
}
