//! One QC pass: identity, then the RS-232 checks.

use crate::busy::BusyProbe;
use crate::config::Config;
use crate::identity::IdentityDetector;
use crate::loopback::SerialLoopbackTester;
use crate::port::{PortOpener, SystemPortOpener};
use crate::report::QcReport;
use std::sync::Arc;
use tracing::{error, info_span, Instrument};

const CHECK_IDENTITY: &str = "identity.serial";
const CHECK_RS232: &str = "rs232";

/// Drives a full QC pass from a loaded [`Config`].
pub struct QcRunner {
    config: Config,
    opener: Arc<dyn PortOpener>,
    probe: Arc<dyn BusyProbe>,
}

impl QcRunner {
    /// Runner backed by the real serial stack and the configured busy probe.
    pub fn from_config(config: Config) -> Self {
        let probe: Arc<dyn BusyProbe> = Arc::from(config.serial.busy_check.probe());
        Self {
            config,
            opener: Arc::new(SystemPortOpener),
            probe,
        }
    }

    pub fn with_opener(mut self, opener: Arc<dyn PortOpener>) -> Self {
        self.opener = opener;
        self
    }

    pub fn with_probe(mut self, probe: Arc<dyn BusyProbe>) -> Self {
        self.probe = probe;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Run every enabled check. Hard failures end up as an ERROR line.
    pub async fn run(&self) -> QcReport {
        let serial = &self.config.serial;
        let mut report = QcReport::new(serial.device.clone());

        let detector = IdentityDetector::new(&self.config.identity.root);
        match detector.resolve(self.config.identity.serial_number.as_deref()) {
            Some(identity) => report.pass(
                CHECK_IDENTITY,
                format!("{} (from {})", identity.serial_number, identity.source),
            ),
            None => report.warn(CHECK_IDENTITY, "Product Serial Number not found"),
        }

        let tester = SerialLoopbackTester::new(
            serial.loopback_settings(),
            Arc::clone(&self.opener),
            Arc::clone(&self.probe),
        );
        let span = info_span!("rs232", device = %serial.device);
        if let Err(e) = tester.run(&mut report).instrument(span).await {
            error!("RS-232 test aborted: {}", e);
            report.error(CHECK_RS232, e.to_string());
        }

        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::busy::NoBusyProbe;
    use crate::port::{MockFault, MockSerialPort, Wiring};
    use crate::report::Status;

    fn config_for(device: &str, root: &std::path::Path) -> Config {
        let mut config = Config::default();
        config.serial.device = device.to_string();
        config.serial.timeout_secs = 1;
        config.serial.payload_bytes = 16;
        config.identity.root = root.to_path_buf();
        config
    }

    #[tokio::test]
    async fn test_identity_and_loopback_pass() {
        let root = tempfile::tempdir().unwrap();
        let node = tempfile::NamedTempFile::new().unwrap();
        let mut config = config_for(&node.path().display().to_string(), root.path());
        config.identity.serial_number = Some("NB-1".into());

        let port = MockSerialPort::new("fake");
        port.set_wiring(Wiring::Loopback);
        let report = QcRunner::from_config(config)
            .with_opener(Arc::new(port))
            .with_probe(Arc::new(NoBusyProbe))
            .run()
            .await;

        assert_eq!(report.find(CHECK_IDENTITY).unwrap().status, Status::Pass);
        assert_eq!(report.find("rs232.loopback").unwrap().status, Status::Pass);
        assert!(!report.has_errors());
    }

    #[tokio::test]
    async fn test_hard_failure_becomes_error_line() {
        let root = tempfile::tempdir().unwrap();
        let node = tempfile::NamedTempFile::new().unwrap();
        let config = config_for(&node.path().display().to_string(), root.path());

        let port = MockSerialPort::new("fake");
        port.fail_next_open(MockFault::PermissionDenied);
        let report = QcRunner::from_config(config)
            .with_opener(Arc::new(port))
            .with_probe(Arc::new(NoBusyProbe))
            .run()
            .await;

        assert_eq!(report.find(CHECK_IDENTITY).unwrap().status, Status::Warn);
        let line = report.find(CHECK_RS232).unwrap();
        assert_eq!(line.status, Status::Error);
        assert!(line.message.contains("permission denied"));
        assert!(report.has_errors());
    }
}
