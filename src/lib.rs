//! nexBox QC library
//!
//! Benchtop RS-232 self-test run during unit provisioning: a random payload is
//! sent through a TX/RX loopback plug, modem-line jumpers are toggled and
//! checked, and every result lands in a human-readable report. The device is
//! never touched while another process holds it, and its terminal settings are
//! put back afterwards whatever the outcome.
//!
//! # Modules
//!
//! - `config`: Configuration management with TOML support
//! - `port`: Port abstraction layer (real device, termios snapshot, mock)
//! - `busy`: Detection of processes already holding the device
//! - `loopback`: Byte loopback and modem-line checks
//! - `identity`: Product Serial Number lookup
//! - `report`: PASS / WARN / ERROR report
//! - `runner`: One complete QC pass
//! - `logging`: Tracing subscriber setup
//! - `error`: Hard-failure error type

pub mod busy;
pub mod config;
pub mod error;
pub mod identity;
pub mod logging;
pub mod loopback;
pub mod port;
pub mod report;
pub mod runner;

// Re-export commonly used types for convenience
pub use busy::{BusyCheck, BusyProbe, BusyProbeError, NoBusyProbe, SystemBusyProbe};
pub use error::QcError;
pub use identity::{DeviceIdentity, IdentityDetector, IdentitySource};
pub use loopback::{LoopbackSettings, SerialLoopbackTester};
pub use port::{
    DataBits, FlowControl, MockSerialPort, Parity, PortConfiguration, PortError, PortOpener,
    SerialPortAdapter, StopBits, SyncSerialPort, SystemPortOpener,
};
pub use report::{CheckLine, QcReport, Status};
pub use runner::QcRunner;

// Re-export config types
pub use config::{Config, ConfigError, ConfigLoader, ConfigResult};
