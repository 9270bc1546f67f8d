//! Port abstraction layer for serial communication.
//!
//! Provides the adapter trait the loopback tester drives, the real
//! `serialport`-backed implementation with termios capture/restore, and a mock
//! for tests.

pub mod error;
pub mod mock;
pub mod sync_port;
pub mod terminal;
pub mod traits;

pub use error::PortError;
pub use mock::{MockFault, MockSerialPort, TerminalMode, Wiring};
pub use sync_port::{SyncSerialPort, SystemPortOpener};
pub use terminal::{TerminalDigest, TerminalSnapshot};
pub use traits::*;
