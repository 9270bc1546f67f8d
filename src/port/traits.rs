//! Core traits for serial port abstraction.
//!
//! Defines the `SerialPortAdapter` trait that allows both real serial ports
//! and mock implementations to be driven by the loopback tester, and the
//! `PortOpener` factory the tester uses to acquire them.

use super::error::PortError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration parameters for a serial port.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortConfiguration {
    /// Baud rate (bits per second).
    pub baud_rate: u32,

    /// Number of data bits (5, 6, 7, or 8).
    pub data_bits: DataBits,

    /// Flow control mode.
    pub flow_control: FlowControl,

    /// Parity checking mode.
    pub parity: Parity,

    /// Number of stop bits.
    pub stop_bits: StopBits,

    /// Per-read byte timeout.
    pub timeout: Duration,
}

impl PortConfiguration {
    /// Raw 8N1 with every form of flow control disabled.
    pub fn raw(baud_rate: u32, timeout: Duration) -> Self {
        Self {
            baud_rate,
            timeout,
            ..Self::default()
        }
    }
}

impl Default for PortConfiguration {
    fn default() -> Self {
        Self {
            baud_rate: 115200,
            data_bits: DataBits::Eight,
            flow_control: FlowControl::None,
            parity: Parity::None,
            stop_bits: StopBits::One,
            timeout: Duration::from_millis(100),
        }
    }
}

/// Number of data bits per character.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DataBits {
    Seven,
    Eight,
}

impl From<DataBits> for serialport::DataBits {
    fn from(bits: DataBits) -> Self {
        match bits {
            DataBits::Seven => serialport::DataBits::Seven,
            DataBits::Eight => serialport::DataBits::Eight,
        }
    }
}

/// Flow control modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FlowControl {
    None,
    Software,
    Hardware,
}

impl From<FlowControl> for serialport::FlowControl {
    fn from(flow: FlowControl) -> Self {
        match flow {
            FlowControl::None => serialport::FlowControl::None,
            FlowControl::Software => serialport::FlowControl::Software,
            FlowControl::Hardware => serialport::FlowControl::Hardware,
        }
    }
}

/// Parity checking modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Parity {
    None,
    Odd,
    Even,
}

impl From<Parity> for serialport::Parity {
    fn from(parity: Parity) -> Self {
        match parity {
            Parity::None => serialport::Parity::None,
            Parity::Odd => serialport::Parity::Odd,
            Parity::Even => serialport::Parity::Even,
        }
    }
}

/// Number of stop bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StopBits {
    One,
    Two,
}

impl From<StopBits> for serialport::StopBits {
    fn from(bits: StopBits) -> Self {
        match bits {
            StopBits::One => serialport::StopBits::One,
            StopBits::Two => serialport::StopBits::Two,
        }
    }
}

/// Modem control outputs driven by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OutputLine {
    Rts,
    Dtr,
}

impl std::fmt::Display for OutputLine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Rts => "RTS",
            Self::Dtr => "DTR",
        })
    }
}

/// Modem status inputs sampled by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum InputLine {
    Cts,
    Dsr,
    Dcd,
    Ri,
}

impl InputLine {
    pub const ALL: [InputLine; 4] = [Self::Cts, Self::Dsr, Self::Dcd, Self::Ri];
}

impl std::fmt::Display for InputLine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Cts => "CTS",
            Self::Dsr => "DSR",
            Self::Dcd => "DCD",
            Self::Ri => "RI",
        })
    }
}

/// Trait for serial port I/O and control-line operations.
///
/// Implemented by the real `serialport`-backed port and by `MockSerialPort`.
pub trait SerialPortAdapter: Send + std::fmt::Debug {
    /// Write bytes to the serial port.
    ///
    /// Returns the number of bytes actually written.
    fn write_bytes(&mut self, data: &[u8]) -> Result<usize, PortError>;

    /// Read bytes from the serial port into the provided buffer.
    ///
    /// Returns the number of bytes actually read. An empty time slice surfaces
    /// as an error for which [`PortError::is_idle`] is true.
    fn read_bytes(&mut self, buffer: &mut [u8]) -> Result<usize, PortError>;

    /// Get the name/path of this serial port.
    fn name(&self) -> &str;

    /// Set the per-read timeout for this port.
    fn set_timeout(&mut self, timeout: Duration) -> Result<(), PortError>;

    /// Discard any unread data in the receive buffer.
    fn clear_input(&mut self) -> Result<(), PortError>;

    /// Open a second handle on the same device for a worker thread.
    ///
    /// The clone shares the device but does not own the terminal snapshot.
    fn try_clone_adapter(&self) -> Result<Box<dyn SerialPortAdapter>, PortError>;

    /// Drive the RTS output line.
    fn set_rts(&mut self, level: bool) -> Result<(), PortError>;

    /// Drive the DTR output line.
    fn set_dtr(&mut self, level: bool) -> Result<(), PortError>;

    /// Read the CTS input line.
    fn read_cts(&mut self) -> Result<bool, PortError>;

    /// Read the DSR input line.
    fn read_dsr(&mut self) -> Result<bool, PortError>;

    /// Read the DCD (carrier detect) input line.
    fn read_dcd(&mut self) -> Result<bool, PortError>;

    /// Read the RI (ring indicator) input line.
    fn read_ri(&mut self) -> Result<bool, PortError>;

    /// Drive one of the output lines.
    fn set_output(&mut self, line: OutputLine, level: bool) -> Result<(), PortError> {
        match line {
            OutputLine::Rts => self.set_rts(level),
            OutputLine::Dtr => self.set_dtr(level),
        }
    }

    /// Read one of the input lines.
    fn read_input(&mut self, line: InputLine) -> Result<bool, PortError> {
        match line {
            InputLine::Cts => self.read_cts(),
            InputLine::Dsr => self.read_dsr(),
            InputLine::Dcd => self.read_dcd(),
            InputLine::Ri => self.read_ri(),
        }
    }

    /// Put back the terminal attributes captured before the port was configured.
    ///
    /// Must be idempotent. Handles that never captured anything return `Ok(())`.
    fn restore_terminal(&mut self) -> Result<(), PortError> {
        Ok(())
    }
}

/// Factory that acquires a configured port for one test run.
pub trait PortOpener: Send + Sync {
    /// Capture the device's terminal attributes, then open and configure it.
    fn open(
        &self,
        port_name: &str,
        config: &PortConfiguration,
    ) -> Result<Box<dyn SerialPortAdapter>, PortError>;
}
