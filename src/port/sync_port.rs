//! Synchronous serial port implementation.
//!
//! Wraps the `serialport` crate's `SerialPort` trait with our own `SerialPortAdapter`
//! trait, and pairs the primary handle with a [`TerminalSnapshot`] so the device's
//! original termios can be put back after a test.

use super::error::PortError;
use super::terminal::TerminalSnapshot;
use super::traits::{PortConfiguration, PortOpener, SerialPortAdapter};
use std::io::{Read, Write};
use std::path::Path;
use std::time::Duration;

/// Synchronous serial port implementation wrapping `serialport::SerialPort`.
pub struct SyncSerialPort {
    /// The underlying serial port implementation.
    port: Box<dyn serialport::SerialPort>,
    /// The port name/path for identification.
    name: String,
    /// Attributes captured before configuration. `None` on cloned handles.
    terminal: Option<TerminalSnapshot>,
}

impl SyncSerialPort {
    /// Capture the terminal attributes of `port_name`, then open it in raw mode.
    ///
    /// # Example
    /// ```no_run
    /// use nexbox_qc::port::{SyncSerialPort, PortConfiguration};
    ///
    /// let config = PortConfiguration::default();
    /// let port = SyncSerialPort::open("/dev/ttyUSB0", config)?;
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn open(port_name: &str, config: PortConfiguration) -> Result<Self, PortError> {
        let terminal = TerminalSnapshot::capture(Path::new(port_name))?;

        let port = serialport::new(port_name, config.baud_rate)
            .data_bits(config.data_bits.into())
            .flow_control(config.flow_control.into())
            .parity(config.parity.into())
            .stop_bits(config.stop_bits.into())
            .timeout(config.timeout)
            .open()
            .map_err(|e| map_open_error(port_name, e))?;

        tracing::debug!(
            device = port_name,
            baud = config.baud_rate,
            "port configured for raw 8N1"
        );

        Ok(Self {
            port,
            name: port_name.to_string(),
            terminal: Some(terminal),
        })
    }

    /// The captured terminal snapshot, if this is the primary handle.
    pub fn terminal(&self) -> Option<&TerminalSnapshot> {
        self.terminal.as_ref()
    }
}

fn map_open_error(port_name: &str, e: serialport::Error) -> PortError {
    match e.kind() {
        serialport::ErrorKind::NoDevice => PortError::not_found(port_name),
        serialport::ErrorKind::InvalidInput => PortError::config(e.to_string()),
        serialport::ErrorKind::Io(std::io::ErrorKind::PermissionDenied) => {
            PortError::permission_denied(port_name)
        }
        _ => PortError::Serial(e),
    }
}

impl SerialPortAdapter for SyncSerialPort {
    fn write_bytes(&mut self, data: &[u8]) -> Result<usize, PortError> {
        self.port.write_all(data).map_err(PortError::Io)?;
        self.port.flush().map_err(PortError::Io)?;
        Ok(data.len())
    }

    fn read_bytes(&mut self, buffer: &mut [u8]) -> Result<usize, PortError> {
        match self.port.read(buffer) {
            Ok(n) => Ok(n),
            Err(e) if e.kind() == std::io::ErrorKind::TimedOut => {
                Err(PortError::timeout(self.port.timeout()))
            }
            Err(e) => Err(PortError::Io(e)),
        }
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn set_timeout(&mut self, timeout: Duration) -> Result<(), PortError> {
        self.port.set_timeout(timeout).map_err(PortError::Serial)
    }

    fn clear_input(&mut self) -> Result<(), PortError> {
        self.port
            .clear(serialport::ClearBuffer::Input)
            .map_err(PortError::Serial)
    }

    fn try_clone_adapter(&self) -> Result<Box<dyn SerialPortAdapter>, PortError> {
        let port = self.port.try_clone().map_err(PortError::Serial)?;
        Ok(Box::new(Self {
            port,
            name: self.name.clone(),
            terminal: None,
        }))
    }

    fn set_rts(&mut self, level: bool) -> Result<(), PortError> {
        self.port
            .write_request_to_send(level)
            .map_err(PortError::Serial)
    }

    fn set_dtr(&mut self, level: bool) -> Result<(), PortError> {
        self.port
            .write_data_terminal_ready(level)
            .map_err(PortError::Serial)
    }

    fn read_cts(&mut self) -> Result<bool, PortError> {
        self.port.read_clear_to_send().map_err(PortError::Serial)
    }

    fn read_dsr(&mut self) -> Result<bool, PortError> {
        self.port.read_data_set_ready().map_err(PortError::Serial)
    }

    fn read_dcd(&mut self) -> Result<bool, PortError> {
        self.port.read_carrier_detect().map_err(PortError::Serial)
    }

    fn read_ri(&mut self) -> Result<bool, PortError> {
        self.port.read_ring_indicator().map_err(PortError::Serial)
    }

    fn restore_terminal(&mut self) -> Result<(), PortError> {
        match self.terminal.as_mut() {
            Some(snapshot) => snapshot.restore(),
            None => Ok(()),
        }
    }
}

impl std::fmt::Debug for SyncSerialPort {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncSerialPort")
            .field("name", &self.name)
            .field("baud_rate", &self.port.baud_rate())
            .field("primary", &self.terminal.is_some())
            .finish()
    }
}

/// Opens real devices through [`SyncSerialPort`].
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemPortOpener;

impl PortOpener for SystemPortOpener {
    fn open(
        &self,
        port_name: &str,
        config: &PortConfiguration,
    ) -> Result<Box<dyn SerialPortAdapter>, PortError> {
        Ok(Box::new(SyncSerialPort::open(port_name, config.clone())?))
    }
}
