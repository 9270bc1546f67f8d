//! Mock serial port implementation for testing.
//!
//! Provides a `MockSerialPort` that simulates a serial device without requiring
//! hardware: TX/RX wiring, modem-line jumpers, terminal mode and the number of
//! open handles are all observable from the test.

use super::error::PortError;
use super::traits::{InputLine, OutputLine, PortConfiguration, PortOpener, SerialPortAdapter};
use parking_lot::Mutex;
use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;

/// How the simulated TX pin is wired back to RX.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Wiring {
    /// Nothing connected: writes vanish.
    #[default]
    Open,
    /// TX jumpered to RX: every written byte is received.
    Loopback,
    /// Loopback that appends a CR/LF to each write, like a noisy adapter.
    LoopbackCrlf,
    /// Only the first `n` bytes of each write make it back.
    Truncating(usize),
    /// Every byte comes back with its low bit flipped.
    Garbling,
}

/// Terminal mode of the simulated device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TerminalMode {
    /// Whatever the device was left in before the test (line discipline on).
    #[default]
    Cooked,
    /// Raw mode applied by the opener.
    Raw,
}

/// Failure injected into the next call of one kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockFault {
    /// The driver reports an I/O error.
    Io,
    /// The caller lacks access to the device.
    PermissionDenied,
    /// The driver refuses the terminal attributes.
    ConfigRejected,
}

impl MockFault {
    fn into_error(self, device: &str) -> PortError {
        match self {
            Self::Io => PortError::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                "device stopped responding",
            )),
            Self::PermissionDenied => PortError::permission_denied(device),
            Self::ConfigRejected => PortError::config("tcsetattr rejected by driver"),
        }
    }
}

#[derive(Debug, Default)]
struct MockPortState {
    read_queue: VecDeque<u8>,
    write_log: Vec<Vec<u8>>,
    wiring: Wiring,
    jumpers: HashSet<(OutputLine, InputLine)>,
    rts: bool,
    dtr: bool,
    terminal: TerminalMode,
    captured: Option<TerminalMode>,
    restore_count: usize,
    open_fault: Option<MockFault>,
    write_fault: Option<MockFault>,
    drive_fault: Option<MockFault>,
    sample_fault: Option<MockFault>,
    restore_fault: Option<MockFault>,
    open_count: usize,
    open_handles: usize,
    last_config: Option<PortConfiguration>,
    timeout: Duration,
}

impl MockPortState {
    fn input_level(&self, line: InputLine) -> bool {
        [(OutputLine::Rts, self.rts), (OutputLine::Dtr, self.dtr)]
            .into_iter()
            .any(|(output, level)| level && self.jumpers.contains(&(output, line)))
    }
}

/// Mock serial device.
///
/// A value created with [`MockSerialPort::new`] is an observer of the simulated
/// device: cloning it shares the same state. Handles produced through the
/// [`PortOpener`] impl or [`SerialPortAdapter::try_clone_adapter`] are counted
/// in [`MockSerialPort::open_handles`] until dropped.
///
/// # Example
/// ```
/// use nexbox_qc::port::{MockSerialPort, PortConfiguration, PortOpener, SerialPortAdapter, Wiring};
///
/// let device = MockSerialPort::new("/tmp/fake-tty");
/// device.set_wiring(Wiring::Loopback);
///
/// let mut port = device.open("/tmp/fake-tty", &PortConfiguration::default()).unwrap();
/// port.write_bytes(b"ping").unwrap();
///
/// let mut buffer = [0u8; 4];
/// let n = port.read_bytes(&mut buffer).unwrap();
/// assert_eq!(&buffer[..n], b"ping");
///
/// drop(port);
/// assert_eq!(device.open_handles(), 0);
/// ```
pub struct MockSerialPort {
    name: String,
    state: Arc<Mutex<MockPortState>>,
    counted: bool,
    primary: bool,
}

impl MockSerialPort {
    /// Create a new simulated device with the given name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            state: Arc::new(Mutex::new(MockPortState {
                timeout: Duration::from_millis(10),
                ..Default::default()
            })),
            counted: false,
            primary: false,
        }
    }

    /// Change how TX is wired back to RX.
    pub fn set_wiring(&self, wiring: Wiring) {
        self.state.lock().wiring = wiring;
    }

    /// Connect an output line to an input line.
    pub fn add_jumper(&self, output: OutputLine, input: InputLine) {
        self.state.lock().jumpers.insert((output, input));
    }

    /// Enqueue bytes to be returned by subsequent reads (stale data, noise).
    pub fn enqueue_read(&self, data: &[u8]) {
        self.state.lock().read_queue.extend(data);
    }

    /// Make the next `open` fail.
    pub fn fail_next_open(&self, fault: MockFault) {
        self.state.lock().open_fault = Some(fault);
    }

    /// Make the next `write_bytes` on any handle fail.
    pub fn fail_next_write(&self, fault: MockFault) {
        self.state.lock().write_fault = Some(fault);
    }

    /// Make the next RTS/DTR change fail.
    pub fn fail_next_drive(&self, fault: MockFault) {
        self.state.lock().drive_fault = Some(fault);
    }

    /// Make the next CTS/DSR/DCD/RI read fail.
    pub fn fail_next_sample(&self, fault: MockFault) {
        self.state.lock().sample_fault = Some(fault);
    }

    /// Make the next terminal restore on the primary handle fail.
    ///
    /// The captured mode is kept, so the restore on drop still succeeds.
    pub fn fail_next_restore(&self, fault: MockFault) {
        self.state.lock().restore_fault = Some(fault);
    }

    /// Get a copy of all data written to the device.
    pub fn get_write_log(&self) -> Vec<Vec<u8>> {
        self.state.lock().write_log.clone()
    }

    /// Current terminal mode of the device.
    pub fn terminal_mode(&self) -> TerminalMode {
        self.state.lock().terminal
    }

    /// Number of times terminal settings were actually written back.
    pub fn restore_count(&self) -> usize {
        self.state.lock().restore_count
    }

    /// Number of `open` calls, successful or not.
    pub fn open_count(&self) -> usize {
        self.state.lock().open_count
    }

    /// Handles currently holding the device.
    pub fn open_handles(&self) -> usize {
        self.state.lock().open_handles
    }

    /// Configuration passed to the most recent successful `open`.
    pub fn last_config(&self) -> Option<PortConfiguration> {
        self.state.lock().last_config.clone()
    }

    /// Current level of an output line.
    pub fn output_level(&self, line: OutputLine) -> bool {
        let state = self.state.lock();
        match line {
            OutputLine::Rts => state.rts,
            OutputLine::Dtr => state.dtr,
        }
    }

    /// Get the number of bytes available to read.
    pub fn available_bytes(&self) -> usize {
        self.state.lock().read_queue.len()
    }

    fn handle(&self, primary: bool) -> Self {
        self.state.lock().open_handles += 1;
        Self {
            name: self.name.clone(),
            state: Arc::clone(&self.state),
            counted: true,
            primary,
        }
    }

    fn drive(&self, line: OutputLine, level: bool) -> Result<(), PortError> {
        let mut state = self.state.lock();
        if let Some(fault) = state.drive_fault.take() {
            return Err(fault.into_error(&self.name));
        }
        match line {
            OutputLine::Rts => state.rts = level,
            OutputLine::Dtr => state.dtr = level,
        }
        Ok(())
    }

    fn sample(&self, line: InputLine) -> Result<bool, PortError> {
        let mut state = self.state.lock();
        if let Some(fault) = state.sample_fault.take() {
            return Err(fault.into_error(&self.name));
        }
        Ok(state.input_level(line))
    }

    fn drain_into(state: &mut MockPortState, buffer: &mut [u8]) -> usize {
        let mut bytes_read = 0;
        for byte in buffer.iter_mut() {
            match state.read_queue.pop_front() {
                Some(queued) => {
                    *byte = queued;
                    bytes_read += 1;
                }
                None => break,
            }
        }
        bytes_read
    }
}

impl Clone for MockSerialPort {
    /// Clones are uncounted observers of the same device.
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            state: Arc::clone(&self.state),
            counted: false,
            primary: false,
        }
    }
}

impl Drop for MockSerialPort {
    fn drop(&mut self) {
        if self.primary {
            let _ = self.restore_terminal();
        }
        if self.counted {
            let mut state = self.state.lock();
            state.open_handles = state.open_handles.saturating_sub(1);
        }
    }
}

impl PortOpener for MockSerialPort {
    fn open(
        &self,
        _port_name: &str,
        config: &PortConfiguration,
    ) -> Result<Box<dyn SerialPortAdapter>, PortError> {
        {
            let mut state = self.state.lock();
            state.open_count += 1;
            if let Some(fault) = state.open_fault.take() {
                return Err(fault.into_error(&self.name));
            }
            state.captured = Some(state.terminal);
            state.terminal = TerminalMode::Raw;
            state.timeout = config.timeout;
            state.last_config = Some(config.clone());
        }
        Ok(Box::new(self.handle(true)))
    }
}

impl SerialPortAdapter for MockSerialPort {
    fn write_bytes(&mut self, data: &[u8]) -> Result<usize, PortError> {
        let mut state = self.state.lock();
        if let Some(fault) = state.write_fault.take() {
            return Err(fault.into_error(&self.name));
        }
        state.write_log.push(data.to_vec());

        match state.wiring {
            Wiring::Open => {}
            Wiring::Loopback => state.read_queue.extend(data),
            Wiring::LoopbackCrlf => {
                state.read_queue.extend(data);
                state.read_queue.extend(b"\r\n");
            }
            Wiring::Truncating(n) => state.read_queue.extend(data.iter().take(n)),
            Wiring::Garbling => state.read_queue.extend(data.iter().map(|b| b ^ 0x01)),
        }

        Ok(data.len())
    }

    fn read_bytes(&mut self, buffer: &mut [u8]) -> Result<usize, PortError> {
        let timeout = {
            let mut state = self.state.lock();
            let n = Self::drain_into(&mut state, buffer);
            if n > 0 {
                return Ok(n);
            }
            state.timeout
        };

        // Behave like a real tty with VTIME: wait one slice before giving up.
        std::thread::sleep(timeout);

        let mut state = self.state.lock();
        match Self::drain_into(&mut state, buffer) {
            0 => Err(PortError::timeout(timeout)),
            n => Ok(n),
        }
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn set_timeout(&mut self, timeout: Duration) -> Result<(), PortError> {
        self.state.lock().timeout = timeout;
        Ok(())
    }

    fn clear_input(&mut self) -> Result<(), PortError> {
        self.state.lock().read_queue.clear();
        Ok(())
    }

    fn try_clone_adapter(&self) -> Result<Box<dyn SerialPortAdapter>, PortError> {
        Ok(Box::new(self.handle(false)))
    }

    fn set_rts(&mut self, level: bool) -> Result<(), PortError> {
        self.drive(OutputLine::Rts, level)
    }

    fn set_dtr(&mut self, level: bool) -> Result<(), PortError> {
        self.drive(OutputLine::Dtr, level)
    }

    fn read_cts(&mut self) -> Result<bool, PortError> {
        self.sample(InputLine::Cts)
    }

    fn read_dsr(&mut self) -> Result<bool, PortError> {
        self.sample(InputLine::Dsr)
    }

    fn read_dcd(&mut self) -> Result<bool, PortError> {
        self.sample(InputLine::Dcd)
    }

    fn read_ri(&mut self) -> Result<bool, PortError> {
        self.sample(InputLine::Ri)
    }

    fn restore_terminal(&mut self) -> Result<(), PortError> {
        if !self.primary {
            return Ok(());
        }
        let mut state = self.state.lock();
        if let Some(fault) = state.restore_fault.take() {
            return Err(fault.into_error(&self.name));
        }
        if let Some(original) = state.captured.take() {
            state.terminal = original;
            state.restore_count += 1;
        }
        Ok(())
    }
}

impl std::fmt::Debug for MockSerialPort {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockSerialPort")
            .field("name", &self.name)
            .field("primary", &self.primary)
            .field("available_bytes", &self.available_bytes())
            .finish()
    }
}
