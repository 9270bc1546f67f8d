//! Terminal attribute snapshot and restoration.
//!
//! The `serialport` crate rewrites the device's termios when it opens a port
//! (raw mode, baud, flow control). Before that happens we open our own
//! descriptor, record the current attributes and keep the descriptor alive
//! so the attributes can be written back on every exit path.

use super::error::PortError;
use std::path::{Path, PathBuf};

/// Comparable digest of the terminal attributes that matter for a serial port.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TerminalDigest {
    pub input_modes: u64,
    pub output_modes: u64,
    pub control_modes: u64,
    pub local_modes: u64,
    pub input_speed: u32,
    pub output_speed: u32,
}

#[cfg(unix)]
mod imp {
    use super::*;
    use rustix::fd::OwnedFd;
    use rustix::fs::{open, Mode, OFlags};
    use rustix::io::Errno;
    use rustix::termios::{tcgetattr, tcsetattr, OptionalActions, Termios};

    /// Terminal attributes captured before a port was configured.
    pub struct TerminalSnapshot {
        path: PathBuf,
        fd: OwnedFd,
        original: Termios,
        restored: bool,
    }

    impl TerminalSnapshot {
        /// Open `path` without becoming its controlling terminal and record its attributes.
        pub fn capture(path: &Path) -> Result<Self, PortError> {
            let display = path.display().to_string();
            let fd = open(
                path,
                OFlags::RDWR | OFlags::NOCTTY | OFlags::NONBLOCK | OFlags::CLOEXEC,
                Mode::empty(),
            )
            .map_err(|e| map_errno(&display, e))?;

            let original = tcgetattr(&fd).map_err(|e| match e {
                Errno::NOTTY => PortError::config(format!("{display} is not a terminal")),
                other => map_errno(&display, other),
            })?;

            Ok(Self {
                path: path.to_path_buf(),
                fd,
                original,
                restored: false,
            })
        }

        /// Digest of the attributes as they were at capture time.
        pub fn original(&self) -> TerminalDigest {
            digest(&self.original)
        }

        /// Digest of the attributes as they are right now.
        pub fn current(&self) -> Result<TerminalDigest, PortError> {
            let display = self.path.display().to_string();
            tcgetattr(&self.fd)
                .map(|t| digest(&t))
                .map_err(|e| map_errno(&display, e))
        }

        /// Write the captured attributes back. Later calls are no-ops.
        pub fn restore(&mut self) -> Result<(), PortError> {
            if self.restored {
                return Ok(());
            }
            tcsetattr(&self.fd, OptionalActions::Now, &self.original).map_err(|e| {
                PortError::config(format!(
                    "failed to restore terminal settings on {}: {}",
                    self.path.display(),
                    e
                ))
            })?;
            self.restored = true;
            tracing::debug!(device = %self.path.display(), "terminal settings restored");
            Ok(())
        }
    }

    impl Drop for TerminalSnapshot {
        fn drop(&mut self) {
            if let Err(e) = self.restore() {
                tracing::warn!("{}", e);
            }
        }
    }

    impl std::fmt::Debug for TerminalSnapshot {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.debug_struct("TerminalSnapshot")
                .field("path", &self.path)
                .field("original", &self.original())
                .field("restored", &self.restored)
                .finish()
        }
    }

    fn map_errno(device: &str, errno: Errno) -> PortError {
        match errno {
            Errno::ACCESS | Errno::PERM => PortError::permission_denied(device),
            Errno::NOENT | Errno::NODEV | Errno::NXIO => PortError::not_found(device),
            other => PortError::Io(std::io::Error::from(other)),
        }
    }

    fn digest(t: &Termios) -> TerminalDigest {
        TerminalDigest {
            input_modes: t.input_modes.bits() as u64,
            output_modes: t.output_modes.bits() as u64,
            control_modes: t.control_modes.bits() as u64,
            local_modes: t.local_modes.bits() as u64,
            input_speed: t.input_speed(),
            output_speed: t.output_speed(),
        }
    }
}

#[cfg(not(unix))]
mod imp {
    use super::*;

    /// Platforms without termios have nothing to capture.
    #[derive(Debug)]
    pub struct TerminalSnapshot {
        path: PathBuf,
        restored: bool,
    }

    impl TerminalSnapshot {
        pub fn capture(path: &Path) -> Result<Self, PortError> {
            Ok(Self {
                path: path.to_path_buf(),
                restored: false,
            })
        }

        pub fn original(&self) -> TerminalDigest {
            TerminalDigest {
                input_modes: 0,
                output_modes: 0,
                control_modes: 0,
                local_modes: 0,
                input_speed: 0,
                output_speed: 0,
            }
        }

        pub fn current(&self) -> Result<TerminalDigest, PortError> {
            Ok(self.original())
        }

        pub fn restore(&mut self) -> Result<(), PortError> {
            let _ = &self.path;
            self.restored = true;
            Ok(())
        }
    }
}

pub use imp::TerminalSnapshot;
