//! Busy-device detection.
//!
//! The tester must never open a serial device that another process is holding,
//! and must never kill that process. Whether a device is held is answered by a
//! [`BusyProbe`]; the system implementation asks `fuser`, then `lsof`, then
//! walks `/proc/<pid>/fd` itself. Any failure to answer means "assume free".

use serde::{Deserialize, Serialize};
use std::io;
use std::path::{Path, PathBuf};
use std::process::Command;
use thiserror::Error;
use tracing::debug;

/// Errors raised while looking for processes holding a device.
#[derive(Debug, Error)]
pub enum BusyProbeError {
    /// An introspection tool ran but its answer could not be used.
    #[error("{tool} failed: {message}")]
    Tool { tool: &'static str, message: String },

    /// The process table could not be scanned.
    #[error("process table scan failed: {0}")]
    Scan(#[source] io::Error),
}

/// Capability to find the PIDs of processes holding a device open.
#[cfg_attr(test, mockall::automock)]
pub trait BusyProbe: Send + Sync {
    /// PIDs holding `device`, excluding the calling process. Empty means free.
    fn holders(&self, device: &Path) -> Result<Vec<u32>, BusyProbeError>;

    /// Short name used in logs.
    fn name(&self) -> &'static str;
}

/// Which probe to use, as selected in configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum BusyCheck {
    /// Ask the system which processes hold the device.
    #[default]
    System,
    /// Skip detection and treat every device as free.
    None,
}

impl BusyCheck {
    /// Build the probe for this mode.
    pub fn probe(self) -> Box<dyn BusyProbe> {
        match self {
            Self::System => Box::new(SystemBusyProbe::new()),
            Self::None => Box::new(NoBusyProbe),
        }
    }
}

/// Probe that always reports the device as free.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoBusyProbe;

impl BusyProbe for NoBusyProbe {
    fn holders(&self, _device: &Path) -> Result<Vec<u32>, BusyProbeError> {
        Ok(Vec::new())
    }

    fn name(&self) -> &'static str {
        "none"
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Tool {
    Fuser,
    Lsof,
}

impl Tool {
    fn program(self) -> &'static str {
        match self {
            Self::Fuser => "fuser",
            Self::Lsof => "lsof",
        }
    }

    fn command(self, device: &Path) -> Command {
        let mut cmd = Command::new(self.program());
        match self {
            Self::Fuser => {
                cmd.arg(device);
            }
            Self::Lsof => {
                cmd.arg("-t").arg(device);
            }
        }
        cmd
    }
}

/// Best-effort probe using whatever introspection the system offers.
#[derive(Debug, Clone)]
pub struct SystemBusyProbe {
    proc_root: PathBuf,
    use_tools: bool,
    self_pid: u32,
}

impl SystemBusyProbe {
    /// Try `fuser`, `lsof`, then the `/proc` scan.
    pub fn new() -> Self {
        Self {
            proc_root: PathBuf::from("/proc"),
            use_tools: true,
            self_pid: std::process::id(),
        }
    }

    /// Scan only, against an alternative proc root.
    pub fn with_proc_root(proc_root: impl Into<PathBuf>) -> Self {
        Self {
            proc_root: proc_root.into(),
            use_tools: false,
            self_pid: std::process::id(),
        }
    }

    /// Run one tool. `Ok(None)` means it is not installed.
    fn ask_tool(&self, tool: Tool, device: &Path) -> Result<Option<Vec<u32>>, BusyProbeError> {
        let output = match tool.command(device).output() {
            Ok(output) => output,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(BusyProbeError::Tool {
                    tool: tool.program(),
                    message: e.to_string(),
                })
            }
        };

        let stdout = String::from_utf8_lossy(&output.stdout);
        let pids = parse_pid_list(&stdout);

        // Both tools exit 1 when nothing holds the file.
        if output.status.success() || (output.status.code() == Some(1) && pids.is_empty()) {
            return Ok(Some(pids));
        }

        Err(BusyProbeError::Tool {
            tool: tool.program(),
            message: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        })
    }

    /// Walk `<proc_root>/<pid>/fd/*` looking for links to `device`.
    fn scan_proc(&self, device: &Path) -> Result<Vec<u32>, BusyProbeError> {
        let target = device
            .canonicalize()
            .unwrap_or_else(|_| device.to_path_buf());
        let mut pids = Vec::new();

        for entry in std::fs::read_dir(&self.proc_root).map_err(BusyProbeError::Scan)? {
            let Ok(entry) = entry else { continue };
            let Some(pid) = entry
                .file_name()
                .to_str()
                .and_then(|name| name.parse::<u32>().ok())
            else {
                continue;
            };

            // Other users' fd tables are unreadable without privileges.
            let Ok(fds) = std::fs::read_dir(entry.path().join("fd")) else {
                continue;
            };

            let holds = fds.flatten().any(|fd| {
                std::fs::read_link(fd.path())
                    .map(|link| link == target || link.canonicalize().ok().as_ref() == Some(&target))
                    .unwrap_or(false)
            });
            if holds {
                pids.push(pid);
            }
        }

        pids.sort_unstable();
        Ok(pids)
    }
}

impl Default for SystemBusyProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl BusyProbe for SystemBusyProbe {
    fn holders(&self, device: &Path) -> Result<Vec<u32>, BusyProbeError> {
        if self.use_tools {
            for tool in [Tool::Fuser, Tool::Lsof] {
                match self.ask_tool(tool, device) {
                    Ok(Some(pids)) => {
                        debug!(tool = tool.program(), ?pids, "busy probe answered");
                        return Ok(without_pid(pids, self.self_pid));
                    }
                    Ok(None) => debug!(tool = tool.program(), "not installed"),
                    Err(e) => debug!("{}", e),
                }
            }
        }

        self.scan_proc(device)
            .map(|pids| without_pid(pids, self.self_pid))
    }

    fn name(&self) -> &'static str {
        "system"
    }
}

fn without_pid(mut pids: Vec<u32>, pid: u32) -> Vec<u32> {
    pids.retain(|&p| p != pid);
    pids.dedup();
    pids
}

/// Extract PIDs from `fuser`/`lsof -t` output.
///
/// `fuser` decorates PIDs with access letters (`1234c`, `88m`).
fn parse_pid_list(output: &str) -> Vec<u32> {
    output
        .split_whitespace()
        .filter_map(|token| {
            token
                .trim_end_matches(|c: char| c.is_ascii_alphabetic())
                .parse()
                .ok()
        })
        .collect()
}
