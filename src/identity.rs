//! Product Serial Number detection.
//!
//! The QC report is tied to a unit by its serial number. An explicitly
//! configured value wins; otherwise a few well-known system files are tried in
//! order. All lookups are best-effort and never fail the run.

use std::fmt;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Where a serial number was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentitySource {
    /// Configuration file, CLI flag or `SERIAL_NUMBER`.
    Configured,
    /// `/etc/dietpi/.product_id`.
    ProductId,
    /// `/sys/class/dmi/id/product_serial`.
    Dmi,
    /// `/proc/cpuinfo`.
    CpuInfo,
}

impl fmt::Display for IdentitySource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Configured => "configuration",
            Self::ProductId => "/etc/dietpi/.product_id",
            Self::Dmi => "DMI product_serial",
            Self::CpuInfo => "/proc/cpuinfo",
        })
    }
}

/// A detected Product Serial Number.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceIdentity {
    pub serial_number: String,
    pub source: IdentitySource,
}

/// Looks up the serial number under a filesystem root (`/` outside tests).
#[derive(Debug, Clone)]
pub struct IdentityDetector {
    root: PathBuf,
}

impl IdentityDetector {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Use `configured` if non-blank, else probe the system files.
    pub fn resolve(&self, configured: Option<&str>) -> Option<DeviceIdentity> {
        if let Some(value) = configured.map(str::trim).filter(|v| !v.is_empty()) {
            return Some(DeviceIdentity {
                serial_number: value.to_string(),
                source: IdentitySource::Configured,
            });
        }
        self.detect()
    }

    /// Probe the system files in priority order.
    pub fn detect(&self) -> Option<DeviceIdentity> {
        let probes: [(IdentitySource, fn(&str) -> Option<String>, &str); 3] = [
            (IdentitySource::ProductId, parse_product_id, "etc/dietpi/.product_id"),
            (IdentitySource::Dmi, parse_dmi_serial, "sys/class/dmi/id/product_serial"),
            (IdentitySource::CpuInfo, parse_cpuinfo, "proc/cpuinfo"),
        ];

        probes.into_iter().find_map(|(source, parse, relative)| {
            let path = self.root.join(relative);
            let text = read_lossy(&path)?;
            let serial_number = parse(&text)?;
            debug!(%source, %serial_number, "serial number detected");
            Some(DeviceIdentity {
                serial_number,
                source,
            })
        })
    }
}

impl Default for IdentityDetector {
    fn default() -> Self {
        Self::new("/")
    }
}

fn read_lossy(path: &Path) -> Option<String> {
    std::fs::read(path)
        .ok()
        .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
}

/// `SERIAL_NUMBER=...` line of a `KEY=VALUE` file, quotes stripped.
fn parse_product_id(text: &str) -> Option<String> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .find_map(|line| line.strip_prefix("SERIAL_NUMBER="))
        .map(|value| value.trim().trim_matches(|c| c == '"' || c == '\'').to_string())
        .filter(|value| !value.is_empty())
}

fn parse_dmi_serial(text: &str) -> Option<String> {
    let value = text.trim();
    if value.is_empty() || value.eq_ignore_ascii_case("unknown") {
        return None;
    }
    Some(value.to_string())
}

/// `Serial : 00000000abcdef01` as printed on Raspberry Pi class boards.
fn parse_cpuinfo(text: &str) -> Option<String> {
    text.lines()
        .filter(|line| line.to_ascii_lowercase().starts_with("serial"))
        .find_map(|line| line.split_once(':'))
        .map(|(_, value)| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn write(root: &Path, relative: &str, contents: &str) {
        let path = root.join(relative);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, contents).unwrap();
    }

    #[test]
    fn test_configured_value_wins() {
        let root = tempfile::tempdir().unwrap();
        write(root.path(), "proc/cpuinfo", "Serial\t\t: 1234\n");

        let identity = IdentityDetector::new(root.path())
            .resolve(Some("  NB-0042 "))
            .unwrap();
        assert_eq!(identity.serial_number, "NB-0042");
        assert_eq!(identity.source, IdentitySource::Configured);
    }

    #[test]
    fn test_blank_configured_value_falls_back() {
        let root = tempfile::tempdir().unwrap();
        write(root.path(), "proc/cpuinfo", "processor\t: 0\nSerial\t\t: 10000000abcd\n");

        let identity = IdentityDetector::new(root.path()).resolve(Some("  ")).unwrap();
        assert_eq!(identity.serial_number, "10000000abcd");
        assert_eq!(identity.source, IdentitySource::CpuInfo);
    }

    #[test]
    fn test_product_id_has_priority() {
        let root = tempfile::tempdir().unwrap();
        write(
            root.path(),
            "etc/dietpi/.product_id",
            "# generated\nMODEL=nexBox\nSERIAL_NUMBER=\"NB-7\"\n",
        );
        write(root.path(), "sys/class/dmi/id/product_serial", "DMI-1\n");

        let identity = IdentityDetector::new(root.path()).detect().unwrap();
        assert_eq!(identity.serial_number, "NB-7");
        assert_eq!(identity.source, IdentitySource::ProductId);
    }

    #[test]
    fn test_unknown_dmi_is_ignored() {
        let root = tempfile::tempdir().unwrap();
        write(root.path(), "sys/class/dmi/id/product_serial", "Unknown\n");
        assert_eq!(IdentityDetector::new(root.path()).detect(), None);
    }

    #[test]
    fn test_parsers() {
        assert_eq!(parse_product_id("SERIAL_NUMBER=''\n"), None);
        assert_eq!(parse_product_id("SERIAL_NUMBER= abc \n"), Some("abc".into()));
        assert_eq!(parse_dmi_serial("  \n"), None);
        assert_eq!(parse_cpuinfo("model name : ARMv7\n"), None);
    }
}
