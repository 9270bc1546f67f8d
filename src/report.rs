//! Human-readable QC report.
//!
//! Checks append tagged lines as they run. SKIP and WARN never stop a run;
//! ERROR lines make the binary exit non-zero.

use chrono::{DateTime, Local};
use std::fmt;

/// Status of one checked property.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Pass,
    Warn,
    /// Precondition unmet. Rendered with the WARN tag.
    Skip,
    Error,
}

impl Status {
    /// Tag printed in front of the line.
    pub fn tag(self) -> &'static str {
        match self {
            Self::Pass => "PASS",
            Self::Warn | Self::Skip => "WARN",
            Self::Error => "ERROR",
        }
    }
}

/// One line of the report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckLine {
    pub status: Status,
    pub check: String,
    pub message: String,
}

impl fmt::Display for CheckLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let prefix = if self.status == Status::Skip {
            "skipped: "
        } else {
            ""
        };
        write!(
            f,
            "[{}] {}: {}{}",
            self.status.tag(),
            self.check,
            prefix,
            self.message
        )
    }
}

/// Accumulated results of one QC pass.
#[derive(Debug, Clone)]
pub struct QcReport {
    device: String,
    started_at: DateTime<Local>,
    lines: Vec<CheckLine>,
}

impl QcReport {
    pub fn new(device: impl Into<String>) -> Self {
        Self {
            device: device.into(),
            started_at: Local::now(),
            lines: Vec::new(),
        }
    }

    pub fn device(&self) -> &str {
        &self.device
    }

    pub fn lines(&self) -> &[CheckLine] {
        &self.lines
    }

    pub fn push(&mut self, status: Status, check: impl Into<String>, message: impl Into<String>) {
        let line = CheckLine {
            status,
            check: check.into(),
            message: message.into(),
        };
        match status {
            Status::Pass => tracing::info!("{}", line),
            Status::Warn | Status::Skip => tracing::warn!("{}", line),
            Status::Error => tracing::error!("{}", line),
        }
        self.lines.push(line);
    }

    pub fn pass(&mut self, check: impl Into<String>, message: impl Into<String>) {
        self.push(Status::Pass, check, message);
    }

    pub fn warn(&mut self, check: impl Into<String>, message: impl Into<String>) {
        self.push(Status::Warn, check, message);
    }

    pub fn skip(&mut self, check: impl Into<String>, message: impl Into<String>) {
        self.push(Status::Skip, check, message);
    }

    pub fn error(&mut self, check: impl Into<String>, message: impl Into<String>) {
        self.push(Status::Error, check, message);
    }

    /// Number of lines with the given status.
    pub fn count(&self, status: Status) -> usize {
        self.lines.iter().filter(|l| l.status == status).count()
    }

    pub fn has_errors(&self) -> bool {
        self.count(Status::Error) > 0
    }

    /// First line recorded for `check`, if any.
    pub fn find(&self, check: &str) -> Option<&CheckLine> {
        self.lines.iter().find(|l| l.check == check)
    }
}

impl fmt::Display for QcReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "nexBox QC report for {} ({})",
            self.device,
            self.started_at.format("%Y-%m-%d %H:%M:%S")
        )?;
        for line in &self.lines {
            writeln!(f, "{line}")?;
        }
        writeln!(
            f,
            "summary: {} pass, {} warn, {} error",
            self.count(Status::Pass),
            self.count(Status::Warn) + self.count(Status::Skip),
            self.count(Status::Error)
        )
    }
}
