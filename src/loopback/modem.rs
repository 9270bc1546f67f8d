//! Modem control-line continuity checks.
//!
//! With a DB9 jumper plug fitted, driving RTS or DTR should show up on the
//! jumpered status input. A missing transition cannot tell an absent jumper
//! from a dead driver; both are reported the same way.

use crate::port::{InputLine, OutputLine, PortError, SerialPortAdapter};
use std::time::Duration;

/// One output line and the input it is expected to be jumpered to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinePair {
    pub output: OutputLine,
    pub input: InputLine,
}

impl LinePair {
    pub const fn new(output: OutputLine, input: InputLine) -> Self {
        Self { output, input }
    }

    /// Jumper the operator should check, e.g. `RTS↔CTS`.
    pub fn jumper(&self) -> String {
        format!("{}↔{}", self.output, self.input)
    }

    /// Check identifier used in the report, e.g. `rs232.modem.rts-cts`.
    pub fn check_name(&self) -> String {
        format!(
            "rs232.modem.{}-{}",
            self.output.to_string().to_lowercase(),
            self.input.to_string().to_lowercase()
        )
    }
}

/// Pairs exercised, in order.
pub const LINE_PAIRS: [LinePair; 4] = [
    LinePair::new(OutputLine::Rts, InputLine::Cts),
    LinePair::new(OutputLine::Dtr, InputLine::Dsr),
    LinePair::new(OutputLine::Dtr, InputLine::Dcd),
    LinePair::new(OutputLine::Dtr, InputLine::Ri),
];

/// Levels of all six control lines at one instant.
///
/// Outputs are recorded as driven, inputs as read back from the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ModemLineSample {
    pub rts: bool,
    pub dtr: bool,
    pub cts: bool,
    pub dsr: bool,
    pub dcd: bool,
    pub ri: bool,
}

impl ModemLineSample {
    /// Read every input line; `rts`/`dtr` are the levels currently driven.
    pub fn take(port: &mut dyn SerialPortAdapter, rts: bool, dtr: bool) -> Result<Self, PortError> {
        Ok(Self {
            rts,
            dtr,
            cts: port.read_cts()?,
            dsr: port.read_dsr()?,
            dcd: port.read_dcd()?,
            ri: port.read_ri()?,
        })
    }

    pub fn input(&self, line: InputLine) -> bool {
        match line {
            InputLine::Cts => self.cts,
            InputLine::Dsr => self.dsr,
            InputLine::Dcd => self.dcd,
            InputLine::Ri => self.ri,
        }
    }

    /// Inputs whose level differs between `self` and `after`.
    pub fn changed_inputs(&self, after: &Self) -> Vec<InputLine> {
        InputLine::ALL
            .into_iter()
            .filter(|&line| self.input(line) != after.input(line))
            .collect()
    }
}

/// What happened when one output was toggled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PairResult {
    pub pair: LinePair,
    pub before: ModemLineSample,
    pub after: ModemLineSample,
}

impl PairResult {
    /// Whether the paired input followed the output.
    pub fn changed(&self) -> bool {
        self.before.input(self.pair.input) != self.after.input(self.pair.input)
    }

    /// Inputs other than the paired one that moved too.
    pub fn crosstalk(&self) -> Vec<InputLine> {
        self.before
            .changed_inputs(&self.after)
            .into_iter()
            .filter(|&line| line != self.pair.input)
            .collect()
    }
}

/// Toggle `pair.output` high and back low, sampling around the rising edge.
///
/// Both outputs are assumed low on entry and are left low on return, including
/// when sampling fails.
pub async fn exercise_pair(
    port: &mut dyn SerialPortAdapter,
    pair: LinePair,
    settle: Duration,
) -> Result<PairResult, PortError> {
    let before = ModemLineSample::take(port, false, false)?;

    port.set_output(pair.output, true)?;
    tokio::time::sleep(settle).await;

    let (rts, dtr) = match pair.output {
        OutputLine::Rts => (true, false),
        OutputLine::Dtr => (false, true),
    };
    let after = ModemLineSample::take(port, rts, dtr);

    let deassert = port.set_output(pair.output, false);
    tokio::time::sleep(settle).await;

    let after = after?;
    deassert?;

    Ok(PairResult {
        pair,
        before,
        after,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::port::{MockSerialPort, PortConfiguration, PortOpener};

    const SETTLE: Duration = Duration::from_millis(1);

    #[test]
    fn test_pair_names() {
        let pair = LINE_PAIRS[0];
        assert_eq!(pair.jumper(), "RTS↔CTS");
        assert_eq!(pair.check_name(), "rs232.modem.rts-cts");
        assert_eq!(LINE_PAIRS[3].check_name(), "rs232.modem.dtr-ri");
    }

    #[test]
    fn test_changed_inputs() {
        let before = ModemLineSample::default();
        let after = ModemLineSample {
            rts: true,
            cts: true,
            ri: true,
            ..Default::default()
        };
        assert_eq!(
            before.changed_inputs(&after),
            vec![InputLine::Cts, InputLine::Ri]
        );
    }

    #[tokio::test]
    async fn test_rts_toggle_is_isolated_to_cts() {
        let device = MockSerialPort::new("MOCK0");
        device.add_jumper(OutputLine::Rts, InputLine::Cts);
        let mut port = device.open("MOCK0", &PortConfiguration::default()).unwrap();

        let result = exercise_pair(port.as_mut(), LINE_PAIRS[0], SETTLE)
            .await
            .unwrap();
        assert!(result.changed());
        assert!(result.crosstalk().is_empty());
        assert_eq!(result.before.changed_inputs(&result.after), vec![InputLine::Cts]);
        assert!(!device.output_level(OutputLine::Rts), "RTS left asserted");
    }

    #[tokio::test]
    async fn test_unwired_pair_reports_no_change() {
        let device = MockSerialPort::new("MOCK0");
        device.add_jumper(OutputLine::Rts, InputLine::Cts);
        let mut port = device.open("MOCK0", &PortConfiguration::default()).unwrap();

        for pair in &LINE_PAIRS[1..] {
            let result = exercise_pair(port.as_mut(), *pair, SETTLE).await.unwrap();
            assert!(!result.changed(), "{} should not change", pair.jumper());
        }
        assert!(!device.output_level(OutputLine::Dtr));
    }

    #[tokio::test]
    async fn test_dtr_fanout_shows_as_crosstalk() {
        let device = MockSerialPort::new("MOCK0");
        device.add_jumper(OutputLine::Dtr, InputLine::Dsr);
        device.add_jumper(OutputLine::Dtr, InputLine::Dcd);
        let mut port = device.open("MOCK0", &PortConfiguration::default()).unwrap();

        let result = exercise_pair(port.as_mut(), LINE_PAIRS[1], SETTLE)
            .await
            .unwrap();
        assert!(result.changed());
        assert_eq!(result.crosstalk(), vec![InputLine::Dcd]);
    }
}
