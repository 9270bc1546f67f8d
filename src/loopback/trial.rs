//! A single byte-loopback exchange and its verdict.

use super::payload::strip_line_noise;

/// Outcome of comparing what came back with what was sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrialVerdict {
    /// Byte-for-byte identical after stripping CR/LF.
    Pass,
    /// Something arrived but it does not match.
    Garbled { received: usize, expected: usize },
    /// Nothing arrived before the deadline.
    NoData,
}

/// Payload sent and bytes received during one trial.
#[derive(Debug, Clone)]
pub struct LoopbackTrial {
    payload: Vec<u8>,
    received: Vec<u8>,
}

impl LoopbackTrial {
    pub fn new(payload: Vec<u8>, received: Vec<u8>) -> Self {
        Self { payload, received }
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub fn received(&self) -> &[u8] {
        &self.received
    }

    pub fn verdict(&self) -> TrialVerdict {
        let cleaned = strip_line_noise(&self.received);
        if cleaned.is_empty() {
            TrialVerdict::NoData
        } else if cleaned == self.payload {
            TrialVerdict::Pass
        } else {
            TrialVerdict::Garbled {
                received: cleaned.len(),
                expected: self.payload.len(),
            }
        }
    }
}
