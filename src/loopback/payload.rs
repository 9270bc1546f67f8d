//! Loopback payload generation and comparison.

use rand::distributions::Alphanumeric;
use rand::rngs::OsRng;
use rand::Rng;

/// Largest payload a single trial will send.
pub const MAX_PAYLOAD_LEN: usize = 4096;

/// Fresh printable payload drawn from the OS CSPRNG.
///
/// A new random payload per trial keeps stale bytes sitting in a UART FIFO from
/// producing a false PASS. Lengths above [`MAX_PAYLOAD_LEN`] are clamped.
pub fn generate_payload(len: usize) -> Vec<u8> {
    OsRng
        .sample_iter(&Alphanumeric)
        .take(len.min(MAX_PAYLOAD_LEN))
        .collect()
}

/// Drop CR and LF bytes picked up from adapters and line disciplines.
pub fn strip_line_noise(bytes: &[u8]) -> Vec<u8> {
    bytes
        .iter()
        .copied()
        .filter(|b| !matches!(b, b'\r' | b'\n'))
        .collect()
}

/// Count the bytes that would survive [`strip_line_noise`].
pub(crate) fn significant_len(bytes: &[u8]) -> usize {
    bytes.iter().filter(|b| !matches!(b, b'\r' | b'\n')).count()
}
