//! Decoded squitter frames
//!
//! A [`Frame`] is only ever built from a byte region that passed the owning
//! decoder's full structural validation; partially validated data never
//! surfaces.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Hex length of a 56-bit short squitter payload.
pub const SHORT_SQUITTER_HEX_LEN: usize = 14;

/// Hex length of a 112-bit extended squitter payload.
pub const EXTENDED_SQUITTER_HEX_LEN: usize = 28;

/// One decoded Mode-S message, produced per successful device read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Frame {
    /// Wall clock when the first byte of the attempt was read.
    pub capture_start: DateTime<Utc>,

    /// Wall clock when the frame was complete.
    pub capture_end: DateTime<Utc>,

    /// Device-reported monotonic frame counter, if the family supplies one.
    pub sequence_number: Option<u64>,

    /// Device clock ticks since device boot. Unit is device-specific and
    /// not corrected against wall clock.
    pub device_ticks: Option<u64>,

    /// Transport bytes discarded since the previous successful frame.
    pub skipped_bytes: u64,

    /// Squitter payload as uppercase hex, exactly 14 or 28 characters.
    pub payload_hex: String,
}

/// Whether `len` is a legal squitter hex-string length.
pub fn is_squitter_hex_len(len: usize) -> bool {
    len == SHORT_SQUITTER_HEX_LEN || len == EXTENDED_SQUITTER_HEX_LEN
}

/// Render `bytes` as an uppercase hex string.
pub(crate) fn to_upper_hex(bytes: &[u8]) -> String {
    use std::fmt::Write;
    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        let _ = write!(out, "{b:02X}");
    }
    out
}
