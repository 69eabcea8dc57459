//! microADS-B receiver support (SPRUT firmware)
//!
//! The device streams fixed-width ASCII records whose shape depends on the
//! configured output mode:
//!
//! ```text
//! @00001BA972C05DA7717DBBB591;#000000EC;\n\r
//! @<12-hex timecode><14/28-hex squitter>;#<8-hex counter>;\n\r
//! ```
//!
//! The leading marker is `@` when the timecode field is enabled and `*`
//! otherwise, and the line terminator is `\n\r` — reversed relative to the
//! usual convention.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::io::{Read, Write};
use std::ops::BitOr;
use std::time::Duration;
use tracing::{debug, info};

use crate::device::{DecodeOutcome, DecodedPayload, DeviceConfig, DeviceSession, ReadOutcome};
use crate::error::DeviceError;
use crate::frame::{EXTENDED_SQUITTER_HEX_LEN, SHORT_SQUITTER_HEX_LEN};
use crate::transport::{read_line, readn, SerialTransport, Transport};

/// See user.[ch] in the SPRUT firmware source for the command set.
const CMD_READ_VERSION: u8 = 0x00;
const CMD_SET_MODE: u8 = 0x43;
const CMD_RESET: u8 = 0xFF;

/// Firmware versions this driver has been validated against:
/// microADS-B v1 with SPRUT firmware 5 and 6, v2 with firmware 8.
const KNOWN_VERSIONS: [&str; 3] = ["#00-00-05-04", "#00-00-06-04", "#00-00-08-04"];

const REOPEN_ATTEMPTS: u32 = 10;
const REOPEN_SPACING: Duration = Duration::from_secs(1);

const TIMECODE_HEX_LEN: usize = 12;
const COUNTER_HEX_LEN: usize = 8;

/// Output-mode capability bitmask sent with the SET_MODE command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModeFlags(u8);

impl ModeFlags {
    /// Send all demodulated squitters.
    pub const ALL: ModeFlags = ModeFlags(0x02);
    /// Send only ADS-B (DF 17/18/19) squitters.
    pub const ADSB_ONLY: ModeFlags = ModeFlags(0x03);
    /// Send only ADS-B squitters that pass the device's CRC check.
    pub const ADSB_CRC: ModeFlags = ModeFlags(0x04);
    /// Include the 48-bit timecode field.
    pub const TIMECODE: ModeFlags = ModeFlags(0x10);
    /// Include the 32-bit frame-counter field.
    pub const FRAME_NUMBER: ModeFlags = ModeFlags(0x20);

    /// Raw command byte.
    pub const fn bits(self) -> u8 {
        self.0
    }

    /// Rebuild from a raw command byte.
    pub const fn from_bits(bits: u8) -> Self {
        ModeFlags(bits)
    }

    /// Whether records carry the timecode field (and the `@` marker).
    pub const fn has_timecode(self) -> bool {
        self.0 & Self::TIMECODE.0 != 0
    }

    /// Whether records carry the frame-counter field.
    pub const fn has_frame_counter(self) -> bool {
        self.0 & Self::FRAME_NUMBER.0 != 0
    }
}

impl Default for ModeFlags {
    fn default() -> Self {
        Self::ALL | Self::TIMECODE | Self::FRAME_NUMBER
    }
}

impl BitOr for ModeFlags {
    type Output = ModeFlags;

    fn bitor(self, rhs: ModeFlags) -> ModeFlags {
        ModeFlags(self.0 | rhs.0)
    }
}

/// Record geometry derived from the output mode.
#[derive(Debug, Clone, Copy)]
struct Layout {
    timecode: bool,
    counter: bool,
}

impl Layout {
    fn new(flags: ModeFlags) -> Self {
        Self {
            timecode: flags.has_timecode(),
            counter: flags.has_frame_counter(),
        }
    }

    fn marker(self) -> u8 {
        if self.timecode {
            b'@'
        } else {
            b'*'
        }
    }

    fn timecode_len(self) -> usize {
        if self.timecode {
            TIMECODE_HEX_LEN
        } else {
            0
        }
    }

    /// `#` + counter + trailing `;`, when the counter field is enabled.
    fn counter_span(self) -> usize {
        if self.counter {
            1 + COUNTER_HEX_LEN + 1
        } else {
            0
        }
    }

    /// Total record length for a squitter of `sq_len` hex characters:
    /// marker, timecode, squitter, `;`, counter span, `\n\r`.
    fn total_len(self, sq_len: usize) -> usize {
        1 + self.timecode_len() + sq_len + 1 + self.counter_span() + 2
    }
}

/// Decode one record attempt from `r` given the mode the device was put in.
///
/// A wrong leading marker triggers resynchronization: bytes are consumed
/// one at a time until `;` `\n` `\r` has been seen, and exactly that count
/// is reported as skipped. A `;` inside a record (between squitter and
/// counter) does not terminate the scan because it is not followed by
/// `\n\r`. Any other structural problem skips the consumed span.
pub fn decode_frame<R: Read + ?Sized>(
    r: &mut R,
    flags: ModeFlags,
) -> Result<DecodeOutcome, DeviceError> {
    let layout = Layout::new(flags);
    let short_total = layout.total_len(SHORT_SQUITTER_HEX_LEN);
    let long_total = layout.total_len(EXTENDED_SQUITTER_HEX_LEN);

    let mut buf = vec![0u8; long_total];
    readn(r, &mut buf[..short_total])?;

    if buf[0] != layout.marker() {
        let skipped = resync(r)?;
        return Ok(DecodeOutcome::Skip { consumed: skipped });
    }

    // Short records end in '\r'; an extended squitter pushes the
    // terminator 14 characters further out.
    let mut total = short_total;
    if buf[short_total - 1] != b'\r' {
        readn(r, &mut buf[short_total..long_total])?;
        total = long_total;
    }

    if buf[total - 2] != b'\n' || buf[total - 1] != b'\r' {
        debug!("bad record terminator");
        return Ok(DecodeOutcome::Skip {
            consumed: total as u64,
        });
    }

    match parse_record(&buf[..total], layout) {
        Some(payload) => Ok(DecodeOutcome::Payload(payload)),
        None => Ok(DecodeOutcome::Skip {
            consumed: total as u64,
        }),
    }
}

/// Consume bytes until just after the next `;\n\r`; the next byte read
/// should be a record marker. Returns the number of bytes consumed.
fn resync<R: Read + ?Sized>(r: &mut R) -> Result<u64, DeviceError> {
    let mut consumed: u64 = 0;
    let mut window = [0u8; 3];
    let mut byte = [0u8; 1];
    loop {
        readn(r, &mut byte)?;
        consumed += 1;
        window = [window[1], window[2], byte[0]];
        if consumed >= 3 && window == *b";\n\r" {
            return Ok(consumed);
        }
    }
}

/// Fixed-offset field extraction from a terminator-verified record.
fn parse_record(record: &[u8], layout: Layout) -> Option<DecodedPayload> {
    let sq_off = 1 + layout.timecode_len();
    let sq_len = record.len() - sq_off - 1 - layout.counter_span() - 2;

    let ticks = if layout.timecode {
        let field = std::str::from_utf8(&record[1..1 + TIMECODE_HEX_LEN]).ok()?;
        Some(u64::from_str_radix(field, 16).ok()?)
    } else {
        None
    };

    if record[sq_off + sq_len] != b';' {
        debug!("missing squitter separator");
        return None;
    }

    let counter = if layout.counter {
        let off = record.len() - 2 - 1 - COUNTER_HEX_LEN;
        if record[off - 1] != b'#' {
            debug!("missing counter prefix");
            return None;
        }
        let field = std::str::from_utf8(&record[off..off + COUNTER_HEX_LEN]).ok()?;
        Some(u64::from_str_radix(field, 16).ok()?)
    } else {
        None
    };

    let squitter = &record[sq_off..sq_off + sq_len];
    if !squitter.iter().all(u8::is_ascii_hexdigit) {
        debug!("squitter field is not hex");
        return None;
    }
    let payload_hex = std::str::from_utf8(squitter).ok()?.to_string();

    Some(DecodedPayload {
        payload_hex,
        sequence_number: counter,
        device_ticks: ticks,
    })
}

/// Version query and mode-set dialog against an opened, reset device.
pub fn handshake(t: &mut dyn Transport, flags: ModeFlags) -> Result<(), DeviceError> {
    // fetch the version string, just to make sure we haven't gone off the
    // deep end
    t.clear_input()?;
    t.write_all(format!("#{CMD_READ_VERSION:02X}\n").as_bytes())?;
    t.flush()?;
    let version = read_line(t, 128)?;
    if !KNOWN_VERSIONS.iter().any(|k| version.starts_with(k)) {
        return Err(DeviceError::UnknownVersion(version));
    }
    info!(%version, "device version");

    let mode_bits = flags.bits();
    t.write_all(format!("#{CMD_SET_MODE:02X}-{mode_bits:02X}\n").as_bytes())?;
    t.flush()?;
    let ack = read_line(t, 128)?;
    if !ack.starts_with(&format!("#{CMD_SET_MODE:02X}")) {
        return Err(DeviceError::BadAck {
            command: "SET_MODE".into(),
            response: ack,
        });
    }
    Ok(())
}

/// Reset the device and wait for it to come back on the bus.
///
/// Always resetting puts the device in a known mode even when it stayed
/// powered across a replug (a USB hub may have kept it up).
fn reset_and_reopen(path: &str) -> Result<SerialTransport, DeviceError> {
    info!("resetting device");
    {
        let mut t = SerialTransport::open(path)?;
        t.write_all(format!("#{CMD_RESET:02X}\n").as_bytes())?;
        t.flush()?;
    }

    // the reset drops it off the bus for a bit; something is screwy if it
    // takes more than three seconds to come back
    for attempt in 1..=REOPEN_ATTEMPTS {
        std::thread::sleep(REOPEN_SPACING);
        match SerialTransport::open(path) {
            Ok(t) => {
                debug!(attempt, "device back after reset");
                return Ok(t);
            }
            Err(e) => debug!(attempt, error = %e, "device not back yet"),
        }
    }
    Err(DeviceError::Init(format!(
        "device did not reappear within {REOPEN_ATTEMPTS}s of reset"
    )))
}

/// Open a microADSB device per `config` and return a streaming session.
pub fn open(config: &DeviceConfig) -> Result<MicroAdsbSession, DeviceError> {
    let transport = if config.reinitialize {
        let mut t = reset_and_reopen(&config.path)?;
        t.set_timeout(config.read_timeout)?;
        handshake(&mut t, config.mode_flags)?;
        t
    } else {
        SerialTransport::open(&config.path)?
    };
    Ok(MicroAdsbSession::from_transport(
        Box::new(transport),
        config.mode_flags,
    ))
}

/// Streaming session over an initialized microADSB device.
pub struct MicroAdsbSession {
    transport: Box<dyn Transport>,
    flags: ModeFlags,
    skipped_since_frame: u64,
}

impl MicroAdsbSession {
    /// Build a session over an already-initialized transport. `flags` must
    /// match the mode the device was put in.
    pub fn from_transport(transport: Box<dyn Transport>, flags: ModeFlags) -> Self {
        Self {
            transport,
            flags,
            skipped_since_frame: 0,
        }
    }
}

impl DeviceSession for MicroAdsbSession {
    fn read_frame(&mut self, timeout: Duration) -> Result<ReadOutcome, DeviceError> {
        self.transport.set_timeout(timeout)?;
        let capture_start = Utc::now();
        let outcome = decode_frame(&mut *self.transport, self.flags)?;
        let capture_end = Utc::now();
        match outcome {
            DecodeOutcome::Payload(p) => {
                let frame = crate::frame::Frame {
                    capture_start,
                    capture_end,
                    sequence_number: p.sequence_number,
                    device_ticks: p.device_ticks,
                    skipped_bytes: self.skipped_since_frame,
                    payload_hex: p.payload_hex,
                };
                self.skipped_since_frame = 0;
                Ok(ReadOutcome::Frame(frame))
            }
            DecodeOutcome::Skip { consumed } => {
                self.skipped_since_frame += consumed;
                Ok(ReadOutcome::NoFrame { skipped: consumed })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Cursor;

    const SHORT_RECORD: &[u8] = b"@00001BA972C05DA7717DBBB591;#000000EC;\n\r";
    const LONG_RECORD: &[u8] = b"@00001BB20C208D896114583BC127EC054587426E;#000000ED;\n\r";

    #[test]
    fn default_mode_bits() {
        assert_eq!(ModeFlags::default().bits(), 0x32);
        assert!(ModeFlags::default().has_timecode());
        assert!(ModeFlags::default().has_frame_counter());
    }

    #[test]
    fn layout_span_math() {
        let full = Layout::new(ModeFlags::default());
        assert_eq!(full.total_len(SHORT_SQUITTER_HEX_LEN), 40);
        assert_eq!(full.total_len(EXTENDED_SQUITTER_HEX_LEN), 54);
        assert_eq!(full.marker(), b'@');

        let bare = Layout::new(ModeFlags::ALL);
        assert_eq!(bare.total_len(SHORT_SQUITTER_HEX_LEN), 18);
        assert_eq!(bare.marker(), b'*');
    }

    #[test]
    fn decodes_short_record() {
        assert_eq!(SHORT_RECORD.len(), 40);
        let mut src = Cursor::new(SHORT_RECORD.to_vec());
        match decode_frame(&mut src, ModeFlags::default()).unwrap() {
            DecodeOutcome::Payload(p) => {
                assert_eq!(p.payload_hex, "5DA7717DBBB591");
                assert_eq!(p.device_ticks, Some(0x00001BA972C0));
                assert_eq!(p.sequence_number, Some(0xEC));
            }
            other => panic!("expected payload, got {other:?}"),
        }
    }

    #[test]
    fn decodes_extended_record() {
        assert_eq!(LONG_RECORD.len(), 54);
        let mut src = Cursor::new(LONG_RECORD.to_vec());
        match decode_frame(&mut src, ModeFlags::default()).unwrap() {
            DecodeOutcome::Payload(p) => {
                assert_eq!(p.payload_hex, "8D896114583BC127EC054587426E");
                assert_eq!(p.payload_hex.len(), 28);
                assert_eq!(p.sequence_number, Some(0xED));
            }
            other => panic!("expected payload, got {other:?}"),
        }
    }

    #[test]
    fn decodes_record_without_aux_fields() {
        let mut src = Cursor::new(b"*5DA7717DBBB591;\n\r".to_vec());
        match decode_frame(&mut src, ModeFlags::ALL).unwrap() {
            DecodeOutcome::Payload(p) => {
                assert_eq!(p.payload_hex, "5DA7717DBBB591");
                assert_eq!(p.device_ticks, None);
                assert_eq!(p.sequence_number, None);
            }
            other => panic!("expected payload, got {other:?}"),
        }
    }

    #[test]
    fn marker_mismatch_reports_resync_count() {
        // a misaligned span followed by the tail of a record
        let mut bytes = vec![b'X'; 40];
        bytes.extend_from_slice(b"junk;\n\r");
        let mut src = Cursor::new(bytes);
        assert_eq!(
            decode_frame(&mut src, ModeFlags::default()).unwrap(),
            DecodeOutcome::Skip { consumed: 7 }
        );
    }

    #[test]
    fn resync_scans_past_interior_semicolons() {
        let mut bytes = vec![b'X'; 40];
        bytes.extend_from_slice(b";a;b;\n\r");
        let mut src = Cursor::new(bytes);
        assert_eq!(
            decode_frame(&mut src, ModeFlags::default()).unwrap(),
            DecodeOutcome::Skip { consumed: 7 }
        );
    }

    #[test]
    fn resync_handles_adjacent_semicolons() {
        let mut bytes = vec![b'X'; 40];
        bytes.extend_from_slice(b";;\n\r");
        let mut src = Cursor::new(bytes);
        assert_eq!(
            decode_frame(&mut src, ModeFlags::default()).unwrap(),
            DecodeOutcome::Skip { consumed: 4 }
        );
    }

    #[test]
    fn bad_terminator_skips_span() {
        let mut record = SHORT_RECORD.to_vec();
        record[38] = b'X'; // '\n' clobbered; trailing '\r' still looks short
        let mut src = Cursor::new(record);
        assert_eq!(
            decode_frame(&mut src, ModeFlags::default()).unwrap(),
            DecodeOutcome::Skip { consumed: 40 }
        );
    }

    #[test]
    fn non_hex_squitter_skips_span() {
        let mut record = SHORT_RECORD.to_vec();
        record[14] = b'G';
        let mut src = Cursor::new(record);
        assert_eq!(
            decode_frame(&mut src, ModeFlags::default()).unwrap(),
            DecodeOutcome::Skip { consumed: 40 }
        );
    }

    #[test]
    fn missing_counter_prefix_skips_span() {
        let mut record = SHORT_RECORD.to_vec();
        record[28] = b'!';
        let mut src = Cursor::new(record);
        assert_eq!(
            decode_frame(&mut src, ModeFlags::default()).unwrap(),
            DecodeOutcome::Skip { consumed: 40 }
        );
    }
}
