//! Aurora receiver support
//!
//! RAW-mode frames are enclosed in `DLE STX … DLE ETX` with literal `DLE`
//! bytes inside the body doubled. After a hardware reset the device always
//! comes up in a human-readable NMEA-like mode and must be switched to raw
//! binary streaming once its heartbeat sentence has been seen.

use chrono::Utc;
use std::io::Read;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::device::{DecodeOutcome, DecodedPayload, DeviceConfig, DeviceSession, ReadOutcome};
use crate::error::DeviceError;
use crate::frame::{to_upper_hex, Frame};
use crate::transport::{read_line, readn, SerialTransport, Transport};

const DLE: u8 = 0x10;
const STX: u8 = 0x02;
const ETX: u8 = 0x03;

const FRAME_TYPE_STANDARD: u8 = 0x02;
const FRAME_SUBTYPE_MODE_S: u8 = 0x00;

/// Fixed body length of a standard/Mode-S frame, markers excluded.
const MODE_S_BODY_LEN: usize = 36;

/// Offset of the squitter bytes inside the body. The region is 14 bytes
/// wide; short squitters use the first 7 and the rest is padding.
const PAYLOAD_OFFSET: usize = 21;

/// Offset of the 64-bit device timecode inside the body.
const TICKS_OFFSET: usize = 6;

/// Hard bound on bytes consumed per decode attempt.
const MAX_ATTEMPT_BYTES: u64 = 255;

/// Heartbeat sentence the device emits while in NMEA mode.
const HEARTBEAT_SENTINEL: &str = "$!MSRAHB";

/// Command switching the device into raw binary-frame streaming.
const MODE_RAW_COMMAND: &str = "$!MSRARAW,*00";

/// The device promises its first heartbeat within 15 seconds of reset.
const HEARTBEAT_DEADLINE: Duration = Duration::from_secs(15);

/// DTR must stay high for at least 50ms to reset the device.
const DTR_PULSE: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FramerState {
    OutOfFrame,
    InDle,
    InFrame,
    InDleInFrame,
}

/// Decode one frame attempt from `r`.
///
/// Any input not matching the `DLE STX … DLE ETX` shape, any unknown
/// escape, any oversized attempt, and any structurally invalid body yields
/// `Skip` carrying the number of bytes actually consumed. Only I/O-level
/// conditions (timeout, end of stream, transport failure) are errors.
pub fn decode_frame<R: Read + ?Sized>(r: &mut R) -> Result<DecodeOutcome, DeviceError> {
    let mut body: Vec<u8> = Vec::with_capacity(MODE_S_BODY_LEN);
    let mut state = FramerState::OutOfFrame;
    let mut consumed: u64 = 0;
    let mut byte = [0u8; 1];

    let complete = loop {
        if consumed >= MAX_ATTEMPT_BYTES {
            debug!(consumed, "frame exceeded expected length");
            break false;
        }
        readn(r, &mut byte)?;
        consumed += 1;
        let b = byte[0];
        match state {
            FramerState::OutOfFrame => {
                if b != DLE {
                    return Ok(DecodeOutcome::Skip { consumed });
                }
                state = FramerState::InDle;
            }
            FramerState::InDle => {
                if b != STX {
                    return Ok(DecodeOutcome::Skip { consumed });
                }
                state = FramerState::InFrame;
            }
            FramerState::InFrame => {
                if b == DLE {
                    state = FramerState::InDleInFrame;
                } else {
                    body.push(b);
                }
            }
            FramerState::InDleInFrame => match b {
                // stuffed DLE, un-escape to a single literal
                DLE => {
                    body.push(DLE);
                    state = FramerState::InFrame;
                }
                ETX => break true,
                other => {
                    debug!(byte = other, "unknown DLE-escaped sequence");
                    return Ok(DecodeOutcome::Skip { consumed });
                }
            },
        }
    };

    if !complete {
        return Ok(DecodeOutcome::Skip { consumed });
    }

    match parse_body(&body) {
        Some(payload) => Ok(DecodeOutcome::Payload(payload)),
        None => Ok(DecodeOutcome::Skip { consumed }),
    }
}

/// Structural validation of an isolated frame body.
fn parse_body(body: &[u8]) -> Option<DecodedPayload> {
    if body.len() < 3 {
        debug!(len = body.len(), "frame body too short");
        return None;
    }
    if body[0] != 0x00 {
        warn!(value = body[0], "reserved byte 0 has unexpected value");
    }
    if body[1] != FRAME_TYPE_STANDARD {
        debug!(frame_type = body[1], "unknown frame type");
        return None;
    }
    if body[2] != FRAME_SUBTYPE_MODE_S {
        debug!(subtype = body[2], "unsupported frame subtype");
        return None;
    }
    if body.len() != MODE_S_BODY_LEN {
        debug!(len = body.len(), "invalid length for Mode-S frame");
        return None;
    }

    let ticks = u64::from_be_bytes(body[TICKS_OFFSET..TICKS_OFFSET + 8].try_into().ok()?);

    // The device pads short squitters with junk, so the payload width is
    // keyed on the downlink-format field rather than the region size.
    let df = (body[PAYLOAD_OFFSET] >> 3) & 0x1f;
    let len = if df >= 16 { 14 } else { 7 };
    let payload_hex = to_upper_hex(&body[PAYLOAD_OFFSET..PAYLOAD_OFFSET + len]);

    Some(DecodedPayload {
        payload_hex,
        sequence_number: None,
        device_ticks: Some(ticks),
    })
}

/// Reset the device and drive it into raw streaming mode.
///
/// Tolerates `#`-prefixed device-info lines and logs (but does not reject)
/// anything else while waiting for the heartbeat. Fails definitively if
/// the heartbeat never appears within [`HEARTBEAT_DEADLINE`].
pub fn initialize(t: &mut dyn Transport, read_timeout: Duration) -> Result<(), DeviceError> {
    info!("resetting device");
    t.set_dtr(true)?;
    std::thread::sleep(DTR_PULSE);
    t.set_dtr(false)?;
    t.clear_input()?;

    t.set_timeout(read_timeout)?;
    await_heartbeat(t)?;

    t.write_all(MODE_RAW_COMMAND.as_bytes())?;
    t.flush()?;

    // A few NMEA sentences may still be queued; the frame decoder will
    // skip over them.
    Ok(())
}

fn await_heartbeat(t: &mut dyn Transport) -> Result<(), DeviceError> {
    let deadline = Instant::now() + HEARTBEAT_DEADLINE;
    loop {
        if Instant::now() >= deadline {
            return Err(DeviceError::Init(format!(
                "no heartbeat within {}s of reset",
                HEARTBEAT_DEADLINE.as_secs()
            )));
        }
        let line = match read_line(t, 255) {
            Ok(line) => line,
            Err(DeviceError::Timeout) => continue,
            Err(e) => return Err(e),
        };
        if line.is_empty() {
            continue;
        }
        if line.starts_with(HEARTBEAT_SENTINEL) {
            return Ok(());
        }
        if line.starts_with('#') {
            info!(%line, "device info");
            continue;
        }
        warn!(%line, "unrecognized line after reset");
    }
}

/// Open an Aurora device per `config` and return a streaming session.
pub fn open(config: &DeviceConfig) -> Result<AuroraSession, DeviceError> {
    let mut transport = SerialTransport::open(&config.path)?;
    if config.reinitialize {
        initialize(&mut transport, config.read_timeout)?;
    }
    Ok(AuroraSession::from_transport(Box::new(transport)))
}

/// Streaming session over an initialized Aurora device.
pub struct AuroraSession {
    transport: Box<dyn Transport>,
    skipped_since_frame: u64,
}

impl AuroraSession {
    /// Build a session over an already-initialized transport.
    pub fn from_transport(transport: Box<dyn Transport>) -> Self {
        Self {
            transport,
            skipped_since_frame: 0,
        }
    }
}

impl DeviceSession for AuroraSession {
    fn read_frame(&mut self, timeout: Duration) -> Result<ReadOutcome, DeviceError> {
        self.transport.set_timeout(timeout)?;
        let capture_start = Utc::now();
        let outcome = decode_frame(&mut *self.transport)?;
        let capture_end = Utc::now();
        match outcome {
            DecodeOutcome::Payload(p) => {
                let frame = Frame {
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
