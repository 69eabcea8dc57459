//! Device polymorphism
//!
//! Exactly two receiver families exist, selected by a configuration-time
//! tag. The acquisition dispatcher is written against [`DeviceSession`]
//! only, never against a specific family.

pub mod aurora;
pub mod microadsb;

use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;

use crate::error::DeviceError;
use crate::frame::Frame;
pub use microadsb::ModeFlags;

/// Supported receiver families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeviceFamily {
    /// Aurora receiver, binary escape-stuffed framing.
    Aurora,
    /// microADS-B receiver (SPRUT firmware), delimited ASCII framing.
    MicroAdsb,
}

impl FromStr for DeviceFamily {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "aurora" => Ok(DeviceFamily::Aurora),
            "microadsb" | "micro-adsb" => Ok(DeviceFamily::MicroAdsb),
            other => Err(format!("unknown device family '{other}'")),
        }
    }
}

/// Configuration-time description of the device to acquire from.
#[derive(Debug, Clone)]
pub struct DeviceConfig {
    /// Serial device path, e.g. `/dev/ttyUSB0`.
    pub path: String,

    /// Which family's framing and initialization dialog to use.
    pub family: DeviceFamily,

    /// Run the family's initialization protocol before streaming. When
    /// false, attach to an already-initialized device.
    pub reinitialize: bool,

    /// Per-read timeout applied to every frame read.
    pub read_timeout: Duration,

    /// microADSB output-mode capability bitmask. Ignored by Aurora.
    pub mode_flags: ModeFlags,
}

impl DeviceConfig {
    /// Config with the usual daemon defaults: reinitialize on open, 2
    /// second read timeout, all squitters with timecode and frame counter
    /// enabled.
    pub fn new(path: impl Into<String>, family: DeviceFamily) -> Self {
        Self {
            path: path.into(),
            family,
            reinitialize: true,
            read_timeout: Duration::from_secs(2),
            mode_flags: ModeFlags::default(),
        }
    }
}

/// Result of one `read_frame` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadOutcome {
    /// A fully validated frame.
    Frame(Frame),
    /// Bytes were consumed without yielding a frame. Not an error; the
    /// caller should read again immediately.
    NoFrame {
        /// Bytes discarded by this attempt.
        skipped: u64,
    },
}

/// Decoder-level result shared by both families: either a validated
/// payload or a count of consumed-and-discarded bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeOutcome {
    Payload(DecodedPayload),
    Skip { consumed: u64 },
}

/// Payload and auxiliary fields recovered by a decoder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedPayload {
    /// Uppercase hex, 14 or 28 characters.
    pub payload_hex: String,
    /// Device frame counter, where the wire format carries one.
    pub sequence_number: Option<u64>,
    /// Device clock ticks, where the wire format carries them.
    pub device_ticks: Option<u64>,
}

/// An opened, streaming device. Owns its transport exclusively.
pub trait DeviceSession: Send {
    /// Read one frame attempt, honoring `timeout` for blocking reads.
    fn read_frame(&mut self, timeout: Duration) -> Result<ReadOutcome, DeviceError>;
}

/// Open the configured device, running its initialization dialog when
/// requested, and return a ready-to-read session.
pub fn open(config: &DeviceConfig) -> Result<Box<dyn DeviceSession>, DeviceError> {
    match config.family {
        DeviceFamily::Aurora => Ok(Box::new(aurora::open(config)?)),
        DeviceFamily::MicroAdsb => Ok(Box::new(microadsb::open(config)?)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn family_from_str() {
        assert_eq!("aurora".parse::<DeviceFamily>().unwrap(), DeviceFamily::Aurora);
        assert_eq!(
            "microADSB".parse::<DeviceFamily>().unwrap(),
            DeviceFamily::MicroAdsb
        );
        assert!("dump1090".parse::<DeviceFamily>().is_err());
    }

    #[test]
    fn default_config_reinitializes() {
        let cfg = DeviceConfig::new("/dev/ttyUSB0", DeviceFamily::MicroAdsb);
        assert!(cfg.reinitialize);
        assert_eq!(cfg.read_timeout, Duration::from_secs(2));
    }
}
