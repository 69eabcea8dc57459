//! # modesd core library
//!
//! Protocol-decode and device-session core of the modesd telemetry
//! forwarder. It ingests a continuous byte stream from a Mode-S/ADS-B
//! receiver on a serial transport, recovers squitter messages from two
//! incompatible on-wire framings, and relays each decoded message to zero
//! or more UDP listeners.
//!
//! Supported receiver families:
//! - Aurora (binary escape-stuffed framing)
//! - microADS-B with SPRUT firmware (delimited ASCII framing)
//!
//! The model is single-threaded blocking I/O: one device session at a
//! time, explicit per-read timeouts, best-effort unacknowledged UDP
//! fan-out. Payloads are forwarded as opaque hex; no CRC checking and no
//! aircraft-state decoding happens here.
//!
//! ## Example
//!
//! ```rust,ignore
//! use modesd_core::prelude::*;
//!
//! let config = DeviceConfig::new("/dev/ttyUSB0", DeviceFamily::MicroAdsb);
//! let session = modesd_core::device::open(&config)?;
//!
//! let mut relay = RelaySet::new();
//! relay.add("127.0.0.1", 30001, WireVariant::Raw)?;
//!
//! Dispatcher::new(session, relay, config.read_timeout).run()?;
//! ```

pub mod device;
pub mod dispatcher;
pub mod error;
pub mod frame;
pub mod relay;
pub mod transport;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::device::{
        DeviceConfig, DeviceFamily, DeviceSession, ModeFlags, ReadOutcome,
    };
    pub use crate::dispatcher::Dispatcher;
    pub use crate::error::{DeviceError, RelayError};
    pub use crate::frame::Frame;
    pub use crate::relay::{RelaySet, TargetSpec, WireVariant};
    pub use crate::transport::{SerialTransport, Transport};
}

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
