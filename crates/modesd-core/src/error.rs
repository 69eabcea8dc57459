//! Device and relay error types

use thiserror::Error;

/// Errors surfaced by device sessions and initialization dialogs.
///
/// Frame-structure problems (bad framing, unsupported types, malformed
/// ASCII grammar) are never errors; decoders downgrade them to a
/// skipped-byte outcome so the stream can resynchronize.
#[derive(Error, Debug)]
pub enum DeviceError {
    #[error("serial port error: {0}")]
    Serial(String),

    /// No data within the configured read window. Distinct from end of
    /// stream and from a transport failure.
    #[error("read timeout")]
    Timeout,

    #[error("end of stream")]
    Eof,

    #[error("initialization failed: {0}")]
    Init(String),

    #[error("unknown device version string: {0:?}")]
    UnknownVersion(String),

    #[error("unexpected response to {command}: {response:?}")]
    BadAck { command: String, response: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors raised when configuring or invoking the UDP relay.
///
/// Per-target send failures are counted and logged, never returned as an
/// error; these variants cover caller mistakes and configuration-time
/// socket setup only.
#[derive(Error, Debug)]
pub enum RelayError {
    #[error("payload length {0} is not a valid squitter length (expected 14 or 28)")]
    InvalidPayloadLength(usize),

    #[error("unable to resolve relay target '{0}'")]
    Resolve(String),

    #[error("socket error: {0}")]
    Socket(#[from] std::io::Error),

    #[error("invalid relay target spec '{0}' (expected host:port[:variant])")]
    InvalidTargetSpec(String),
}
