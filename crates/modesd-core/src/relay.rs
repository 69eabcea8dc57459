//! UDP fan-out relay
//!
//! Each configured target independently renders the decoded payload into
//! its wire variant and gets one best-effort, unacknowledged datagram per
//! frame. One target failing never blocks delivery to the others.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::{SocketAddr, ToSocketAddrs, UdpSocket};
use std::str::FromStr;
use tracing::{debug, warn};

use crate::error::RelayError;
use crate::frame::is_squitter_hex_len;

/// Datagram wire format a target expects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WireVariant {
    /// `*<HEX>;`
    Raw,
    /// `AV*<HEX>;` — the PlanePlotter aggregation client's input format.
    PlanePlotter,
}

impl WireVariant {
    fn render(self, payload_hex: &str) -> String {
        match self {
            WireVariant::Raw => format!("*{payload_hex};"),
            WireVariant::PlanePlotter => format!("AV*{payload_hex};"),
        }
    }
}

/// Parsed `host:port[:variant]` relay target descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetSpec {
    pub host: String,
    pub port: u16,
    pub variant: WireVariant,
}

impl FromStr for TargetSpec {
    type Err = RelayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.splitn(3, ':');
        let host = parts.next().unwrap_or_default();
        let port = parts.next().unwrap_or_default();
        if host.is_empty() || port.is_empty() {
            return Err(RelayError::InvalidTargetSpec(s.to_string()));
        }
        let port: u16 = port
            .parse()
            .ok()
            .filter(|p| *p > 0)
            .ok_or_else(|| RelayError::InvalidTargetSpec(s.to_string()))?;
        let variant = match parts.next() {
            None | Some("raw") => WireVariant::Raw,
            Some("planeplotter") => WireVariant::PlanePlotter,
            Some(_) => return Err(RelayError::InvalidTargetSpec(s.to_string())),
        };
        Ok(TargetSpec {
            host: host.to_string(),
            port,
            variant,
        })
    }
}

impl fmt::Display for TargetSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// One connected fan-out sink. A separate connected socket per target so
/// send errors are attributable.
struct RelayTarget {
    host: String,
    port: u16,
    variant: WireVariant,
    socket: UdpSocket,
}

/// The immutable set of fan-out sinks owned by the dispatcher. Sockets are
/// released when the set is dropped.
#[derive(Default)]
pub struct RelaySet {
    targets: Vec<RelayTarget>,
}

impl RelaySet {
    /// An empty set; `send` on it always fully succeeds.
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve, connect, and add one target. Fatal at configuration time.
    pub fn add(&mut self, host: &str, port: u16, variant: WireVariant) -> Result<(), RelayError> {
        let addr: SocketAddr = (host, port)
            .to_socket_addrs()
            .map_err(|_| RelayError::Resolve(format!("{host}:{port}")))?
            .next()
            .ok_or_else(|| RelayError::Resolve(format!("{host}:{port}")))?;
        let bind_addr: SocketAddr = if addr.is_ipv4() {
            (std::net::Ipv4Addr::UNSPECIFIED, 0).into()
        } else {
            (std::net::Ipv6Addr::UNSPECIFIED, 0).into()
        };
        let socket = UdpSocket::bind(bind_addr)?;
        socket.connect(addr)?;
        debug!(host, port, ?variant, "added relay target");
        self.targets.push(RelayTarget {
            host: host.to_string(),
            port,
            variant,
            socket,
        });
        Ok(())
    }

    /// Add a parsed `host:port[:variant]` descriptor.
    pub fn add_spec(&mut self, spec: &TargetSpec) -> Result<(), RelayError> {
        self.add(&spec.host, spec.port, spec.variant)
    }

    /// Relay one payload to every target.
    ///
    /// Payloads must be exactly 14 or 28 hex characters; anything else is
    /// a caller error and no datagram is sent. Returns the number of
    /// per-target send failures (zero means full success); failures are
    /// logged and independent of each other.
    pub fn send(&self, payload_hex: &str) -> Result<usize, RelayError> {
        if !is_squitter_hex_len(payload_hex.len()) {
            return Err(RelayError::InvalidPayloadLength(payload_hex.len()));
        }
        let mut failures = 0;
        for target in &self.targets {
            let datagram = target.variant.render(payload_hex);
            if let Err(e) = target.socket.send(datagram.as_bytes()) {
                warn!(host = %target.host, port = target.port, error = %e, "relay send failed");
                failures += 1;
            }
        }
        Ok(failures)
    }

    /// Number of configured targets.
    pub fn len(&self) -> usize {
        self.targets.len()
    }

    /// Whether no targets are configured.
    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }
}
