//! Acquisition dispatcher
//!
//! Top-level blocking loop: read frames from the one device session,
//! relay successes, accumulate skip statistics, stop on fatal I/O
//! conditions. Cancellation is cooperative and only happens at read
//! boundaries, never mid-decode.

use std::time::{Duration, Instant};
use tracing::{info, warn};

use crate::device::{DeviceSession, ReadOutcome};
use crate::error::DeviceError;
use crate::relay::RelaySet;

/// Wall-clock cadence of throughput summaries.
const STATS_INTERVAL: Duration = Duration::from_secs(2);

/// Frames/skip counters reset after each summary. Observability only.
struct Throughput {
    frames: u64,
    skipped: u64,
    since: Instant,
}

impl Throughput {
    fn new() -> Self {
        Self {
            frames: 0,
            skipped: 0,
            since: Instant::now(),
        }
    }

    fn maybe_report(&mut self) {
        let elapsed = self.since.elapsed();
        if elapsed < STATS_INTERVAL {
            return;
        }
        let secs = elapsed.as_secs_f64();
        info!(
            frames_per_sec = format_args!("{:.3}", self.frames as f64 / secs),
            skipped_bytes_per_sec = format_args!("{:.3}", self.skipped as f64 / secs),
            "throughput"
        );
        self.frames = 0;
        self.skipped = 0;
        self.since = Instant::now();
    }
}

/// Drives one device session and fans decoded frames out to the relay
/// targets it owns.
pub struct Dispatcher {
    session: Box<dyn DeviceSession>,
    relay: RelaySet,
    read_timeout: Duration,
    echo_frames: bool,
}

impl Dispatcher {
    /// Build a dispatcher over an opened session and a configured relay
    /// set.
    pub fn new(session: Box<dyn DeviceSession>, relay: RelaySet, read_timeout: Duration) -> Self {
        Self {
            session,
            relay,
            read_timeout,
            echo_frames: false,
        }
    }

    /// Also print each decoded message to stdout.
    pub fn echo_frames(mut self, echo: bool) -> Self {
        self.echo_frames = echo;
        self
    }

    /// Run until a fatal condition stops the loop.
    ///
    /// `NoFrame` outcomes accumulate skip statistics and continue; relay
    /// failures are logged, never fatal. Timeout, end of stream, and
    /// transport errors end acquisition and propagate to the caller. The
    /// session and all relay targets are released on return.
    pub fn run(mut self) -> Result<(), DeviceError> {
        info!("starting");
        let mut stats = Throughput::new();
        loop {
            match self.session.read_frame(self.read_timeout) {
                Ok(ReadOutcome::Frame(frame)) => {
                    stats.frames += 1;
                    if self.echo_frames {
                        println!(
                            "{}.{:06} *{};",
                            frame.capture_start.timestamp(),
                            frame.capture_start.timestamp_subsec_micros(),
                            frame.payload_hex
                        );
                    }
                    match self.relay.send(&frame.payload_hex) {
                        Ok(0) => {}
                        Ok(failed) => {
                            warn!(failed, "failed to send message to one or more targets")
                        }
                        Err(e) => warn!(error = %e, "relay rejected payload"),
                    }
                }
                Ok(ReadOutcome::NoFrame { skipped }) => {
                    stats.skipped += skipped;
                }
                Err(e) => {
                    info!("ending");
                    return Err(e);
                }
            }
            stats.maybe_report();
        }
    }
}
