//! modesd: Mode-S/ADS-B receiver daemon.
//!
//! Reads squitter frames from a serial-attached receiver (Aurora or
//! microADS-B) and relays each one as a UDP datagram to the configured
//! targets.

use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing::info;

use modesd_core::device::{self, DeviceConfig, DeviceFamily, ModeFlags};
use modesd_core::dispatcher::Dispatcher;
use modesd_core::relay::{RelaySet, TargetSpec};

#[derive(Parser)]
#[command(
    name = "modesd",
    version,
    about = "Mode-S/ADS-B receiver daemon with UDP fan-out"
)]
struct Cli {
    /// Serial device path, e.g. /dev/ttyUSB0
    device: String,

    /// Receiver family: aurora or microadsb
    #[arg(short = 't', long = "type", default_value = "microadsb")]
    family: DeviceFamily,

    /// Attach without resetting and reinitializing the device
    #[arg(long)]
    no_init: bool,

    /// Per-read timeout in seconds
    #[arg(long, default_value = "2")]
    timeout: u64,

    /// microADSB output-mode byte (hex), e.g. 32
    #[arg(long, value_parser = parse_mode_byte)]
    mode: Option<ModeFlags>,

    /// Relay target host:port[:raw|planeplotter]; repeatable
    #[arg(short = 'U', long = "udp-target")]
    targets: Vec<TargetSpec>,

    /// Echo each decoded frame to stdout
    #[arg(short, long)]
    verbose: bool,
}

fn parse_mode_byte(s: &str) -> Result<ModeFlags, String> {
    u8::from_str_radix(s, 16)
        .map(ModeFlags::from_bits)
        .map_err(|e| format!("bad mode byte '{s}': {e}"))
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cli = Cli::parse();

    let mut config = DeviceConfig::new(&cli.device, cli.family);
    config.reinitialize = !cli.no_init;
    config.read_timeout = Duration::from_secs(cli.timeout);
    if let Some(mode) = cli.mode {
        config.mode_flags = mode;
    }

    let mut relay = RelaySet::new();
    for spec in &cli.targets {
        relay
            .add_spec(spec)
            .with_context(|| format!("cannot set up relay target {spec}"))?;
    }
    if relay.is_empty() && !cli.verbose {
        info!("no relay targets configured; frames will only be counted");
    }

    let session = device::open(&config)
        .with_context(|| format!("cannot open device {}", cli.device))?;
    info!(device = %cli.device, family = ?cli.family, targets = relay.len(), "acquiring");

    Dispatcher::new(session, relay, config.read_timeout)
        .echo_frames(cli.verbose)
        .run()
        .context("acquisition ended")?;
    Ok(())
}
