//! tourboxd
//!
//! Reads input reports from a TourBox controller and writes one event name
//! per line to stdout, for a host application (Blender add-on, monitor) to
//! consume. Logs go to stderr.

mod config;
mod device;
mod emitter;
mod lifecycle;
mod runtime;

use anyhow::{Context, Result};
use clap::Parser;
use common::setup_logging;
use config::{DaemonConfig, SourceKind};
use device::{ReplaySource, ReportSource, TtySource, UsbSource, list_devices};
use lifecycle::DaemonExit;
use runtime::{Daemon, shutdown_signal};
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "tourboxd")]
#[command(
    author,
    version,
    about = "TourBox daemon - stream controller events as lines on stdout"
)]
#[command(long_about = "
Reads input reports from a TourBox controller and prints one event name per
line on stdout (e.g. TallDialPress, MouseWheelUp). Reports that do not map to
a known control print as Unknown. Diagnostics go to stderr.

EXAMPLES:
    # Read from the USB device matching the configured filter
    tourboxd

    # Read from the serial interface
    tourboxd --tty /dev/ttyACM0

    # Play back recorded reports (hex bytes, one report per line)
    tourboxd --replay session.txt

    # List USB devices and show which ones match the filter
    tourboxd --list-devices

CONFIGURATION:
    The daemon looks for configuration files in the following order:
    1. Path specified with --config
    2. ~/.config/tourbox/daemon.toml
    3. /etc/tourbox/daemon.toml
    4. Built-in defaults

EXIT STATUS:
    0  stopped by SIGINT/SIGTERM, or replay finished
    1  configuration or startup error
    2  device unavailable after all reconnect attempts
    3  stdout closed by the consumer
")]
struct Args {
    /// Path to configuration file
    #[arg(short, long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Save default configuration to default location and exit
    #[arg(long)]
    save_config: bool,

    /// List USB devices and exit
    #[arg(long)]
    list_devices: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, value_name = "LEVEL")]
    log_level: Option<String>,

    /// Report source (overrides config)
    #[arg(short, long, value_enum)]
    source: Option<SourceKind>,

    /// Serial device to read from (implies --source tty)
    #[arg(long, value_name = "PATH", conflicts_with = "replay")]
    tty: Option<PathBuf>,

    /// Replay file to read from (implies --source replay)
    #[arg(long, value_name = "PATH")]
    replay: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> ExitCode {
    // First, so an interrupt during startup still ends in a clean exit
    let shutdown = match shutdown_signal() {
        Ok(shutdown) => shutdown,
        Err(e) => {
            eprintln!("Error: Failed to install signal handlers: {}", e);
            return DaemonExit::Failure.into();
        }
    };

    let args = Args::parse();

    match run(args, shutdown).await {
        Ok(exit) => exit.into(),
        Err(e) => {
            error!("{:#}", e);
            eprintln!("Error: {:#}", e);
            DaemonExit::Failure.into()
        }
    }
}

async fn run(args: Args, shutdown: impl Future<Output = ()>) -> Result<DaemonExit> {
    // Handle --save-config flag early (before loading config)
    if args.save_config {
        let config = DaemonConfig::default();
        let path = DaemonConfig::default_path();
        config.save(&path).context("Failed to save configuration")?;
        eprintln!("Configuration saved to: {}", path.display());
        return Ok(DaemonExit::Graceful);
    }

    let mut config = if let Some(ref path) = args.config {
        DaemonConfig::load(Some(path.clone())).context("Failed to load configuration")?
    } else {
        DaemonConfig::load_or_default()
    };
    apply_overrides(&mut config, &args);
    config.validate().context("Invalid configuration")?;

    let log_level = args
        .log_level
        .as_deref()
        .unwrap_or(&config.daemon.log_level);
    setup_logging(log_level).context("Failed to setup logging")?;

    info!("tourboxd v{}", env!("CARGO_PKG_VERSION"));
    info!("Log level: {}", log_level);

    if args.list_devices {
        list_devices_mode(&config)?;
        return Ok(DaemonExit::Graceful);
    }

    let source = build_source(&config)?;
    info!(
        "Source: {} ({})",
        config.device.source,
        source.describe()
    );

    let daemon = Daemon::new(
        std::io::stdout(),
        config.reconnect.policy(),
        config.read_timeout(),
    );
    Ok(daemon.run(source, shutdown).await)
}

/// Command-line flags win over the config file
fn apply_overrides(config: &mut DaemonConfig, args: &Args) {
    if let Some(source) = args.source {
        config.device.source = source;
    }
    if let Some(tty) = &args.tty {
        config.device.source = SourceKind::Tty;
        config.device.tty_path = tty.display().to_string();
    }
    if let Some(replay) = &args.replay {
        config.device.source = SourceKind::Replay;
        config.replay.path = Some(replay.display().to_string());
    }
}

fn build_source(config: &DaemonConfig) -> Result<Box<dyn ReportSource>> {
    let source: Box<dyn ReportSource> = match config.device.source {
        SourceKind::Usb => Box::new(UsbSource::new(
            config.usb_filter()?,
            config.device.send_init,
        )),
        SourceKind::Tty => Box::new(TtySource::new(
            config.tty_path(),
            config.device.send_init,
            config.read_timeout(),
        )),
        SourceKind::Replay => {
            let path = config
                .replay_path()
                .context("Replay source selected but no replay file given")?;
            Box::new(ReplaySource::new(
                path,
                Duration::from_millis(config.replay.pace_ms),
                config.replay.hold_open,
            ))
        }
    };
    Ok(source)
}

fn list_devices_mode(config: &DaemonConfig) -> Result<()> {
    let filter = config.usb_filter()?;
    info!("Listing USB devices (filter {})...", filter);

    let devices = list_devices(&filter).context("Failed to enumerate USB devices")?;

    if devices.is_empty() {
        println!("No USB devices found.");
    } else {
        println!("Found {} USB device(s):\n", devices.len());
        for device in devices {
            let marker = if device.matches_filter { "*" } else { " " };
            println!(
                "{} {:04x}:{:04x} - {} {}",
                marker,
                device.vendor_id,
                device.product_id,
                device
                    .manufacturer
                    .as_deref()
                    .unwrap_or("Unknown Manufacturer"),
                device.product.as_deref().unwrap_or("Unknown Product")
            );
            println!("      Bus {:03} Device {:03}", device.bus, device.address);
        }
        println!("\n* matches filter {}", filter);
    }

    Ok(())
}
