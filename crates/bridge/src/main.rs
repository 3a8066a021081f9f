//! tourbox-monitor
//!
//! Runs the daemon through the host bridge and prints every delivered event.
//! Useful for checking a controller mapping without a host application.

use anyhow::{Context, Result};
use bridge::{BridgeConfig, EventHandler, HostBridge};
use clap::Parser;
use common::setup_logging;
use protocol::Event;
use serde::Serialize;
use std::io::{self, Write};
use std::path::PathBuf;
use std::process::ExitStatus;
use std::time::Instant;
use tokio::signal;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "tourbox-monitor")]
#[command(author, version, about = "Print TourBox events delivered by the host bridge")]
#[command(long_about = "
Starts tourboxd as a child process, reads its event stream through the host
bridge and prints each event on its own line. Stops the daemon on Ctrl+C.

EXAMPLES:
    # Run the daemon found in PATH
    tourbox-monitor

    # JSON lines with timing information
    tourbox-monitor --json

    # Pass arguments through to the daemon
    tourbox-monitor -- --replay session.txt

CONFIGURATION:
    1. Path specified with --config
    2. ~/.config/tourbox/bridge.toml
    3. /etc/tourbox/bridge.toml
    4. Built-in defaults
")]
struct Args {
    /// Path to configuration file
    #[arg(short, long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Save default configuration to default location and exit
    #[arg(long)]
    save_config: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, value_name = "LEVEL")]
    log_level: Option<String>,

    /// Daemon executable (overrides config)
    #[arg(long, value_name = "PATH")]
    daemon: Option<String>,

    /// Print JSON lines instead of bare event names
    #[arg(long)]
    json: bool,

    /// Arguments passed to the daemon
    #[arg(last = true)]
    daemon_args: Vec<String>,
}

#[derive(Serialize)]
struct JsonLine<'a> {
    seq: u64,
    elapsed_ms: u128,
    event: &'a Event,
    control: Option<&'a str>,
    action: Option<&'static str>,
}

/// Prints events to stdout
struct Printer<W> {
    out: W,
    json: bool,
    started: Instant,
    seq: u64,
    exited: Option<Option<ExitStatus>>,
}

impl<W: Write> Printer<W> {
    fn print(&mut self, event: &Event) -> io::Result<()> {
        if self.json {
            let input = event.as_input();
            let line = JsonLine {
                seq: self.seq,
                elapsed_ms: self.started.elapsed().as_millis(),
                event,
                control: input.map(|i| i.control.as_str()),
                action: input.and_then(|i| i.action).map(|a| a.suffix()),
            };
            serde_json::to_writer(&mut self.out, &line)?;
            writeln!(self.out)?;
        } else {
            writeln!(self.out, "{}", event)?;
        }
        self.out.flush()
    }
}

impl<W: Write> EventHandler for Printer<W> {
    fn on_event(&mut self, event: &Event) {
        self.seq += 1;
        if let Err(e) = self.print(event) {
            warn!("Failed to print event: {}", e);
        }
    }

    fn on_daemon_exit(&mut self, status: Option<ExitStatus>) {
        self.exited = Some(status);
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    if args.save_config {
        let config = BridgeConfig::default();
        let path = BridgeConfig::default_path();
        config.save(&path).context("Failed to save configuration")?;
        println!("Configuration saved to: {}", path.display());
        return Ok(());
    }

    let mut config = if let Some(ref path) = args.config {
        BridgeConfig::load(Some(path.clone())).context("Failed to load configuration")?
    } else {
        BridgeConfig::load_or_default()
    };
    if let Some(program) = args.daemon {
        config.daemon.program = program;
    }
    if !args.daemon_args.is_empty() {
        config.daemon.args = args.daemon_args;
    }
    config.validate().context("Invalid configuration")?;

    let log_level = args
        .log_level
        .as_deref()
        .unwrap_or(&config.bridge.log_level);
    setup_logging(log_level).context("Failed to setup logging")?;

    info!("tourbox-monitor v{}", env!("CARGO_PKG_VERSION"));

    let tick = config.bridge.tick();
    let mut bridge = HostBridge::new(config);
    bridge.start().context("Failed to start daemon")?;

    let mut printer = Printer {
        out: io::stdout(),
        json: args.json,
        started: Instant::now(),
        seq: 0,
        exited: None,
    };

    let mut ticker = tokio::time::interval(tick);
    let ctrl_c = signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            _ = &mut ctrl_c => {
                info!("Received Ctrl+C, stopping daemon...");
                bridge.stop();
                break;
            }
            _ = ticker.tick() => {
                bridge.dispatch(&mut printer);
                if let Some(status) = printer.exited {
                    warn!("Daemon exited on its own: {:?}", status);
                    break;
                }
            }
        }
    }

    // Pick up whatever the daemon flushed before exiting
    tokio::time::sleep(tick * 5).await;
    bridge.dispatch(&mut printer);

    info!("{} events delivered", bridge.delivered());
    Ok(())
}
