//! screenhub host - runs the screen server on a fixed tick
//!
//! Stands in for an emulation loop: it initialises the server, registers
//! the configured screens, ticks the server at the configured rate and shuts
//! it down on SIGINT/SIGTERM.
//!
//! # Usage
//!
//! ```bash
//! # Listen on an ephemeral loopback port
//! screenhubd
//!
//! # Fixed port, framed protocol, two screens
//! screenhubd --port 6510 --wire-format length-prefixed --screen VICII --screen VDC
//!
//! # Custom config file
//! screenhubd --config ./screenhubd.toml
//!
//! # Enable debug logging
//! RUST_LOG=screenhubd=debug screenhubd
//! ```
//!
//! The bound port is printed on stdout as `SCREENHUB_PORT=<port>` so a
//! launcher can hand it to UI client processes.

use std::io::Write;
use std::net::Ipv4Addr;
use std::path::PathBuf;
use std::process;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use screenhub_core::CanvasId;
use screenhub_protocol::WireFormat;
use screenhubd::config::{ScreenConfig, ServerConfig};
use screenhubd::server::UiServer;

/// screenhub host - exposes emulator screens to UI client processes
#[derive(Parser, Debug)]
#[command(name = "screenhubd", version, about)]
struct Args {
    /// Config file (defaults to the user config directory, if present)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Loopback address to listen on
    #[arg(long)]
    bind: Option<Ipv4Addr>,

    /// Port to listen on (0 = OS chooses)
    #[arg(short, long)]
    port: Option<u16>,

    /// Wire format: placeholder or length-prefixed
    #[arg(long)]
    wire_format: Option<WireFormat>,

    /// Tick period in milliseconds
    #[arg(long)]
    tick_ms: Option<u64>,

    /// Register a screen with this name (repeatable)
    #[arg(long = "screen", value_name = "NAME")]
    screens: Vec<String>,

    /// Stop after this many ticks
    #[arg(long)]
    max_ticks: Option<u64>,
}

impl Args {
    /// Layers command-line flags over the loaded configuration.
    fn apply(self, config: &mut ServerConfig) {
        if let Some(bind) = self.bind {
            config.bind_address = bind;
        }
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(format) = self.wire_format {
            config.wire_format = format;
        }
        if let Some(tick_ms) = self.tick_ms {
            config.tick_interval_ms = tick_ms;
        }
        config
            .screens
            .extend(self.screens.into_iter().map(|name| ScreenConfig { name }));
    }
}

fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("screenhubd=info".parse()?)
                .add_directive("screenhub_core=info".parse()?)
                .add_directive("screenhub_protocol=info".parse()?),
        )
        .with_writer(std::io::stderr)
        .init();

    let mut config = ServerConfig::load(args.config.as_deref()).context("Failed to load config")?;
    let max_ticks = args.max_ticks;
    args.apply(&mut config);

    info!(
        version = env!("CARGO_PKG_VERSION"),
        pid = process::id(),
        "screenhub host starting"
    );

    run_host(config, max_ticks)
}

/// Runs the tick loop until a signal, the tick limit, or a fatal error.
#[tokio::main(flavor = "current_thread")]
async fn run_host(config: ServerConfig, max_ticks: Option<u64>) -> Result<()> {
    let tick_interval = config.tick_interval();
    let screens = config.screens.clone();
    let mut server = UiServer::new(config);

    // Canvas ids only need to be distinct; the host owns no real canvases.
    for (index, screen) in screens.iter().enumerate() {
        let canvas = CanvasId::new(index as u64 + 1);
        if let Err(e) = server.add_screen(canvas, &screen.name) {
            warn!(name = %screen.name, error = %e, "Screen not registered");
        }
    }

    let address = server.init().context("Failed to start UI server")?;
    println!("SCREENHUB_PORT={}", address.port());
    std::io::stdout().flush().context("Failed to write port")?;

    let cancel_token = CancellationToken::new();
    let shutdown_token = cancel_token.clone();
    tokio::spawn(async move {
        if let Err(e) = wait_for_shutdown_signal().await {
            error!(error = %e, "Error waiting for shutdown signal");
        }
        info!("Shutdown signal received");
        shutdown_token.cancel();
    });

    let mut ticker = interval(tick_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut ticks: u64 = 0;

    let result = loop {
        tokio::select! {
            _ = cancel_token.cancelled() => break Ok(()),

            _ = ticker.tick() => {
                match server.tick() {
                    Ok(_) => {}
                    Err(e) if e.is_fatal() => {
                        error!(error = %e, "Fatal UI server error");
                        break Err(e);
                    }
                    Err(e) => warn!(error = %e, "UI server tick failed"),
                }

                ticks += 1;
                if max_ticks.is_some_and(|max| ticks >= max) {
                    info!(ticks, "Tick limit reached");
                    break Ok(());
                }
            }
        }
    };

    server.shutdown();
    result.context("UI server stopped on a fatal error")?;

    info!(ticks, "screenhub host stopped");
    Ok(())
}

/// Waits for a shutdown signal (SIGTERM or SIGINT).
async fn wait_for_shutdown_signal() -> Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigterm = signal(SignalKind::terminate())?;
        let mut sigint = signal(SignalKind::interrupt())?;

        tokio::select! {
            _ = sigterm.recv() => {
                info!("Received SIGTERM");
            }
            _ = sigint.recv() => {
                info!("Received SIGINT");
            }
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await?;
        info!("Received Ctrl+C");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags_override_config() {
        let args = Args::parse_from([
            "screenhubd",
            "--port",
            "6510",
            "--wire-format",
            "length-prefixed",
            "--screen",
            "VICII",
            "--screen",
            "VDC",
        ]);
        let mut config = ServerConfig {
            screens: vec![ScreenConfig {
                name: "from file".to_string(),
            }],
            ..ServerConfig::default()
        };

        args.apply(&mut config);

        assert_eq!(config.port, 6510);
        assert_eq!(config.wire_format, WireFormat::LengthPrefixed);
        let names: Vec<_> = config.screens.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["from file", "VICII", "VDC"]);
    }

    #[test]
    fn test_no_flags_keep_config() {
        let args = Args::parse_from(["screenhubd"]);
        let mut config = ServerConfig::default();
        args.apply(&mut config);
        assert_eq!(config, ServerConfig::default());
    }
}
