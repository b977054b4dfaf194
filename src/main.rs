//! Soil Sensor Monitor
//!
//! Connects to an ESP soil moisture sensor over WebSocket and draws the
//! streamed moisture readings as a terminal gauge. Can also send calibration
//! readings to the sensor's wizard.

mod client;
mod config;
mod display;
mod protocol;

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tokio::signal;
use tokio::sync::broadcast;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use client::StreamClient;
use config::{MonitorConfig, CONFIG_FILE};
use display::TerminalGauge;
use protocol::{CalibrationRequest, DEFAULT_BATTERY_FULL_READING, DEFAULT_DRY_READING, DEFAULT_WET_READING};

/// Soil Sensor Monitor
///
/// Streams moisture readings from a soil sensor's WebSocket server
#[derive(Parser, Debug)]
#[command(name = "soilsensor-monitor")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to the configuration file
    #[arg(short, long, default_value = CONFIG_FILE)]
    config: PathBuf,

    /// Sensor host name or IP address
    #[arg(long)]
    host: Option<String>,

    /// Sensor WebSocket port
    #[arg(short, long)]
    port: Option<u16>,

    /// WebSocket sub-protocol token
    #[arg(long, conflicts_with = "no_protocol")]
    protocol: Option<String>,

    /// Connect without a sub-protocol
    #[arg(long)]
    no_protocol: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Stream readings into the gauge (default)
    Watch,

    /// Send calibration readings to the sensor's wizard
    Calibrate {
        /// ADC reading in dry soil
        #[arg(long, default_value_t = DEFAULT_DRY_READING)]
        dry: u16,

        /// ADC reading in wet soil
        #[arg(long, default_value_t = DEFAULT_WET_READING)]
        wet: u16,

        /// ADC reading with a full battery
        #[arg(long, default_value_t = DEFAULT_BATTERY_FULL_READING)]
        battery: u16,
    },

    /// Write the effective configuration to the config file
    InitConfig {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

impl Args {
    /// Apply command line overrides on top of the file configuration
    fn apply_overrides(&self, config: &mut MonitorConfig) {
        if let Some(host) = &self.host {
            config.device.host = host.clone();
        }
        if let Some(port) = self.port {
            config.device.port = port;
        }
        if let Some(protocol) = &self.protocol {
            config.device.subprotocol = protocol.clone();
        }
        if self.no_protocol {
            config.device.subprotocol = String::new();
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize logging
    let default_level = if args.verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .init();

    info!("Soil Sensor Monitor v{}", env!("CARGO_PKG_VERSION"));

    let mut config = MonitorConfig::load(&args.config)
        .with_context(|| format!("loading {}", args.config.display()))?;
    args.apply_overrides(&mut config);
    config.validate()?;

    match args.command.unwrap_or(Command::Watch) {
        Command::Watch => watch(&config).await,
        Command::Calibrate { dry, wet, battery } => {
            calibrate(&config, CalibrationRequest::new(dry, wet, battery)).await
        }
        Command::InitConfig { force } => {
            if args.config.exists() && !force {
                anyhow::bail!(
                    "{} already exists, pass --force to overwrite",
                    args.config.display()
                );
            }
            config.save(&args.config)?;
            info!("Wrote {}", args.config.display());
            Ok(())
        }
    }
}

/// Stream readings to stdout until the sensor goes away or we are interrupted
async fn watch(config: &MonitorConfig) -> anyhow::Result<()> {
    let gauge = TerminalGauge::new(config.gauge(), std::io::stdout());
    let mut client = StreamClient::new(config.endpoint(), config.gauge.element_id.clone(), gauge);

    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);

    // Spawn shutdown signal handler
    tokio::spawn(async move {
        shutdown_signal().await;
        info!("Initiating graceful shutdown...");
        let _ = shutdown_tx.send(());
    });

    client.run(shutdown_rx).await?;

    if client.sink().last_value(&config.gauge.element_id).is_none() {
        warn!("No readings received from {}", client.endpoint());
    }
    info!("Monitor stopped ({})", client.state());
    Ok(())
}

/// Push calibration readings to the sensor; it restarts after storing them
async fn calibrate(config: &MonitorConfig, request: CalibrationRequest) -> anyhow::Result<()> {
    request.validate()?;

    let gauge = TerminalGauge::new(config.gauge(), std::io::stdout());
    let mut client = StreamClient::new(config.endpoint(), config.gauge.element_id.clone(), gauge);

    client.connect().await?;
    client.send_calibration(&request).await?;
    if let Err(e) = client.close().await {
        // The sensor restarts as soon as it has stored the values
        warn!("Connection did not close cleanly: {}", e);
    }

    info!("Calibration sent, the sensor will restart");
    Ok(())
}

/// Wait for shutdown signal (SIGTERM or SIGINT)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received SIGINT (Ctrl+C)");
        }
        _ = terminate => {
            info!("Received SIGTERM");
        }
    }
}
