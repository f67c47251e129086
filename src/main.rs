// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/quakewatch

//! QuakeWatch - Seismic Telemetry Bridge
//!
//! Reads an ESP32/MPU6050 seismic node over serial, TCP or stdin (or runs a
//! synthetic signal), drives the alarm and streams events to dashboards.

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use quakewatch::{Config, Engine, SourceManager, SourceMode, VERSION};

/// QuakeWatch - Seismic Telemetry Bridge
#[derive(Parser, Debug)]
#[command(name = "quakewatch")]
#[command(author = "bad-antics")]
#[command(version = VERSION)]
#[command(about = "Seismic telemetry bridge with alarm hysteresis and live streaming")]
struct Args {
    /// Configuration file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    /// Enable trace-level logging
    #[arg(long)]
    trace: bool,

    /// Run the synthetic signal model regardless of configuration
    #[arg(long)]
    demo: bool,

    /// Seed for the synthetic signal model
    #[arg(long)]
    seed: Option<u64>,

    /// Serial port of the seismic node
    #[arg(long)]
    serial: Option<String>,

    /// Serial baud rate
    #[arg(long)]
    baud: Option<u32>,

    /// TCP address of a serial bridge
    #[arg(long, conflicts_with = "serial")]
    tcp: Option<String>,

    /// Read node output from stdin
    #[arg(long, conflicts_with_all = ["serial", "tcp"])]
    stdin: bool,

    /// WebSocket server port
    #[arg(long)]
    ws_port: Option<u16>,

    /// Disable the WebSocket server
    #[arg(long)]
    no_websocket: bool,

    /// Seconds between status lines
    #[arg(long, default_value = "60")]
    status_interval: u64,
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Load or create configuration
    let config_path = args.config.clone().unwrap_or_else(Config::default_path);
    let mut config = Config::load_or_create(&config_path)?;

    // Initialize logging
    let log_level = if args.trace {
        Level::TRACE
    } else if args.debug {
        Level::DEBUG
    } else {
        config.log_level.parse().unwrap_or(Level::INFO)
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .with_thread_ids(true)
        .with_file(args.debug)
        .with_line_number(args.debug)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    info!("QuakeWatch v{} - Seismic Telemetry Bridge", VERSION);
    info!("Configuration loaded from {:?}", config_path);

    // Override with command line args
    if args.demo {
        config.source.mode = SourceMode::Simulation;
    } else if args.serial.is_some() || args.tcp.is_some() || args.stdin {
        config.source.mode = SourceMode::Hardware;
    }
    if let Some(port) = &args.serial {
        config.source.serial_port = Some(port.clone());
    }
    if let Some(baud) = args.baud {
        config.source.baud_rate = baud;
    }
    if let Some(seed) = args.seed {
        config.signal.seed = Some(seed);
    }
    if let Some(port) = args.ws_port {
        config.streaming.websocket_port = port;
    }
    if args.no_websocket {
        config.streaming.websocket_enabled = false;
    }
    config.validate()?;

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(run_headless(config, args))
}

/// Run until Ctrl+C
async fn run_headless(config: Config, args: Args) -> Result<()> {
    use tokio::sync::broadcast;

    let (shutdown_tx, _) = broadcast::channel::<()>(1);

    let engine = Arc::new(Engine::new(config.clone()));
    let manager = SourceManager::new(engine.clone());
    info!("Core engine initialized");

    #[cfg(feature = "websocket")]
    let _server = if config.streaming.websocket_enabled {
        let server = quakewatch::WebSocketServer::new(&config.streaming, engine.clone());
        server.start(shutdown_tx.subscribe()).await?;
        Some(server)
    } else {
        None
    };

    match config.source.mode {
        SourceMode::Simulation => manager.start_simulation().await,
        SourceMode::Hardware => start_hardware(&manager, &config, &args).await?,
    }

    info!("QuakeWatch running, press Ctrl+C to shutdown");

    let mut status = tokio::time::interval(std::time::Duration::from_secs(args.status_interval.max(1)));
    status.tick().await;
    loop {
        tokio::select! {
            _ = status.tick() => {
                let alarm = engine.alarm_snapshot();
                let stats = engine.stats();
                info!(
                    "Alarm {} (intensity {:.2}, peak {:.2}) | {} lines, {} samples | {} subscribers, {} dropped",
                    alarm.status.label(),
                    alarm.intensity,
                    alarm.peak,
                    stats.lines,
                    stats.samples,
                    stats.hub.subscribers,
                    stats.hub.dropped,
                );
            }
            result = tokio::signal::ctrl_c() => {
                result?;
                break;
            }
        }
    }

    info!("Shutdown signal received, cleaning up...");
    let _ = shutdown_tx.send(());
    manager.stop().await;

    let activities = engine.activities();
    if !activities.is_empty() {
        info!("{} seismic events recorded this session", activities.len());
    }
    info!("QuakeWatch shutdown complete");

    Ok(())
}

async fn start_hardware(manager: &SourceManager, config: &Config, args: &Args) -> Result<()> {
    use quakewatch::sensors::{write_commands, ChannelCommandSink, CommandSink, ReaderSource};
    use tokio::io::BufReader;

    if let Some(addr) = &args.tcp {
        let stream = tokio::net::TcpStream::connect(addr).await?;
        let (reader, writer) = stream.into_split();
        let (sink, commands) = ChannelCommandSink::channel(config.source.command_queue);
        tokio::spawn(async move {
            if let Err(e) = write_commands(writer, commands).await {
                warn!("Command writer stopped: {}", e);
            }
        });
        let sink: Arc<dyn CommandSink> = Arc::new(sink);
        manager
            .start_source(ReaderSource::new(addr, BufReader::new(reader)), Some(sink))
            .await;
        return Ok(());
    }

    if args.stdin {
        // Read-only: no way back to the node
        let source = ReaderSource::new("stdin", BufReader::new(tokio::io::stdin()));
        manager.start_source(source, None).await;
        return Ok(());
    }

    #[cfg(feature = "serial")]
    {
        if let Some(port) = &config.source.serial_port {
            let (source, sink) =
                quakewatch::sensors::open_serial(port, config.source.baud_rate, config.source.command_queue)?;
            let sink: Arc<dyn CommandSink> = Arc::new(sink);
            manager.start_source(source, Some(sink)).await;
            return Ok(());
        }
    }

    warn!("Hardware mode without a usable link, falling back to the synthetic source");
    manager.start_simulation().await;
    Ok(())
}
