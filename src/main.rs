//! RelayMQ - UDP to TCP topic broker
//!
//! Usage:
//!   relaymq [OPTIONS] <PORT>
//!
//! Options:
//!   -c, --config <FILE>    Configuration file path
//!   -l, --log-level        Log level (error, warn, info, debug, trace)
//!   -h, --help             Print help
//!
//! Type `exit` on standard input (or press Ctrl+C) to shut down once every
//! subscriber has disconnected.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, ValueEnum};
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

use relaymq::broker::Broker;
use relaymq::config::Config;
use relaymq::metrics::{Metrics, MetricsServer};

/// Log level for CLI
#[derive(Debug, Clone, Copy, ValueEnum, Default)]
enum LogLevel {
    /// Only errors
    Error,
    /// Warnings and errors
    Warn,
    /// Informational messages
    #[default]
    Info,
    /// Debug messages
    Debug,
    /// Trace messages (very verbose)
    Trace,
}

impl LogLevel {
    fn to_tracing_level(self) -> Level {
        match self {
            LogLevel::Error => Level::ERROR,
            LogLevel::Warn => Level::WARN,
            LogLevel::Info => Level::INFO,
            LogLevel::Debug => Level::DEBUG,
            LogLevel::Trace => Level::TRACE,
        }
    }

    fn from_config(level: &str) -> Self {
        match level.to_lowercase().as_str() {
            "error" => LogLevel::Error,
            "warn" => LogLevel::Warn,
            "debug" => LogLevel::Debug,
            "trace" => LogLevel::Trace,
            _ => LogLevel::Info,
        }
    }
}

/// RelayMQ - topic broker between UDP publishers and TCP subscribers
#[derive(Parser, Debug)]
#[command(name = "relaymq")]
#[command(version)]
#[command(about = "Topic broker relaying UDP datagrams to TCP subscribers")]
struct Args {
    /// Port for both the UDP and TCP sockets
    port: u16,

    /// Configuration file path (TOML format)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(short, long, value_enum)]
    log_level: Option<LogLevel>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    // Environment overrides apply even without a file
    let file_config = match &args.config {
        Some(path) => Config::load(path),
        None => Config::from_env(),
    };
    let file_config = match file_config {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Error loading configuration: {}", e);
            std::process::exit(1);
        }
    };

    // CLI overrides config, config overrides default (info)
    let log_level = args
        .log_level
        .unwrap_or_else(|| LogLevel::from_config(&file_config.log.level));

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level.to_tracing_level())
        .with_target(false)
        .with_thread_ids(true)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    if let Some(path) = &args.config {
        info!("Loaded configuration from {:?}", path);
    }

    let broker_config = file_config.broker_config(args.port);
    info!("Starting RelayMQ broker");
    info!("  Bind address: {}", broker_config.bind_addr);
    info!("  Outbound queue: {} packets", broker_config.outbound_queue);
    info!("  Handshake timeout: {:?}", broker_config.handshake_timeout);
    match broker_config.drain_timeout {
        Some(timeout) => info!("  Drain timeout: {:?}", timeout),
        None => info!("  Drain timeout: none"),
    }

    let mut broker = Broker::bind(broker_config).await?;

    if file_config.metrics.enabled {
        let metrics = Arc::new(Metrics::new());
        broker.set_metrics(metrics.clone());

        let metrics_server = MetricsServer::bind(metrics, file_config.metrics.bind).await?;
        info!("  Metrics: enabled (http://{})", file_config.metrics.bind);
        tokio::spawn(async move {
            if let Err(e) = metrics_server.run().await {
                error!("Metrics server error: {}", e);
            }
        });
    } else {
        info!("  Metrics: disabled");
    }

    let shutdown = broker.shutdown_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupt received");
            shutdown.shutdown();
        }
    });

    broker.run().await?;

    Ok(())
}
