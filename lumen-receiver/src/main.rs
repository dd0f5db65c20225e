//! lumen receiver - entry point.
//!
//! ```text
//! lumen-receiver                   Advertise and listen with defaults
//! lumen-receiver --config <path>   Load a custom config TOML
//! lumen-receiver --port 9100       Override the stream port
//! lumen-receiver --no-discovery    Listen without advertising
//! lumen-receiver --gen-config      Write default config to stdout
//! ```

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

use lumen_core::{DiscoveryServer, StreamReceiver};
use lumen_receiver::config::ReceiverConfig;
use lumen_receiver::sink::LoggingSink;

// ── CLI ──────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "lumen-receiver", about = "lumen LAN screen-stream receiver")]
struct Cli {
    /// Path to configuration TOML file.
    #[arg(short, long, default_value = "lumen-receiver.toml")]
    config: PathBuf,

    /// Stream port (overrides config).
    #[arg(short, long)]
    port: Option<u16>,

    /// Do not answer searches or announce presence.
    #[arg(long)]
    no_discovery: bool,

    /// Print the default configuration to stdout and exit.
    #[arg(long)]
    gen_config: bool,
}

// ── Main ─────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    if cli.gen_config {
        let text = toml::to_string_pretty(&ReceiverConfig::default())?;
        println!("{text}");
        return Ok(());
    }

    let mut config = ReceiverConfig::load(&cli.config);
    if let Some(port) = cli.port {
        config.network.stream_port = port;
    }
    if cli.no_discovery {
        config.discovery.enabled = false;
    }

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("lumen-receiver v{}", env!("CARGO_PKG_VERSION"));

    let stream_config = config.to_stream_config();
    let report_every = stream_config.report_interval;
    let receiver = StreamReceiver::bind(config.stream_bind_addr(), stream_config).await?;

    let shutdown = CancellationToken::new();
    let advertiser = if config.discovery.enabled {
        let server = DiscoveryServer::bind(config.to_advertise_config()).await?;
        println!("Advertising at {}", server.location());
        Some(server.spawn(&shutdown))
    } else {
        info!("discovery disabled");
        None
    };

    println!(
        "Waiting for a sender on port {} (Ctrl-C to quit)",
        receiver.local_addr()?.port()
    );

    let stop = shutdown.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("Ctrl-C received; shutting down");
        stop.cancel();
    });

    let mut sink = LoggingSink::new(report_every);
    receiver.run(&mut sink, shutdown.clone()).await?;

    if let Some(handle) = advertiser {
        tokio::time::timeout(Duration::from_secs(2), handle.shutdown())
            .await
            .map_err(|_| "discovery server did not stop")??;
    }

    println!("Received {}", sink.summary());
    Ok(())
}
