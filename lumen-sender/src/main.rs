//! lumen sender - entry point.
//!
//! ```text
//! lumen-sender                        Discover, pick a receiver, stream
//! lumen-sender --target <ip:port>     Skip discovery
//! lumen-sender --first                Stream to the first receiver found
//! lumen-sender --list                 Discover, print receivers, exit
//! lumen-sender --config <path>        Use custom config TOML
//! lumen-sender --gen-config           Dump default config and exit
//! ```

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

use lumen_core::{DiscoveryClient, StreamSender, list_devices, select_device};
use lumen_sender::config::SenderConfig;
use lumen_sender::source::TestPattern;

// ── CLI ──────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "lumen-sender", about = "lumen LAN screen-stream sender")]
struct Cli {
    /// Path to configuration TOML file.
    #[arg(short, long, default_value = "lumen-sender.toml")]
    config: PathBuf,

    /// Receiver address (overrides config and skips discovery).
    /// Example: 192.168.1.100:8081
    #[arg(short, long)]
    target: Option<String>,

    /// Pick the first discovered receiver without prompting.
    #[arg(long)]
    first: bool,

    /// Only list discovered receivers.
    #[arg(long)]
    list: bool,

    /// Print the default configuration to stdout and exit.
    #[arg(long)]
    gen_config: bool,
}

// ── Main ─────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    if cli.gen_config {
        let text = toml::to_string_pretty(&SenderConfig::default())?;
        println!("{text}");
        return Ok(());
    }

    let mut config = SenderConfig::load(&cli.config);
    if let Some(target) = cli.target {
        config.network.target = target;
    }

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("lumen-sender v{}", env!("CARGO_PKG_VERSION"));

    // ── 1. Pick a receiver ──────────────────────────────────────

    let addr = match config.target_addr() {
        Some(addr) if !cli.list => addr,
        _ => match choose_receiver(&config, cli.first, cli.list).await? {
            Some(addr) => addr,
            None => return Ok(()),
        },
    };

    // ── 2. Connect and stream ───────────────────────────────────

    let shutdown = CancellationToken::new();
    let stop = shutdown.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("Ctrl-C received; stopping stream");
        stop.cancel();
    });

    let stream_config = config.to_stream_config();
    let mut source = TestPattern::for_config(&stream_config);
    let sender = StreamSender::new(stream_config);

    let mut session = match sender.connect(addr, &shutdown).await {
        Ok(session) => session,
        Err(e) => {
            eprintln!("Could not connect to {addr}: {e}");
            return Err(e.into());
        }
    };
    println!("Streaming to {addr} (Ctrl-C to stop)");

    match sender.stream(&mut session, &mut source, &shutdown).await {
        Ok(summary) => println!("Stopped. Sent {summary}"),
        Err(e) => println!("Disconnected: {e}. Sent {}", session.summary()),
    }
    Ok(())
}

/// Discover receivers and resolve the user's choice.
async fn choose_receiver(
    config: &SenderConfig,
    first: bool,
    list_only: bool,
) -> Result<Option<SocketAddr>, Box<dyn std::error::Error>> {
    let client = DiscoveryClient::new(config.to_discovery_config());
    println!("Searching for receivers...");
    let devices = client.discover(config.window()).await;

    if devices.is_empty() {
        println!("No receivers found.");
        return Ok(None);
    }
    print!("{}", list_devices(&devices));
    if list_only {
        return Ok(None);
    }
    if first || devices.len() == 1 {
        return Ok(Some(devices[0].socket_addr()));
    }

    println!("Select a receiver [0-{}]:", devices.len() - 1);
    let mut line = String::new();
    BufReader::new(tokio::io::stdin()).read_line(&mut line).await?;

    match select_device(&devices, &line) {
        Some(device) => Ok(Some(device.socket_addr())),
        None => Err(format!("invalid selection {:?}", line.trim()).into()),
    }
}
