//! # Relay Binary Entry Point
//!
//! ## Usage
//!
//! ```bash
//! cargo run --bin server                               # 0.0.0.0:8089, defaults
//! cargo run --bin server -- -p 9000                    # other port
//! cargo run --bin server -- --config config/relay.toml \
//!   --metrics-output ./relay_metrics.json
//! ```
//!
//! The relay runs until Ctrl+C or until `quit`/`exit` is typed on the console.

use clap::Parser;
use env_logger::Builder;
use log::{error, info, LevelFilter};
use std::io::Write;
use std::path::PathBuf;

use chat_relay::common::config::load_config;
use chat_relay::server::console::{stdin_lines, Console, ConsoleExit};
use chat_relay::server::{start_relay, RelayConfig};

/// Command-line arguments for the relay binary
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the relay configuration file (TOML format)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Listen port, overriding the configured one
    #[arg(short, long)]
    port: Option<u16>,

    /// Path to write relay counters as JSON on shutdown (optional)
    #[arg(long)]
    metrics_output: Option<PathBuf>,
}

/// Initialize the logging system with timestamp, level, and message formatting.
///
/// INFO by default; `RUST_LOG` overrides it.
fn init_logger() {
    Builder::new()
        .format(|buf, record| {
            writeln!(
                buf,
                "[{}] [{}] {}",
                chrono::Local::now().format("%H:%M:%S"),
                record.level(),
                record.args()
            )
        })
        .filter_level(LevelFilter::Info)
        .parse_default_env()
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logger();

    let args = Args::parse();

    let mut config: RelayConfig = match &args.config {
        Some(path) => load_config(path)?,
        None => RelayConfig::default(),
    };
    if let Some(port) = args.port {
        config = config.with_port(port)?;
    }

    let handle = match start_relay(&config).await {
        Ok(handle) => handle,
        Err(e) => {
            error!("❌ Failed to start relay: {:#}", e);
            return Err(e);
        }
    };
    info!("✅ Relay is ready on {}", handle.local_addr());

    let console = config
        .console
        .enabled
        .then(|| Console::new(handle.roster().clone(), handle.metrics().clone()));

    let console_quit = async move {
        match console {
            Some(console) => {
                if console.run(stdin_lines()).await == ConsoleExit::Quit {
                    return;
                }
                // stdin closed (e.g. running detached); keep serving.
                std::future::pending::<()>().await
            }
            None => std::future::pending::<()>().await,
        }
    };

    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            if let Err(e) = result {
                error!("❌ Failed to listen for Ctrl+C: {}", e);
            }
            info!("Control-C received, exit server");
        }
        _ = console_quit => info!("Quit requested from console"),
    }

    let metrics = handle.metrics().clone();
    handle.shutdown().await;

    if let Some(path) = args.metrics_output {
        metrics.snapshot().export_to_json(&path)?;
        info!("📊 Metrics exported to: {}", path.display());
    }

    Ok(())
}
