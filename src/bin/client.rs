//! # Client Binary Entry Point
//!
//! ## Usage
//!
//! ```bash
//! cargo run --bin client -- --server 127.0.0.1:8089 --nickname alice
//! ```
//!
//! Every line typed is sent to the relay. `/nick <name>` changes the
//! nickname. Relayed lines are printed as `name: text`.

use clap::Parser;
use env_logger::Builder;
use log::{error, warn, LevelFilter};
use std::io::{self, BufRead, Write};
use std::thread;
use tokio::sync::mpsc;

use chat_relay::client::ChatClient;
use chat_relay::common::messages::MAX_FIELD_LEN;

/// Command-line arguments for the client binary
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Relay address
    #[arg(short, long, default_value = "127.0.0.1:8089")]
    server: String,

    /// Nickname to announce after connecting
    #[arg(short, long)]
    nickname: Option<String>,
}

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
        .filter_level(LevelFilter::Warn)
        .parse_default_env()
        .init();
}

/// Forward stdin lines from a plain thread; a blocking terminal read must not
/// sit on the runtime.
fn stdin_lines() -> mpsc::Receiver<String> {
    let (tx, rx) = mpsc::channel(16);
    thread::spawn(move || {
        for line in io::stdin().lock().lines().map_while(Result::ok) {
            if tx.blocking_send(line).is_err() {
                break;
            }
        }
    });
    rx
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logger();

    let args = Args::parse();

    let mut client = ChatClient::connect(&args.server).await?;
    if let Some(nickname) = &args.nickname {
        client.set_nickname(nickname).await?;
    }

    let (mut receiver, mut sender) = client.into_split();

    let printer = tokio::spawn(async move {
        loop {
            match receiver.recv().await {
                Ok(Some(line)) => println!("{}", line),
                Ok(None) => break,
                Err(e) => {
                    error!("❌ {}", e);
                    break;
                }
            }
        }
    });

    let mut lines = stdin_lines();
    let typing = async {
        while let Some(line) = lines.recv().await {
            let result = if let Some(name) = line.strip_prefix("/nick ") {
                sender.set_nickname(name.trim()).await
            } else if line.is_empty() {
                continue;
            } else if line.len() > MAX_FIELD_LEN {
                warn!(
                    "⚠️  Message is {} bytes; the relay drops anything over {}",
                    line.len(),
                    MAX_FIELD_LEN
                );
                continue;
            } else {
                sender.send_text(&line).await
            };

            if let Err(e) = result {
                error!("❌ {:#}", e);
                break;
            }
        }
    };

    tokio::select! {
        _ = printer => {
            println!("server disconnected");
            std::process::exit(1);
        }
        _ = typing => {}
    }

    Ok(())
}
