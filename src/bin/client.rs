//! Terminal chat client speaking the binary frame protocol.
//!
//! Connects to a chat server, renders everything the server pushes, and
//! turns input lines into request frames. Reconnects on lost connections
//! (at most 5 attempts, 5 seconds apart).
//!
//! Run with:
//! ```not_rust
//! cargo run --bin client -- --name alice
//! cargo run --bin client -- --name bob --url ws://example.net:8080
//! ```

use std::process;

use clap::Parser;

use palaver::client::run_client;
use palaver::common::logger::setup_logger;

#[derive(Parser, Debug)]
#[command(name = "client")]
#[command(about = "Terminal chat client with reconnection support", long_about = None)]
struct Args {
    /// Participant identifier (must be unique on the server)
    #[arg(short = 'n', long)]
    name: String,

    /// WebSocket server URL
    #[arg(short = 'u', long, default_value = "ws://127.0.0.1:8080")]
    url: String,
}

#[tokio::main]
async fn main() {
    setup_logger(env!("CARGO_BIN_NAME"), "info");

    let args = Args::parse();

    if let Err(error) = run_client(args.url, args.name).await {
        tracing::error!("client error: {error}");
        process::exit(1);
    }
}
