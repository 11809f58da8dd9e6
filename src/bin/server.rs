//! Chat server speaking the binary frame protocol over WebSocket.
//!
//! Run with:
//! ```not_rust
//! cargo run --bin server -- 8080
//! cargo run --bin server -- 8080 --idle-timeout 120
//! ```

use std::path::PathBuf;
use std::process;
use std::time::Duration;

use clap::Parser;

use palaver::common::logger::setup_logger;
use palaver::server::{ServerConfig, run_server};

#[derive(Parser, Debug)]
#[command(name = "server")]
#[command(about = "Multi-user chat server with presence and bounded history", long_about = None)]
struct Args {
    /// Port to listen on
    port: u16,

    /// Host address to bind the server to
    #[arg(short = 'H', long, default_value = "0.0.0.0")]
    host: String,

    /// Seconds of inactivity before an available participant is marked away
    #[arg(long, default_value_t = 60)]
    idle_timeout: u64,

    /// Append-only event log file
    #[arg(long, default_value = "messaging_system.log")]
    log_file: PathBuf,
}

#[tokio::main]
async fn main() {
    setup_logger(env!("CARGO_BIN_NAME"), "info");

    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(error) => {
            // Usage problems land on stderr with exit status 1; --help and
            // --version exit cleanly.
            let _ = error.print();
            process::exit(if error.use_stderr() { 1 } else { 0 });
        }
    };

    let config = ServerConfig {
        host: args.host,
        port: args.port,
        idle_timeout: Duration::from_secs(args.idle_timeout),
        log_file: args.log_file,
        ..ServerConfig::default()
    };

    if let Err(error) = run_server(config).await {
        eprintln!("server error: {error}");
        process::exit(1);
    }
}
