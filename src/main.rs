//! FerroKV - A Single-Threaded In-Memory Key-Value Server
//!
//! This is the main entry point for the FerroKV server.
//! It parses the command line, installs logging and runs the event loop
//! until Ctrl+C.

use ferrokv::server::{Server, ServerConfig};
use std::time::Duration;
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// Parse configuration from command-line arguments
fn config_from_args() -> ServerConfig {
    let mut config = ServerConfig::default();
    let args: Vec<String> = std::env::args().collect();

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--host" | "-h" => {
                config.host = value_of(&args, i, "--host").to_string();
                i += 2;
            }
            "--port" | "-p" => {
                config.port = value_of(&args, i, "--port").parse().unwrap_or_else(|_| {
                    eprintln!("Error: invalid port number");
                    std::process::exit(1);
                });
                i += 2;
            }
            "--tick-ms" => {
                let millis: u64 = value_of(&args, i, "--tick-ms")
                    .parse()
                    .ok()
                    .filter(|ms| *ms > 0)
                    .unwrap_or_else(|| {
                        eprintln!("Error: --tick-ms must be a positive integer");
                        std::process::exit(1);
                    });
                config.tick_interval = Duration::from_millis(millis);
                i += 2;
            }
            "--help" => {
                print_help();
                std::process::exit(0);
            }
            "--version" | "-v" => {
                println!("FerroKV version {}", ferrokv::VERSION);
                std::process::exit(0);
            }
            _ => {
                eprintln!("Unknown argument: {}", args[i]);
                print_help();
                std::process::exit(1);
            }
        }
    }

    config
}

/// Returns the value following the flag at `i`, or exits.
fn value_of<'a>(args: &'a [String], i: usize, flag: &str) -> &'a str {
    match args.get(i + 1) {
        Some(value) => value,
        None => {
            eprintln!("Error: {} requires a value", flag);
            std::process::exit(1);
        }
    }
}

fn print_help() {
    println!(
        r#"
FerroKV - A Single-Threaded In-Memory Key-Value Server

USAGE:
    ferrokv [OPTIONS]

OPTIONS:
    -h, --host <HOST>    Host to bind to (default: 127.0.0.1)
    -p, --port <PORT>    Port to listen on (default: 6379)
        --tick-ms <MS>   Active expiry period in milliseconds (default: 100)
    -v, --version        Print version information
        --help           Print this help message

LOGGING:
    Set RUST_LOG to change verbosity, e.g. RUST_LOG=ferrokv=debug

CONNECTING:
    $ redis-cli -p 6379
    127.0.0.1:6379> SET abc 123
    OK
    127.0.0.1:6379> ZADD leaderboard 1000 alice
    (integer) 1
"#
    );
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = config_from_args();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    info!(version = ferrokv::VERSION, "Starting FerroKV");
    let server = Server::bind(config).await?;

    let shutdown = server.shutdown_handle();
    tokio::spawn(async move {
        match signal::ctrl_c().await {
            Ok(()) => {
                info!("Shutdown signal received, stopping server...");
                shutdown.shutdown();
            }
            Err(e) => error!(error = %e, "Failed to install Ctrl+C handler"),
        }
    });

    let stats = server.listen().await?;
    info!(keys = stats.keys, "Server shutdown complete");
    Ok(())
}
