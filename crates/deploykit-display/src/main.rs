//! DeployKit display companion.
//!
//! Launched by `DisplayServer` in `client-server` mode, where it answers
//! dialog requests arriving on inherited pipes. The `watch` mode runs the
//! running-process monitor from the command line.

mod client_mode;
mod watch;

use anyhow::Result;
use clap::{Parser, Subcommand};
use deploykit_core::config::{AppConfig, DisplayConfig};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(name = DisplayConfig::CLIENT_EXECUTABLE_NAME)]
#[command(about = "Display client and process monitor for DeployKit")]
struct Args {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Mode,
}

#[derive(Subcommand, Debug)]
enum Mode {
    /// Serve a display session over pipes inherited from the server
    ClientServer(client_mode::ClientArgs),
    /// Print the applications that would have to be closed
    Watch(watch::WatchArgs),
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let args = Args::parse();

    // stdout belongs to `watch` output; logs go to stderr.
    let log_level = if args.debug { Level::DEBUG } else { Level::INFO };
    FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .with_thread_ids(false)
        .with_writer(std::io::stderr)
        .compact()
        .init();

    info!(
        "{} display companion starting on {}",
        AppConfig::APP_NAME,
        deploykit_core::platform::current_platform()
    );

    match args.command {
        Mode::ClientServer(client) => {
            tokio::task::spawn_blocking(move || client_mode::run(client)).await??;
        }
        Mode::Watch(watch) => watch::run(watch).await?,
    }
    Ok(())
}
