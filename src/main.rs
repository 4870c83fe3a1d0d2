use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use proxyline::core::config::loader;
use proxyline::core::latency::{self, DEFAULT_PROBE_TIMEOUT_MS};
use proxyline::core::profile::uri;
use proxyline::events::structured::BroadcastEventBus;
use proxyline::logging::init_logging;
use proxyline::Connection;

/// Proxyline - trojan tunnel connection manager
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Override the configuration directory
    #[arg(long)]
    config_dir: Option<PathBuf>,
    /// Subcommand to execute
    #[command(subcommand)]
    command: Commands,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
enum Commands {
    /// Run a connection from a share link until interrupted
    Run {
        /// trojan:// share link describing the profile
        link: String,
    },
    /// Measure TCP round-trip latency to a share link's server
    Probe {
        /// trojan:// share link describing the profile
        link: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();
    let args = Args::parse();
    let base_dir = args.config_dir.unwrap_or_else(loader::default_base_dir);

    match args.command {
        Commands::Run { link } => run(&link, &base_dir).await,
        Commands::Probe { link } => probe(&link).await,
    }
}

async fn run(link: &str, base_dir: &Path) -> Result<()> {
    let bus = Arc::new(BroadcastEventBus::default());
    let mut events = bus.subscribe();
    let printer = tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            match serde_json::to_string(&event) {
                Ok(json) => println!("{json}"),
                Err(err) => tracing::warn!(target = "app", error = %err, "event serialization failed"),
            }
        }
    });

    let connection = Connection::from_uri(link, base_dir, bus)?;
    connection.start()?;
    if !connection.is_running() {
        anyhow::bail!("connection did not start, see logs above");
    }
    tracing::info!(target = "app", name = %connection.name(), "press Ctrl-C to stop");
    tokio::signal::ctrl_c().await.context("wait for interrupt")?;
    connection.stop()?;
    // give the printer a beat to flush the final state event
    tokio::time::sleep(Duration::from_millis(100)).await;
    printer.abort();
    Ok(())
}

async fn probe(link: &str) -> Result<()> {
    let profile = uri::parse(link).context("parse share link")?;
    let latency = latency::probe(
        &profile.server_address,
        profile.server_port,
        DEFAULT_PROBE_TIMEOUT_MS,
    )
    .await;
    if latency >= 0 {
        println!("{} {}ms", profile.server_address, latency);
    } else {
        println!("{} unreachable", profile.server_address);
    }
    Ok(())
}
