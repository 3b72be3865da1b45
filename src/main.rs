//! Riversist daemon CLI.

use anyhow::Result;
use clap::Parser;
use riversist::{Config, Daemon};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "riversist")]
#[command(about = "Monitor network traffic and firewall hosts based on DNSBLs")]
#[command(version)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "riversist.yaml")]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short = 'L', long, default_value = "info")]
    log_level: String,

    /// Print example configuration and exit
    #[arg(long)]
    print_config: bool,

    /// Validate configuration and exit
    #[arg(long)]
    validate: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    if args.print_config {
        println!("{}", Config::example());
        return Ok(());
    }

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    info!(config = %args.config.display(), "Loading configuration");
    let config = Config::load(&args.config)?;

    if args.validate {
        info!("Configuration is valid");
        return Ok(());
    }

    let daemon = Daemon::new(config)?;
    daemon.run().await?;

    info!("Exiting...");
    Ok(())
}
