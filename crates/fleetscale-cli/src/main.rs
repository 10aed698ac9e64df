//! fleetscale — temporary worker fleet scaling for cluster benchmarks.
//!
//! # Usage
//!
//! ```text
//! fleetscale workers-scale --additional-worker-nodes 6 --gc true
//! fleetscale workers-scale --config fleetscale.toml --no-wait --local-only
//! ```

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;
mod sinks;

const DEFAULT_LOG_FILTER: &str = "info,fleetscale=debug";

#[derive(Parser)]
#[command(
    name = "fleetscale",
    about = "Scale worker machine pools around a benchmark measurement window",
    version,
    propagate_version = true
)]
struct Cli {
    /// Log filter used when RUST_LOG is unset.
    #[arg(long, global = true, default_value = DEFAULT_LOG_FILTER)]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Add worker nodes across machine pools, measure, and optionally restore.
    WorkersScale(commands::workers_scale::WorkersScaleArgs),
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&cli.log_level)?,
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.command {
        Commands::WorkersScale(args) => commands::workers_scale::run(args).await,
    }
}
