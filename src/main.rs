mod aggregator;
mod api;
mod cli;
mod dashboard;
mod error;
mod fixtures;
mod model;
mod orchestrator;
mod store;
mod text_summary;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

/// Default log filter when `RUST_LOG` is not set.
const DEFAULT_LOG_FILTER: &str = "routing_dashboard=warn";

fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let args = cli::Cli::parse();

    match cli::run(args).await? {
        cli::Exit::Success => std::process::exit(0),
        // The run log (or the notice) is already printed.
        cli::Exit::Failure => std::process::exit(1),
    }
}
