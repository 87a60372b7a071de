//! ELM327 OBD-II Reader - Main Entry Point

use clap::Parser;
use elm_reader::{init_logging, run, Args};
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_logging(args.verbose)?;

    info!("=== ELM327 OBD-II Reader v{} ===", env!("CARGO_PKG_VERSION"));
    info!("Connecting to {}:{}...", args.host, args.port);

    run(args).await
}
