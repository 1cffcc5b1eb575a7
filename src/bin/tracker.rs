//! The `shoal-tracker` binary: the tracker server.
use std::path::PathBuf;

use anyhow::Context as _;
use clap::Parser;
use shoal::{app, bootstrap};
use shoal_configuration::TrackerConfig;

#[derive(Parser)]
#[command(name = "shoal-tracker", about = "A tracker server for shared-file records", version)]
struct Args {
    /// Path to the tracker configuration file.
    #[arg(long, env = "SHOAL_TRACKER_CONFIG", default_value = "tracker.cfg")]
    config: PathBuf,

    /// Log level: off, error, warn, info, debug or trace.
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    bootstrap::logging::setup(&args.log_level);

    let config = TrackerConfig::load(&args.config).context("configuration failure")?;

    app::run(config).await.context("tracker failure")
}
