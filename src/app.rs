//! Tracker application.
//!
//! The tracker application is a thin container: it builds the record store
//! over the configured shared folder, starts the tracker server in front of
//! it, and waits for the process-wide shutdown signal before stopping the
//! server again.
use std::sync::Arc;

use shoal_configuration::TrackerConfig;
use tracing::info;

use crate::core;
use crate::servers::signals::global_shutdown_signal;
use crate::servers::tracker::server::{Error, TrackerServer};

/// Runs the tracker until the shutdown signal arrives.
///
/// # Errors
///
/// Returns an [`enum@Error`] if the server cannot be started.
pub async fn run(config: TrackerConfig) -> Result<(), Error> {
    let tracker = Arc::new(core::Tracker::new(&config));

    let server = TrackerServer::new(config).start(tracker).await?;

    global_shutdown_signal().await;
    info!("Shutting down ...");

    drop(server.stop().await);

    Ok(())
}
