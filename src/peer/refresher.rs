//! Job that periodically reports local ownership to the tracker.
//!
//! Every `update_interval` the refresher scans the peer folder for `.log`
//! files, takes each file's largest contiguous range and sends an
//! `updatetracker` for it. This is what keeps a hosting peer's `last_seen`
//! fresh on the tracker; a peer that stops refreshing ages out of the
//! record on the next `clean()`. Failures are logged and never fatal.
use std::path::Path;
use std::str::FromStr;

use shoal_configuration::ClientConfig;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::client::TrackerClient;
use super::downloader::progress::ProgressLog;
use super::downloader::worker::LOG_SUFFIX;
use crate::servers::signals::{shutdown_signal, Halted};

/// Starts the refresher job. It stops when `rx_halt` fires or the global
/// shutdown signal arrives.
#[must_use]
pub fn start_job(
    config: &ClientConfig,
    client: TrackerClient,
    rx_halt: tokio::sync::oneshot::Receiver<Halted>,
) -> JoinHandle<()> {
    let peer_dir = config.peer_dir.clone();
    let period = config.update_interval;

    tokio::spawn(async move {
        let shutdown = shutdown_signal(rx_halt);
        tokio::pin!(shutdown);

        let mut interval = tokio::time::interval(period);

        loop {
            tokio::select! {
                () = &mut shutdown => break,
                _ = interval.tick() => refresh_once(&peer_dir, &client).await,
            }
        }

        info!("Refresher stopped");
    })
}

/// One pass: report the largest owned range of every logged file.
async fn refresh_once(peer_dir: &Path, client: &TrackerClient) {
    let entries = match std::fs::read_dir(peer_dir) {
        Ok(entries) => entries,
        Err(err) => {
            warn!("unable to scan {peer_dir:?}: {err}");
            return;
        }
    };

    for entry in entries.flatten() {
        let name = entry.file_name().to_string_lossy().into_owned();
        let Some(filename) = name.strip_suffix(LOG_SUFFIX) else {
            continue;
        };
        if filename.is_empty() {
            continue;
        }

        let log = match tokio::fs::read_to_string(entry.path()).await {
            Ok(text) => match ProgressLog::from_str(&text) {
                Ok(log) => log,
                Err(err) => {
                    warn!("malformed log file {name}: {err}");
                    continue;
                }
            },
            Err(err) => {
                warn!("unable to read {name}: {err}");
                continue;
            }
        };

        let largest = log.largest();
        // An empty log reports `0 0`: nothing owned yet, but still alive.
        let last_byte = largest.end.saturating_sub(1);

        match client.update_tracker(filename, largest.start, last_byte).await {
            Ok(status) => debug!("refreshed {filename}: tracker answered {status:?}"),
            Err(err) => debug!("refresh for {filename} failed: {err}"),
        }
    }
}
