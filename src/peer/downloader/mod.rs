//! The downloader: one supervisor, one worker per downloading file.
//!
//! At startup the supervisor scans the peer folder for `.track` files whose
//! canonical file is absent and starts a [`worker::Worker`] for each — this
//! is also how a restarted peer resumes partial downloads. Afterwards it
//! listens on an event channel: a [`Event::NewTracker`] announces a record
//! the console just fetched, [`Event::Exit`] asks for a cooperative
//! shutdown, delivered to the workers through a shared cancel flag.
pub mod cache;
pub mod progress;
pub mod schedule;
pub mod worker;

use std::collections::HashSet;
use std::path::Path;

use shoal_configuration::ClientConfig;
use tokio::sync::{mpsc, watch};
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, info, warn};

use self::worker::Worker;
use super::client::TrackerClient;
use super::MessageSink;
use crate::core::record::TRACK_SUFFIX;

/// Events delivered to the downloader supervisor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// A tracker record file (e.g. `foo.bin.track`) appeared in the peer
    /// folder and may need a download worker.
    NewTracker(String),
    /// Shut down: cancel the workers and drain them.
    Exit,
}

/// Starts the downloader supervisor job.
#[must_use]
pub fn start_job(
    config: &ClientConfig,
    client: TrackerClient,
    events: mpsc::Receiver<Event>,
    sink: MessageSink,
) -> JoinHandle<()> {
    let peer_dir = config.peer_dir.clone();

    tokio::spawn(run(peer_dir, client, events, sink))
}

async fn run(peer_dir: std::path::PathBuf, client: TrackerClient, mut events: mpsc::Receiver<Event>, sink: MessageSink) {
    let (cancel_sender, cancel) = watch::channel(false);
    let mut workers: JoinSet<String> = JoinSet::new();
    let mut active: HashSet<String> = HashSet::new();

    for filename in resumable_downloads(&peer_dir) {
        spawn_worker(&mut workers, &mut active, &peer_dir, &filename, &client, &cancel, &sink);
    }

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Some(Event::NewTracker(track_name)) => {
                    let Some(filename) = track_name.strip_suffix(TRACK_SUFFIX) else {
                        debug!("ignoring non-record notification {track_name:?}");
                        continue;
                    };

                    if peer_dir.join(filename).exists() {
                        drop(sink.send(format!("'{filename}' already exists, nothing to download")));
                    } else if active.contains(filename) {
                        debug!("a download worker for {filename:?} is already running");
                    } else {
                        spawn_worker(&mut workers, &mut active, &peer_dir, filename, &client, &cancel, &sink);
                    }
                }
                Some(Event::Exit) | None => break,
            },
            Some(finished) = workers.join_next(), if !workers.is_empty() => {
                if let Ok(filename) = finished {
                    active.remove(&filename);
                }
            }
        }
    }

    // Cooperative shutdown: flip the cancel flag and drain the workers.
    drop(cancel_sender.send(true));
    while workers.join_next().await.is_some() {}

    info!("Download workers stopped");
}

/// The `.track` files in the peer folder whose canonical file is absent.
fn resumable_downloads(peer_dir: &Path) -> Vec<String> {
    let entries = match std::fs::read_dir(peer_dir) {
        Ok(entries) => entries,
        Err(err) => {
            warn!("unable to scan {peer_dir:?}: {err}");
            return Vec::new();
        }
    };

    let mut filenames = Vec::new();

    for entry in entries.flatten() {
        let name = entry.file_name().to_string_lossy().into_owned();
        if let Some(filename) = name.strip_suffix(TRACK_SUFFIX) {
            if !filename.is_empty() && !peer_dir.join(filename).exists() {
                filenames.push(filename.to_owned());
            }
        }
    }

    filenames.sort();
    filenames
}

fn spawn_worker(
    workers: &mut JoinSet<String>,
    active: &mut HashSet<String>,
    peer_dir: &Path,
    filename: &str,
    client: &TrackerClient,
    cancel: &watch::Receiver<bool>,
    sink: &MessageSink,
) {
    info!("spawning a download worker for {filename:?}");

    let worker = Worker {
        peer_dir: peer_dir.to_owned(),
        filename: filename.to_owned(),
        client: *client,
        cancel: cancel.clone(),
        sink: sink.clone(),
    };

    active.insert(filename.to_owned());
    workers.spawn(async move {
        let filename = worker.filename.clone();
        worker.run().await;
        filename
    });
}

#[cfg(test)]
mod tests {
    use super::resumable_downloads;

    #[test]
    fn it_should_only_resume_downloads_without_a_canonical_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("done.bin"), b"x").unwrap();
        std::fs::write(dir.path().join("done.bin.track"), b"").unwrap();
        std::fs::write(dir.path().join("pending.bin.track"), b"").unwrap();
        std::fs::write(dir.path().join("unrelated.log"), b"").unwrap();

        assert_eq!(resumable_downloads(dir.path()), vec!["pending.bin".to_owned()]);
    }
}
