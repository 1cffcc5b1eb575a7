//! The per-file download worker: the reconciliation loop.
//!
//! One worker owns one file's download from start to finish. Each round it
//! refreshes its tracker record, schedules the next chunks, keeps up to
//! `MAX_INFLIGHT` byte-range requests running as their own tasks, applies
//! completed payloads to the cache and the progress log, and finally
//! verifies the assembled file against the record's MD5.
//!
//! Errors never kill the peer: a refused connection marks the peer dead for
//! the rest of the run, a malformed reply does the same, and a round with
//! nothing to schedule backs off before refreshing again. The worker checks
//! its cancel flag between chunk completions, so shutdown never waits for
//! the whole file.
use std::collections::HashSet;
use std::net::SocketAddrV4;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use shoal_configuration::{DOWNLOAD_BACKOFF, MAX_INFLIGHT};
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use super::cache::CacheFile;
use super::progress::ProgressLog;
use super::schedule::{next_bytes, ChunkRequest};
use crate::core::record::{TrackerRecord, TRACK_SUFFIX};
use crate::peer::client::{self, ClientError, TrackerClient};
use crate::peer::MessageSink;

/// Suffix of progress log files in the peer folder.
pub const LOG_SUFFIX: &str = ".log";

/// Everything a worker needs to download one file.
pub struct Worker {
    pub peer_dir: PathBuf,
    pub filename: String,
    pub client: TrackerClient,
    pub cancel: watch::Receiver<bool>,
    pub sink: MessageSink,
}

/// How a download ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// The file verified and was renamed into place.
    Completed,
    /// The assembled cache does not match the record's MD5; the cache and
    /// the record were kept.
    IntegrityMismatch { expected: String, actual: String },
    /// Shutdown was requested mid-download.
    Cancelled,
}

/// Error that abandons a download (the peer itself keeps running).
#[derive(Error, Debug)]
pub enum WorkerError {
    #[error("unable to access {path}: {source}")]
    Io { path: PathBuf, source: std::io::Error },

    #[error("unusable tracker record for {filename}: {reason}")]
    BadRecord { filename: String, reason: String },
}

impl Worker {
    /// Runs the download to its end and reports the outcome on the message
    /// sink.
    pub async fn run(mut self) {
        info!("starting download of {:?}", self.filename);

        match self.download().await {
            Ok(Outcome::Completed) => {
                drop(self.sink.send(format!("Finished downloading '{}'", self.filename)));
            }
            Ok(Outcome::IntegrityMismatch { expected, actual }) => {
                drop(self.sink.send(format!(
                    "Downloaded data for '{}' failed verification: expected {expected}, got {actual}. \
                     The cache file was kept.",
                    self.filename
                )));
            }
            Ok(Outcome::Cancelled) => debug!("download of {:?} cancelled", self.filename),
            Err(err) => {
                warn!("download of {:?} abandoned: {err}", self.filename);
                drop(self.sink.send(format!("Download of '{}' failed: {err}", self.filename)));
            }
        }
    }

    async fn download(&mut self) -> Result<Outcome, WorkerError> {
        let log_path = self.peer_dir.join(format!("{}{LOG_SUFFIX}", self.filename));
        let track_path = self.peer_dir.join(format!("{}{TRACK_SUFFIX}", self.filename));

        let mut log = load_or_init_log(&log_path).await?;
        let mut cache = CacheFile::open(&self.peer_dir, &self.filename)
            .await
            .map_err(|source| WorkerError::Io {
                path: self.peer_dir.join(&self.filename),
                source,
            })?;

        let mut record = read_record(&track_path, &self.filename).await?;
        let mut dead_peers: HashSet<SocketAddrV4> = HashSet::new();

        loop {
            if *self.cancel.borrow() {
                return Ok(Outcome::Cancelled);
            }

            // Refresh: a newer record may list new peers or fresher ranges.
            // Keep the cached copy when the tracker is unreachable.
            match self.client.fetch_record(&self.filename).await {
                Ok(body) => match TrackerRecord::from_str(&body) {
                    Ok(fresh) => {
                        write_file(&track_path, &body).await?;
                        record = fresh;
                    }
                    Err(err) => debug!("refreshed record for {:?} is malformed: {err}", self.filename),
                },
                Err(err) => debug!("tracker refresh for {:?} failed: {err}", self.filename),
            }

            if log.size_remaining(record.filesize()) == 0 {
                return self.finalise(&mut cache, &record, &track_path).await;
            }

            let queue = next_bytes(&log, &record, &[], &dead_peers);
            if queue.is_empty() {
                if self.backoff().await {
                    return Ok(Outcome::Cancelled);
                }
                continue;
            }

            let cancelled = self
                .fetch_round(queue, &mut log, &log_path, &mut cache, &mut dead_peers)
                .await?;
            if cancelled {
                return Ok(Outcome::Cancelled);
            }
        }
    }

    /// Runs one round of up to `MAX_INFLIGHT` concurrent chunk requests,
    /// applying completions as they arrive. Returns whether shutdown was
    /// requested.
    async fn fetch_round(
        &mut self,
        queue: Vec<ChunkRequest>,
        log: &mut ProgressLog,
        log_path: &Path,
        cache: &mut CacheFile,
        dead_peers: &mut HashSet<SocketAddrV4>,
    ) -> Result<bool, WorkerError> {
        let mut in_flight: JoinSet<(ChunkRequest, Result<Vec<u8>, ClientError>)> = JoinSet::new();
        let mut pending = queue.into_iter();

        // Keep at most MAX_INFLIGHT requests running; the rest of the queue
        // starts as completions free up slots.
        while in_flight.len() < MAX_INFLIGHT {
            let Some(request) = pending.next() else { break };
            self.spawn_fetch(&mut in_flight, request);
        }

        while let Some(joined) = in_flight.join_next().await {
            let Ok((request, result)) = joined else {
                continue;
            };

            match result {
                Ok(payload) if payload.len() as u64 == request.size => {
                    self.apply(cache, log, log_path, request.first_byte, &payload).await?;
                }
                Ok(payload) => {
                    // A short payload leaves the reservation dropped; the
                    // range is rescheduled on the next round.
                    debug!(
                        "short payload for {:?}: wanted {}, got {}",
                        self.filename,
                        request.size,
                        payload.len()
                    );
                }
                Err(ClientError::Refused { addr }) => {
                    drop(self.sink.send(format!("Dead peer {addr}!")));
                    dead_peers.insert(addr);
                }
                Err(err) => {
                    debug!("chunk fetch from {} failed: {err}", request.peer_addr);
                    dead_peers.insert(request.peer_addr);
                }
            }

            if *self.cancel.borrow() {
                in_flight.abort_all();
                return Ok(true);
            }

            if let Some(request) = pending.find(|queued| !dead_peers.contains(&queued.peer_addr)) {
                self.spawn_fetch(&mut in_flight, request);
            }
        }

        Ok(false)
    }

    fn spawn_fetch(&self, in_flight: &mut JoinSet<(ChunkRequest, Result<Vec<u8>, ClientError>)>, request: ChunkRequest) {
        let filename = self.filename.clone();
        in_flight.spawn(async move {
            let result = client::fetch_segment(request.peer_addr, &filename, request.first_byte, request.size).await;
            (request, result)
        });
    }

    /// Applies one payload: cache write, log update, log rewrite, and an
    /// ownership report for the largest contiguous range.
    async fn apply(
        &mut self,
        cache: &mut CacheFile,
        log: &mut ProgressLog,
        log_path: &Path,
        first_byte: u64,
        payload: &[u8],
    ) -> Result<(), WorkerError> {
        cache.write_at(first_byte, payload).await.map_err(|source| WorkerError::Io {
            path: cache.path().to_owned(),
            source,
        })?;

        log.record_write(first_byte, payload.len() as u64);
        write_file(log_path, &log.render()).await?;

        debug!(
            "downloaded bytes {} to {} of {:?}",
            first_byte,
            first_byte + payload.len() as u64,
            self.filename
        );

        let largest = log.largest();
        let last_byte = largest.end.saturating_sub(1);
        if let Err(err) = self.client.update_tracker(&self.filename, largest.start, last_byte).await {
            debug!("ownership report for {:?} failed: {err}", self.filename);
        }

        Ok(())
    }

    /// Verifies the assembled cache and moves it into place.
    async fn finalise(
        &mut self,
        cache: &mut CacheFile,
        record: &TrackerRecord,
        track_path: &Path,
    ) -> Result<Outcome, WorkerError> {
        let actual = cache.digest().await.map_err(|source| WorkerError::Io {
            path: cache.path().to_owned(),
            source,
        })?;

        if actual != record.md5() {
            return Ok(Outcome::IntegrityMismatch {
                expected: record.md5().to_string(),
                actual: actual.to_string(),
            });
        }

        tokio::fs::remove_file(track_path).await.map_err(|source| WorkerError::Io {
            path: track_path.to_owned(),
            source,
        })?;

        let destination = self.peer_dir.join(&self.filename);
        if destination.exists() {
            debug!("{destination:?} already exists, leaving the cache in place");
        } else {
            tokio::fs::rename(cache.path(), &destination)
                .await
                .map_err(|source| WorkerError::Io {
                    path: destination.clone(),
                    source,
                })?;
        }

        info!("md5 check passed for {:?}", self.filename);

        Ok(Outcome::Completed)
    }

    /// Sleeps between refresh attempts when no progress can be made.
    /// Returns whether shutdown was requested instead.
    async fn backoff(&mut self) -> bool {
        tokio::select! {
            () = tokio::time::sleep(DOWNLOAD_BACKOFF) => false,
            _ = self.cancel.changed() => *self.cancel.borrow(),
        }
    }
}

async fn load_or_init_log(log_path: &Path) -> Result<ProgressLog, WorkerError> {
    if !log_path.exists() {
        let log = ProgressLog::default();
        write_file(log_path, &log.render()).await?;
        return Ok(log);
    }

    let text = tokio::fs::read_to_string(log_path).await.map_err(|source| WorkerError::Io {
        path: log_path.to_owned(),
        source,
    })?;

    match ProgressLog::from_str(&text) {
        Ok(log) => Ok(log),
        Err(err) => {
            warn!("{log_path:?} is malformed ({err}), restarting from scratch");
            Ok(ProgressLog::default())
        }
    }
}

async fn read_record(track_path: &Path, filename: &str) -> Result<TrackerRecord, WorkerError> {
    let text = tokio::fs::read_to_string(track_path).await.map_err(|source| WorkerError::Io {
        path: track_path.to_owned(),
        source,
    })?;

    TrackerRecord::from_str(&text).map_err(|err| WorkerError::BadRecord {
        filename: filename.to_owned(),
        reason: err.reason,
    })
}

async fn write_file(path: &Path, content: &str) -> Result<(), WorkerError> {
    tokio::fs::write(path, content).await.map_err(|source| WorkerError::Io {
        path: path.to_owned(),
        source,
    })
}
