//! The core tracker module contains the record store logic, independent of
//! the delivery layer.
//!
//! The [`Tracker`] owns a directory of `.track` files, the authoritative
//! copies of the tracker records. It serves the five tracker operations
//! against that directory and serialises concurrent writes *per record*:
//! every read-modify-write sequence for one record file runs under that
//! record's own async mutex, while requests for different records proceed
//! independently. There is exactly one writer process, so in-process locks
//! are sufficient.
//!
//! Records are written atomically (temp file plus rename) so that a reader
//! never observes a half-written record.
pub mod error;
pub mod record;

use std::collections::HashMap;
use std::net::{Ipv4Addr, SocketAddrV4};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

use shoal_configuration::TrackerConfig;
use shoal_primitives::md5::Md5Digest;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use self::error::Error;
use self::record::{TrackerRecord, TRACK_SUFFIX};
use crate::protocol::request::{CreateTrackerArgs, UpdateTrackerArgs};

/// Summary of one record, as listed by `REQ`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordSummary {
    pub filename: String,
    pub filesize: u64,
    pub md5: Md5Digest,
}

/// A fetched record: its text body plus the canonical file's digest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedRecord {
    pub body: String,
    pub md5: Md5Digest,
}

/// The record store behind the tracker server.
pub struct Tracker {
    shared_dir: PathBuf,
    record_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl Tracker {
    #[must_use]
    pub fn new(config: &TrackerConfig) -> Self {
        Self {
            shared_dir: config.shared_dir.clone(),
            record_locks: Mutex::new(HashMap::new()),
        }
    }

    /// Handles a `createtracker` request.
    ///
    /// # Errors
    ///
    /// `AlreadyExists` if a record for the file exists, a validation error
    /// for malformed arguments (including a zero file size, which is
    /// rejected up front), or an I/O error.
    pub async fn create(&self, args: &CreateTrackerArgs) -> Result<(), Error> {
        let filename = valid_filename(&args.filename)?;
        let track_name = format!("{filename}{TRACK_SUFFIX}");
        let path = self.shared_dir.join(&track_name);

        if path.exists() {
            return Err(Error::AlreadyExists { track_name });
        }

        let filesize: u64 = parse_arg("file size", &args.filesize)?;
        if filesize == 0 {
            return Err(Error::InvalidArgument {
                what: "file size",
                value: args.filesize.clone(),
            });
        }

        let md5 = Md5Digest::from_str(&args.md5).map_err(|_| Error::InvalidArgument {
            what: "md5",
            value: args.md5.clone(),
        })?;
        let ip: Ipv4Addr = parse_arg("peer address", &args.ip)?;
        let port: u16 = parse_arg("peer port", &args.port)?;

        let mut record = TrackerRecord::new(filename.to_owned(), filesize, args.description.clone(), md5);
        record.update_peer(SocketAddrV4::new(ip, port), 0, filesize - 1)?;

        let lock = self.lock_for(&track_name).await;
        let _guard = lock.lock().await;

        // The existence check above ran without the lock; a concurrent
        // create may have won the race.
        if path.exists() {
            return Err(Error::AlreadyExists { track_name });
        }

        self.write_record(&path, &record).await?;

        debug!("created tracker record {track_name}");

        Ok(())
    }

    /// Handles an `updatetracker` request: read, clean, update and write
    /// back under the record's lock.
    ///
    /// # Errors
    ///
    /// `NotFound` if the record file does not exist, a validation error for
    /// malformed arguments or an out-of-range byte pair, or an I/O error.
    pub async fn update(&self, args: &UpdateTrackerArgs) -> Result<(), Error> {
        let filename = valid_filename(&args.filename)?;
        let track_name = format!("{filename}{TRACK_SUFFIX}");
        let path = self.shared_dir.join(&track_name);

        if !path.exists() {
            return Err(Error::NotFound { track_name });
        }

        let first_byte: u64 = parse_arg("start byte", &args.first_byte)?;
        let last_byte: u64 = parse_arg("end byte", &args.last_byte)?;
        let ip: Ipv4Addr = parse_arg("peer address", &args.ip)?;
        let port: u16 = parse_arg("peer port", &args.port)?;

        let lock = self.lock_for(&track_name).await;
        let _guard = lock.lock().await;

        let mut record = self.read_record(&path).await?;

        record.clean();
        record.update_peer(SocketAddrV4::new(ip, port), first_byte, last_byte)?;

        self.write_record(&path, &record).await?;

        debug!("updated tracker record {track_name} for {ip}:{port}");

        Ok(())
    }

    /// Handles a `REQ` request: summaries of every record in the directory,
    /// sorted by filename. Unparsable record files are skipped.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the directory cannot be read.
    pub async fn list(&self) -> Result<Vec<RecordSummary>, Error> {
        let mut names = Vec::new();

        let mut entries = tokio::fs::read_dir(&self.shared_dir).await.map_err(|source| Error::Io {
            path: self.shared_dir.clone(),
            source,
        })?;

        while let Some(entry) = entries.next_entry().await.map_err(|source| Error::Io {
            path: self.shared_dir.clone(),
            source,
        })? {
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.ends_with(TRACK_SUFFIX) {
                names.push(name);
            }
        }

        names.sort();

        let mut summaries = Vec::with_capacity(names.len());

        for name in names {
            match self.read_record(&self.shared_dir.join(&name)).await {
                Ok(record) => summaries.push(RecordSummary {
                    filename: record.filename().to_owned(),
                    filesize: record.filesize(),
                    md5: record.md5(),
                }),
                Err(err) => warn!("skipping unlistable record {name}: {err}"),
            }
        }

        Ok(summaries)
    }

    /// Handles a `GET <name>.track` request: loads and cleans the record,
    /// writes it back if anything was cleaned, and returns its text body.
    ///
    /// # Errors
    ///
    /// `NotFound` if the record file does not exist, a validation error for
    /// a name that is not a `.track` name, a parse error for a corrupt
    /// record, or an I/O error.
    pub async fn fetch(&self, track_name: &str) -> Result<FetchedRecord, Error> {
        valid_filename(track_name)?;
        if !track_name.ends_with(TRACK_SUFFIX) {
            return Err(Error::InvalidArgument {
                what: "tracker record name",
                value: track_name.to_owned(),
            });
        }

        let path = self.shared_dir.join(track_name);

        if !path.exists() {
            return Err(Error::NotFound {
                track_name: track_name.to_owned(),
            });
        }

        let lock = self.lock_for(track_name).await;
        let _guard = lock.lock().await;

        let mut record = self.read_record(&path).await?;

        if record.clean() {
            self.write_record(&path, &record).await?;
        }

        Ok(FetchedRecord {
            body: record.to_string(),
            md5: record.md5(),
        })
    }

    /// The lock serialising writes to one record file.
    async fn lock_for(&self, track_name: &str) -> Arc<Mutex<()>> {
        let mut locks = self.record_locks.lock().await;
        locks.entry(track_name.to_owned()).or_default().clone()
    }

    async fn read_record(&self, path: &Path) -> Result<TrackerRecord, Error> {
        let text = tokio::fs::read_to_string(path).await.map_err(|source| Error::Io {
            path: path.to_owned(),
            source,
        })?;

        Ok(TrackerRecord::from_str(&text)?)
    }

    /// Writes the record atomically: temp file in the same directory, then
    /// rename over the destination.
    async fn write_record(&self, path: &Path, record: &TrackerRecord) -> Result<(), Error> {
        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        let tmp = path.with_file_name(format!("{file_name}.tmp"));

        tokio::fs::write(&tmp, record.to_string())
            .await
            .map_err(|source| Error::Io {
                path: tmp.clone(),
                source,
            })?;

        tokio::fs::rename(&tmp, path).await.map_err(|source| Error::Io {
            path: path.to_owned(),
            source,
        })
    }
}

fn valid_filename(name: &str) -> Result<&str, Error> {
    if name.is_empty() || name.contains('/') || name.contains('\\') || name == "." || name == ".." {
        return Err(Error::InvalidArgument {
            what: "filename",
            value: name.to_owned(),
        });
    }

    Ok(name)
}

fn parse_arg<T: FromStr>(what: &'static str, value: &str) -> Result<T, Error> {
    value.parse().map_err(|_| Error::InvalidArgument {
        what,
        value: value.to_owned(),
    })
}
