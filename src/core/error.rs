//! Errors returned by the record store.
use std::path::PathBuf;

use thiserror::Error;

use super::record::{InvalidPeerRange, MalformedTrackerFile};

/// Error raised by a record store operation.
///
/// The tracker handlers map these onto protocol frames: `AlreadyExists` and
/// `NotFound` become `ferr` where the protocol defines it, validation
/// failures become `fail`, everything else becomes an `<EXCEPTION>` frame.
#[derive(Error, Debug)]
pub enum Error {
    #[error("tracker record already exists: {track_name}")]
    AlreadyExists { track_name: String },

    #[error("tracker record not found: {track_name}")]
    NotFound { track_name: String },

    #[error("invalid {what}: {value:?}")]
    InvalidArgument { what: &'static str, value: String },

    #[error(transparent)]
    InvalidRange(#[from] InvalidPeerRange),

    #[error(transparent)]
    Malformed(#[from] MalformedTrackerFile),

    #[error("unable to access {path}: {source}")]
    Io { path: PathBuf, source: std::io::Error },
}
