//! Primitive types shared by the shoal packages.
//!
//! These are the basic data structures used by the tracker server, the peer
//! and the support packages: the timestamp type used for peer freshness, the
//! MD5 digest newtype carried by tracker records, and the peer entry stored
//! in a record's peer table.
use std::time::Duration;

pub mod md5;
pub mod peer;

/// A `std::time::Duration` since the Unix epoch (a timestamp).
///
/// The timestamp does not depend on the time zone, which allows the clock to
/// be used regardless of the underlying system configuration. On the wire and
/// on disk it is rendered as integer seconds.
pub type DurationSinceUnixEpoch = Duration;
