//! Conversions between timestamps and their integer-second wire form.
//!
//! Tracker records persist peer `last_seen` stamps as integer seconds since
//! the Unix epoch; sub-second precision is dropped on the way out.
use shoal_primitives::DurationSinceUnixEpoch;

/// Renders a timestamp as integer seconds since the Unix epoch.
#[must_use]
pub fn as_unix_seconds(timestamp: &DurationSinceUnixEpoch) -> u64 {
    timestamp.as_secs()
}

/// Builds a timestamp from integer seconds since the Unix epoch.
#[must_use]
pub fn from_unix_seconds(seconds: u64) -> DurationSinceUnixEpoch {
    DurationSinceUnixEpoch::from_secs(seconds)
}
