//! The tracker record: one descriptor per shared file.
//!
//! A record carries the file metadata and the peer table. Its on-disk form
//! is UTF-8 text, four metadata lines followed by zero or more peer lines;
//! lines starting with `#` are comments:
//!
//! ```text
//! Filename: foo.bin
//! Filesize: 3000
//! Description: a shared file
//! MD5: 5d41402abc4b2a76b9719d911017c592
//! 127.0.0.1:11000:0:2999:1669397478
//! ```
//!
//! A peer line is `ip:port:first_byte:last_byte:unix_seconds`. The table
//! holds at most one entry per `(ip, port)` pair; parsing accepts duplicate
//! lines with identical values and rejects conflicting ones.
use std::collections::BTreeMap;
use std::net::{Ipv4Addr, SocketAddrV4};
use std::str::FromStr;

use shoal_clock::conv;
use shoal_clock::Clock;
use shoal_configuration::PEER_UPDATE_INTERVAL;
use shoal_primitives::md5::Md5Digest;
use shoal_primitives::peer::PeerEntry;
use thiserror::Error;

use crate::CurrentClock;

/// Suffix of record files in the tracker and peer folders.
pub const TRACK_SUFFIX: &str = ".track";

/// Metadata keys, in serialisation order. Matched case-sensitively.
const METADATA_FIELDS: [&str; 4] = ["Filename", "Filesize", "Description", "MD5"];

/// Error raised when a record's text form cannot be parsed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("malformed tracker record: {reason}")]
pub struct MalformedTrackerFile {
    pub reason: String,
}

impl MalformedTrackerFile {
    fn new(reason: String) -> Self {
        Self { reason }
    }
}

/// Error raised when a peer update names bytes outside the file.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("bytes {first_byte}..={last_byte} are an invalid range for a file of {filesize} bytes")]
pub struct InvalidPeerRange {
    pub first_byte: u64,
    pub last_byte: u64,
    pub filesize: u64,
}

/// A tracker record: file metadata plus the peer table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackerRecord {
    filename: String,
    filesize: u64,
    description: String,
    md5: Md5Digest,
    peers: BTreeMap<SocketAddrV4, PeerEntry>,
}

impl TrackerRecord {
    #[must_use]
    pub fn new(filename: String, filesize: u64, description: String, md5: Md5Digest) -> Self {
        Self {
            filename,
            filesize,
            description,
            md5,
            peers: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn filename(&self) -> &str {
        &self.filename
    }

    #[must_use]
    pub fn filesize(&self) -> u64 {
        self.filesize
    }

    #[must_use]
    pub fn description(&self) -> &str {
        &self.description
    }

    #[must_use]
    pub fn md5(&self) -> Md5Digest {
        self.md5
    }

    /// The peer table, ordered by socket address.
    #[must_use]
    pub fn peers(&self) -> &BTreeMap<SocketAddrV4, PeerEntry> {
        &self.peers
    }

    /// Inserts or replaces the entry for `(ip, port)`, stamping it with the
    /// current wall time.
    ///
    /// # Errors
    ///
    /// Returns an [`InvalidPeerRange`] unless
    /// `0 <= first_byte <= last_byte < filesize`.
    pub fn update_peer(&mut self, peer_addr: SocketAddrV4, first_byte: u64, last_byte: u64) -> Result<(), InvalidPeerRange> {
        if first_byte > last_byte || last_byte >= self.filesize {
            return Err(InvalidPeerRange {
                first_byte,
                last_byte,
                filesize: self.filesize,
            });
        }

        self.peers.insert(
            peer_addr,
            PeerEntry {
                peer_addr,
                first_byte,
                last_byte,
                updated: CurrentClock::now(),
            },
        );

        Ok(())
    }

    /// Removes the entry for `(ip, port)`. Returns whether one was removed.
    pub fn remove_peer(&mut self, peer_addr: SocketAddrV4) -> bool {
        self.peers.remove(&peer_addr).is_some()
    }

    /// Drops every peer not seen within the update interval. Returns whether
    /// anything was dropped.
    pub fn clean(&mut self) -> bool {
        let cutoff = CurrentClock::cutoff(PEER_UPDATE_INTERVAL);
        let before = self.peers.len();

        self.peers.retain(|_, peer| peer.updated >= cutoff);

        self.peers.len() != before
    }

    /// Renders the record in its on-disk text form. Peer timestamps are
    /// emitted as integer seconds since the Unix epoch.
    pub fn write_into(&self, out: &mut String) {
        use std::fmt::Write as _;

        writeln!(out, "Filename: {}", self.filename).expect("writing to a string cannot fail");
        writeln!(out, "Filesize: {}", self.filesize).expect("writing to a string cannot fail");
        writeln!(out, "Description: {}", self.description).expect("writing to a string cannot fail");
        writeln!(out, "MD5: {}", self.md5).expect("writing to a string cannot fail");

        for (addr, peer) in &self.peers {
            writeln!(
                out,
                "{}:{}:{}:{}:{}",
                addr.ip(),
                addr.port(),
                peer.first_byte,
                peer.last_byte,
                conv::as_unix_seconds(&peer.updated)
            )
            .expect("writing to a string cannot fail");
        }
    }
}

impl std::fmt::Display for TrackerRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut out = String::new();
        self.write_into(&mut out);
        f.write_str(&out)
    }
}

impl FromStr for TrackerRecord {
    type Err = MalformedTrackerFile;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut metadata: BTreeMap<&str, String> = BTreeMap::new();
        let mut peers: BTreeMap<SocketAddrV4, PeerEntry> = BTreeMap::new();

        for line in s.lines() {
            let line = line.trim();

            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let first = line.chars().next().expect("the line is not empty");

            if first.is_alphabetic() {
                parse_metadata_line(line, &mut metadata)?;
            } else if first.is_ascii_digit() {
                parse_peer_line(line, &mut peers)?;
            } else {
                return Err(MalformedTrackerFile::new(format!("unrecognised line {line:?}")));
            }
        }

        for field in METADATA_FIELDS {
            if !metadata.contains_key(field) {
                return Err(MalformedTrackerFile::new(format!("missing metadata for {field:?}")));
            }
        }

        let filesize = metadata["Filesize"]
            .parse::<u64>()
            .map_err(|_| MalformedTrackerFile::new(format!("Filesize must be an integer, not {:?}", metadata["Filesize"])))?;

        let md5 = Md5Digest::from_str(&metadata["MD5"])
            .map_err(|err| MalformedTrackerFile::new(format!("bad MD5 value: {err}")))?;

        let mut record = Self::new(metadata["Filename"].clone(), filesize, metadata["Description"].clone(), md5);
        record.peers = peers;

        Ok(record)
    }
}

fn parse_metadata_line<'a>(line: &'a str, metadata: &mut BTreeMap<&'a str, String>) -> Result<(), MalformedTrackerFile> {
    let Some((attr, value)) = line.split_once(':') else {
        return Err(MalformedTrackerFile::new(format!("invalid metadata line {line:?}")));
    };

    if !METADATA_FIELDS.contains(&attr) {
        return Err(MalformedTrackerFile::new(format!(
            "{attr:?} is not a valid metadata field"
        )));
    }

    let value = value.trim().to_owned();

    if let Some(previous) = metadata.get(attr) {
        if *previous != value {
            return Err(MalformedTrackerFile::new(format!("duplicate metadata for {attr:?}")));
        }
    }

    metadata.insert(attr, value);

    Ok(())
}

fn parse_peer_line(line: &str, peers: &mut BTreeMap<SocketAddrV4, PeerEntry>) -> Result<(), MalformedTrackerFile> {
    let parts: Vec<&str> = line.split(':').collect();

    if parts.len() != 5 {
        return Err(MalformedTrackerFile::new(format!(
            "wrong number of peer line components: expected 5, got {}",
            parts.len()
        )));
    }

    let ip: Ipv4Addr = parts[0]
        .trim()
        .parse()
        .map_err(|_| MalformedTrackerFile::new(format!("bad peer address {:?}", parts[0])))?;
    let port: u16 = parts[1]
        .trim()
        .parse()
        .map_err(|_| MalformedTrackerFile::new(format!("bad peer port {:?}", parts[1])))?;
    let first_byte: u64 = parts[2]
        .trim()
        .parse()
        .map_err(|_| MalformedTrackerFile::new(format!("bad start byte {:?}", parts[2])))?;
    let last_byte: u64 = parts[3]
        .trim()
        .parse()
        .map_err(|_| MalformedTrackerFile::new(format!("bad end byte {:?}", parts[3])))?;
    let timestamp: u64 = parts[4]
        .trim()
        .parse()
        .map_err(|_| MalformedTrackerFile::new(format!("bad timestamp {:?}", parts[4])))?;

    let peer_addr = SocketAddrV4::new(ip, port);
    let entry = PeerEntry {
        peer_addr,
        first_byte,
        last_byte,
        updated: conv::from_unix_seconds(timestamp),
    };

    if let Some(previous) = peers.get(&peer_addr) {
        if *previous != entry {
            return Err(MalformedTrackerFile::new(format!(
                "duplicate peer entry for peer {peer_addr}"
            )));
        }
    }

    peers.insert(peer_addr, entry);

    Ok(())
}

#[cfg(test)]
mod tests {
    use std::net::{Ipv4Addr, SocketAddrV4};
    use std::str::FromStr;
    use std::time::Duration;

    use shoal_configuration::PEER_UPDATE_INTERVAL;
    use shoal_primitives::md5::Md5Digest;

    use super::TrackerRecord;
    use crate::CurrentClock;

    fn sample_record() -> TrackerRecord {
        TrackerRecord::new(
            "foo.bin".to_owned(),
            3000,
            "a shared file".to_owned(),
            Md5Digest::from_str("5d41402abc4b2a76b9719d911017c592").unwrap(),
        )
    }

    fn addr(port: u16) -> SocketAddrV4 {
        SocketAddrV4::new(Ipv4Addr::LOCALHOST, port)
    }

    #[test]
    fn it_should_round_trip_through_the_text_form() {
        CurrentClock::set(Duration::from_secs(1_669_397_478));

        let mut record = sample_record();
        record.update_peer(addr(11000), 0, 2999).unwrap();
        record.update_peer(addr(11001), 0, 1023).unwrap();

        let parsed = TrackerRecord::from_str(&record.to_string()).unwrap();

        assert_eq!(parsed, record);
    }

    #[test]
    fn it_should_ignore_comment_and_blank_lines() {
        let text = "# a comment\nFilename: foo.bin\n\nFilesize: 3000\nDescription: x\nMD5: 5d41402abc4b2a76b9719d911017c592\n";

        let record = TrackerRecord::from_str(text).unwrap();

        assert_eq!(record.filename(), "foo.bin");
        assert_eq!(record.filesize(), 3000);
    }

    #[test]
    fn it_should_reject_missing_metadata() {
        let text = "Filename: foo.bin\nFilesize: 3000\nMD5: 5d41402abc4b2a76b9719d911017c592\n";

        assert!(TrackerRecord::from_str(text).is_err());
    }

    #[test]
    fn it_should_reject_conflicting_duplicate_metadata() {
        let text = "Filename: foo.bin\nFilename: bar.bin\nFilesize: 3000\nDescription: x\nMD5: 5d41402abc4b2a76b9719d911017c592\n";

        assert!(TrackerRecord::from_str(text).is_err());
    }

    #[test]
    fn it_should_accept_identical_duplicate_peer_lines() {
        let text = "Filename: foo.bin\nFilesize: 3000\nDescription: x\nMD5: 5d41402abc4b2a76b9719d911017c592\n\
                    127.0.0.1:11000:0:2999:1669397478\n127.0.0.1:11000:0:2999:1669397478\n";

        let record = TrackerRecord::from_str(text).unwrap();

        assert_eq!(record.peers().len(), 1);
    }

    #[test]
    fn it_should_reject_conflicting_duplicate_peer_lines() {
        let text = "Filename: foo.bin\nFilesize: 3000\nDescription: x\nMD5: 5d41402abc4b2a76b9719d911017c592\n\
                    127.0.0.1:11000:0:2999:1669397478\n127.0.0.1:11000:0:1023:1669397478\n";

        assert!(TrackerRecord::from_str(text).is_err());
    }

    #[test]
    fn it_should_replace_the_entry_on_a_repeated_update() {
        let mut record = sample_record();

        record.update_peer(addr(11000), 0, 499).unwrap();
        record.update_peer(addr(11000), 0, 2999).unwrap();

        assert_eq!(record.peers().len(), 1);
        assert_eq!(record.peers()[&addr(11000)].last_byte, 2999);
    }

    #[test]
    fn it_should_reject_out_of_range_peer_updates() {
        let mut record = sample_record();

        assert!(record.update_peer(addr(11000), 0, 3000).is_err());
        assert!(record.update_peer(addr(11000), 10, 9).is_err());
    }

    #[test]
    fn it_should_accept_a_zero_range_update_meaning_nothing_owned() {
        let mut record = sample_record();

        assert!(record.update_peer(addr(11000), 0, 0).is_ok());
    }

    #[test]
    fn it_should_report_whether_remove_found_the_peer() {
        let mut record = sample_record();
        record.update_peer(addr(11000), 0, 0).unwrap();

        assert!(record.remove_peer(addr(11000)));
        assert!(!record.remove_peer(addr(11000)));
    }

    #[test]
    fn it_should_drop_stale_peers_on_clean() {
        CurrentClock::set(Duration::from_secs(2_000_000));

        let mut record = sample_record();
        record.update_peer(addr(11000), 0, 2999).unwrap();

        // Move time past the update interval; the peer becomes stale.
        CurrentClock::advance(PEER_UPDATE_INTERVAL + Duration::from_secs(1));
        record.update_peer(addr(11001), 0, 1023).unwrap();

        assert!(record.clean());
        assert_eq!(record.peers().len(), 1);
        assert!(record.peers().contains_key(&addr(11001)));
    }

    #[test]
    fn it_should_be_idempotent_on_clean() {
        CurrentClock::set(Duration::from_secs(2_000_000));

        let mut record = sample_record();
        record.update_peer(addr(11000), 0, 2999).unwrap();
        CurrentClock::advance(PEER_UPDATE_INTERVAL + Duration::from_secs(1));

        assert!(record.clean());
        let after_first = record.clone();

        assert!(!record.clean());
        assert_eq!(record, after_first);
    }
}
