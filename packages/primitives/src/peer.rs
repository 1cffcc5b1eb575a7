//! Peer entry stored in a tracker record's peer table.
//!
//! A sample entry:
//!
//! ```rust
//! use std::net::{Ipv4Addr, SocketAddrV4};
//! use shoal_primitives::peer::PeerEntry;
//! use shoal_primitives::DurationSinceUnixEpoch;
//!
//! PeerEntry {
//!     peer_addr: SocketAddrV4::new(Ipv4Addr::new(126, 0, 0, 1), 11000),
//!     first_byte: 0,
//!     last_byte: 2999,
//!     updated: DurationSinceUnixEpoch::from_secs(1_669_397_478),
//! };
//! ```
//!
//! The table is keyed by the peer's socket address; one peer holds exactly
//! one byte range per file, and a repeated update replaces the previous
//! value. `first_byte` and `last_byte` are both inclusive.
use std::net::SocketAddrV4;

use crate::DurationSinceUnixEpoch;

/// A peer known to hold a byte range of a shared file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PeerEntry {
    /// The IP and port the peer's chunk server is listening on.
    pub peer_addr: SocketAddrV4,
    /// First byte of the range the peer holds (inclusive).
    pub first_byte: u64,
    /// Last byte of the range the peer holds (inclusive).
    pub last_byte: u64,
    /// The last time the tracker accepted an update from this peer.
    pub updated: DurationSinceUnixEpoch,
}

impl PeerEntry {
    /// Whether the peer's range contains the given byte offset.
    #[must_use]
    pub fn holds(&self, byte: u64) -> bool {
        self.first_byte <= byte && byte <= self.last_byte
    }

    /// Number of bytes in the peer's range.
    #[must_use]
    pub fn range_len(&self) -> u64 {
        self.last_byte - self.first_byte + 1
    }
}

impl Ord for PeerEntry {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.peer_addr.cmp(&other.peer_addr)
    }
}

impl PartialOrd for PeerEntry {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

pub mod fixture {
    use std::net::{Ipv4Addr, SocketAddrV4};

    use super::PeerEntry;
    use crate::DurationSinceUnixEpoch;

    #[derive(PartialEq, Debug)]
    pub struct PeerEntryBuilder {
        entry: PeerEntry,
    }

    impl Default for PeerEntryBuilder {
        fn default() -> Self {
            Self {
                entry: PeerEntry {
                    peer_addr: SocketAddrV4::new(Ipv4Addr::new(127, 0, 0, 1), 11000),
                    first_byte: 0,
                    last_byte: 0,
                    updated: DurationSinceUnixEpoch::from_secs(1_669_397_478),
                },
            }
        }
    }

    impl PeerEntryBuilder {
        #[must_use]
        pub fn with_peer_addr(mut self, peer_addr: SocketAddrV4) -> Self {
            self.entry.peer_addr = peer_addr;
            self
        }

        #[must_use]
        pub fn with_range(mut self, first_byte: u64, last_byte: u64) -> Self {
            self.entry.first_byte = first_byte;
            self.entry.last_byte = last_byte;
            self
        }

        #[must_use]
        pub fn updated_on(mut self, updated: DurationSinceUnixEpoch) -> Self {
            self.entry.updated = updated;
            self
        }

        #[must_use]
        pub fn build(self) -> PeerEntry {
            self.entry
        }
    }
}
