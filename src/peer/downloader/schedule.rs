//! Chunk scheduling: which bytes to ask which peer for next.
//!
//! Segments are chosen sequentially: the target is always the first byte
//! not yet covered by the log or an in-flight request. Peers are chosen by
//! freshness: among the peers whose advertised range holds the target byte,
//! the one the tracker heard from most recently wins, on the theory that a
//! recently seen peer is the most likely to still be up.
use std::cmp::Reverse;
use std::collections::HashSet;
use std::net::SocketAddrV4;

use shoal_configuration::MAX_CHUNK_SIZE;
use shoal_primitives::peer::PeerEntry;

use super::progress::{ByteRange, ProgressLog};
use crate::core::record::TrackerRecord;

/// How many chunks may be queued from one peer per scheduling round.
const QUEUE_FACTOR: u64 = 10;

/// One chunk to request from one peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkRequest {
    pub peer_addr: SocketAddrV4,
    pub first_byte: u64,
    pub size: u64,
}

impl ChunkRequest {
    /// The byte range this request reserves while in flight.
    #[must_use]
    pub fn span(&self) -> ByteRange {
        ByteRange {
            start: self.first_byte,
            end: self.first_byte + self.size,
        }
    }
}

/// Computes the next queue of chunk requests.
///
/// Returns an empty queue when no live peer can serve the first missing
/// byte; the downloader reacts by refreshing its tracker record and backing
/// off. The returned chunks never overlap `merged(log ∪ downloading)` and
/// never name a peer in `dead_peers`.
#[must_use]
pub fn next_bytes(
    log: &ProgressLog,
    record: &TrackerRecord,
    downloading: &[ByteRange],
    dead_peers: &HashSet<SocketAddrV4>,
) -> Vec<ChunkRequest> {
    let coverage = log.merged(downloading);

    let Some(gap) = first_gap(&coverage, record.filesize()) else {
        return Vec::new();
    };

    let mut peers: Vec<&PeerEntry> = record
        .peers()
        .values()
        .filter(|peer| !dead_peers.contains(&peer.peer_addr))
        .collect();
    peers.sort_by_key(|peer| Reverse(peer.updated));

    for peer in peers {
        if peer.holds(gap.start) {
            return queue_from(peer, gap);
        }
    }

    Vec::new()
}

/// Queues up to `QUEUE_FACTOR` chunks of the gap from one peer, clipped to
/// both the peer's advertised range and the gap itself.
fn queue_from(peer: &PeerEntry, gap: ByteRange) -> Vec<ChunkRequest> {
    let limit = gap.end.min(peer.last_byte + 1);
    let max_ahead = QUEUE_FACTOR * MAX_CHUNK_SIZE;

    let mut queue = Vec::new();
    let mut start = gap.start;

    while start < limit && start - gap.start < max_ahead {
        let size = MAX_CHUNK_SIZE.min(limit - start);
        queue.push(ChunkRequest {
            peer_addr: peer.peer_addr,
            first_byte: start,
            size,
        });
        start += size;
    }

    queue
}

/// The first uncovered range of a file of `filesize` bytes, given sorted
/// disjoint coverage.
fn first_gap(coverage: &[ByteRange], filesize: u64) -> Option<ByteRange> {
    let mut need = 0;

    for range in coverage {
        if range.start > need {
            return Some(ByteRange {
                start: need,
                end: range.start,
            });
        }
        need = need.max(range.end);
    }

    (need < filesize).then_some(ByteRange {
        start: need,
        end: filesize,
    })
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::net::{Ipv4Addr, SocketAddrV4};
    use std::str::FromStr;
    use std::time::Duration;

    use shoal_primitives::md5::Md5Digest;

    use super::{next_bytes, ChunkRequest};
    use crate::peer::downloader::progress::{ByteRange, ProgressLog};
    use crate::core::record::TrackerRecord;
    use crate::CurrentClock;

    fn addr(port: u16) -> SocketAddrV4 {
        SocketAddrV4::new(Ipv4Addr::LOCALHOST, port)
    }

    fn record_with_peers(filesize: u64, peers: &[(u16, u64, u64, u64)]) -> TrackerRecord {
        let mut record = TrackerRecord::new(
            "x".to_owned(),
            filesize,
            String::new(),
            Md5Digest::from_str("5d41402abc4b2a76b9719d911017c592").unwrap(),
        );

        for (port, first, last, seen_at) in peers {
            CurrentClock::set(Duration::from_secs(*seen_at));
            record.update_peer(addr(*port), *first, *last).unwrap();
        }

        record
    }

    #[test]
    fn it_should_target_the_first_missing_byte() {
        let mut log = ProgressLog::default();
        log.record_write(0, 1000);
        let record = record_with_peers(30_000, &[(1, 0, 29_999, 100)]);

        let queue = next_bytes(&log, &record, &[], &HashSet::new());

        assert_eq!(queue[0].first_byte, 1000);
    }

    #[test]
    fn it_should_prefer_the_freshest_peer() {
        let log = ProgressLog::default();
        let record = record_with_peers(30_000, &[(1, 0, 29_999, 100), (2, 0, 29_999, 900), (3, 0, 29_999, 500)]);

        let queue = next_bytes(&log, &record, &[], &HashSet::new());

        assert!(queue.iter().all(|req| req.peer_addr == addr(2)));
    }

    #[test]
    fn it_should_skip_dead_peers() {
        let log = ProgressLog::default();
        let record = record_with_peers(30_000, &[(1, 0, 29_999, 100), (2, 0, 29_999, 900)]);
        let dead: HashSet<_> = [addr(2)].into();

        let queue = next_bytes(&log, &record, &[], &dead);

        assert!(!queue.is_empty());
        assert!(queue.iter().all(|req| req.peer_addr == addr(1)));
    }

    #[test]
    fn it_should_queue_at_most_ten_chunks_of_the_maximum_size() {
        let log = ProgressLog::default();
        let record = record_with_peers(100_000, &[(1, 0, 99_999, 100)]);

        let queue = next_bytes(&log, &record, &[], &HashSet::new());

        assert_eq!(queue.len(), 10);
        assert!(queue.iter().all(|req| req.size == 1024));
        assert_eq!(queue.last().unwrap().first_byte, 9 * 1024);
    }

    #[test]
    fn it_should_clip_the_last_chunk_to_the_peer_range() {
        let log = ProgressLog::default();
        let record = record_with_peers(30_000, &[(1, 0, 1_499, 100)]);

        let queue = next_bytes(&log, &record, &[], &HashSet::new());

        assert_eq!(queue.len(), 2);
        assert_eq!(queue[0].size, 1024);
        assert_eq!((queue[1].first_byte, queue[1].size), (1024, 476));
    }

    #[test]
    fn it_should_never_return_bytes_already_covered_or_in_flight() {
        let mut log = ProgressLog::default();
        log.record_write(0, 1000);
        let downloading = vec![ByteRange { start: 1000, end: 2000 }, ByteRange { start: 5000, end: 6000 }];
        let record = record_with_peers(30_000, &[(1, 0, 29_999, 100)]);

        let queue = next_bytes(&log, &record, &downloading, &HashSet::new());

        let covered = log.merged(&downloading);
        for req in &queue {
            let span = req.span();
            for range in &covered {
                assert!(span.end <= range.start || span.start >= range.end);
            }
        }
        // The queue stops at the next in-flight range.
        assert_eq!(queue.first().map(|req| req.first_byte), Some(2000));
        assert!(queue.iter().all(|req| req.span().end <= 5000));
    }

    #[test]
    fn it_should_return_nothing_when_no_peer_holds_the_needed_byte() {
        let mut log = ProgressLog::default();
        log.record_write(0, 2000);
        let record = record_with_peers(30_000, &[(1, 0, 1_499, 100)]);

        let queue = next_bytes(&log, &record, &[], &HashSet::new());

        assert_eq!(queue, Vec::<ChunkRequest>::new());
    }

    #[test]
    fn it_should_return_nothing_when_the_file_is_complete() {
        let mut log = ProgressLog::default();
        log.record_write(0, 30_000);
        let record = record_with_peers(30_000, &[(1, 0, 29_999, 100)]);

        assert!(next_bytes(&log, &record, &[], &HashSet::new()).is_empty());
    }
}
