//! The progress log: which byte ranges of a file have landed on disk.
//!
//! The log is an ordered sequence of disjoint `(start, end)` ranges with
//! `end` exclusive. It starts life as the single entry `0:0` — nothing yet,
//! with the first entry's `end` advancing as bytes land — and is persisted
//! to `<fname>.log` as one `start:end` line per range after every change,
//! so a restarted peer resumes where it left off.
use std::str::FromStr;

use thiserror::Error;

/// A half-open byte range: `start` inclusive, `end` exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct ByteRange {
    pub start: u64,
    pub end: u64,
}

impl ByteRange {
    #[must_use]
    pub fn len(&self) -> u64 {
        self.end.saturating_sub(self.start)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.end <= self.start
    }
}

/// Error raised when a `.log` file cannot be parsed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("malformed progress log: {reason}")]
pub struct MalformedLog {
    pub reason: String,
}

/// The downloaded ranges of one file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressLog {
    ranges: Vec<ByteRange>,
}

impl Default for ProgressLog {
    /// A log that has received nothing yet.
    fn default() -> Self {
        Self {
            ranges: vec![ByteRange { start: 0, end: 0 }],
        }
    }
}

impl ProgressLog {
    /// The ranges, sorted and disjoint.
    #[must_use]
    pub fn ranges(&self) -> &[ByteRange] {
        &self.ranges
    }

    /// Number of bytes the log accounts for.
    #[must_use]
    pub fn bytes_done(&self) -> u64 {
        self.ranges.iter().map(ByteRange::len).sum()
    }

    /// Bytes still missing from a file of `filesize` bytes.
    #[must_use]
    pub fn size_remaining(&self, filesize: u64) -> u64 {
        filesize.saturating_sub(self.bytes_done())
    }

    /// The union of the log with `extra`, merged into sorted disjoint
    /// ranges. Empty ranges disappear.
    #[must_use]
    pub fn merged(&self, extra: &[ByteRange]) -> Vec<ByteRange> {
        let mut all: Vec<ByteRange> = self
            .ranges
            .iter()
            .chain(extra.iter())
            .filter(|range| !range.is_empty())
            .copied()
            .collect();

        merge(&mut all);

        all
    }

    /// Accounts for `size` bytes written at offset `start`.
    ///
    /// The entry whose `end` falls inside the written span is extended to
    /// cover it; when no such entry exists a new range is inserted instead
    /// of dropping the write. Either way the log is re-normalised to sorted
    /// disjoint ranges.
    pub fn record_write(&mut self, start: u64, size: u64) {
        let end = start + size;

        if let Some(entry) = self.ranges.iter_mut().find(|r| r.end >= start && r.end <= end) {
            entry.end = end;
        } else {
            self.ranges.push(ByteRange { start, end });
        }

        merge(&mut self.ranges);

        if self.ranges.is_empty() {
            self.ranges.push(ByteRange { start: 0, end: 0 });
        }
    }

    /// The largest contiguous range; this is what gets reported to the
    /// tracker. `(0, 0)` while nothing has landed.
    #[must_use]
    pub fn largest(&self) -> ByteRange {
        self.ranges
            .iter()
            .copied()
            .max_by_key(ByteRange::len)
            .unwrap_or(ByteRange { start: 0, end: 0 })
    }

    /// Renders the log in its on-disk form.
    #[must_use]
    pub fn render(&self) -> String {
        use std::fmt::Write as _;

        let mut out = String::new();
        for range in &self.ranges {
            writeln!(out, "{}:{}", range.start, range.end).expect("writing to a string cannot fail");
        }
        out
    }
}

impl FromStr for ProgressLog {
    type Err = MalformedLog;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut ranges = Vec::new();

        for line in s.lines() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            let Some((start, end)) = line.split_once(':') else {
                return Err(MalformedLog {
                    reason: format!("missing separator in {line:?}"),
                });
            };

            let (Ok(start), Ok(end)) = (start.trim().parse::<u64>(), end.trim().parse::<u64>()) else {
                return Err(MalformedLog {
                    reason: format!("non-numeric bounds in {line:?}"),
                });
            };

            if end < start {
                return Err(MalformedLog {
                    reason: format!("inverted range in {line:?}"),
                });
            }

            ranges.push(ByteRange { start, end });
        }

        let mut log = Self { ranges };
        let mut normalised = log.merged(&[]);
        if normalised.is_empty() {
            normalised.push(ByteRange { start: 0, end: 0 });
        }
        log.ranges = normalised;

        Ok(log)
    }
}

/// Merges a range list in place into sorted disjoint ranges. Adjacent
/// ranges coalesce; empty ranges are dropped.
fn merge(ranges: &mut Vec<ByteRange>) {
    ranges.retain(|range| !range.is_empty());
    ranges.sort();

    let mut merged: Vec<ByteRange> = Vec::with_capacity(ranges.len());

    for range in ranges.drain(..) {
        match merged.last_mut() {
            Some(last) if range.start <= last.end => last.end = last.end.max(range.end),
            _ => merged.push(range),
        }
    }

    *ranges = merged;
}
