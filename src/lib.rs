//! **Shoal** is a small tracker-coordinated, byte-range file-sharing network.
//!
//! A central **tracker server** keeps one descriptor (a *tracker record*) per
//! shared file. The record lists the peers currently known to hold byte
//! ranges of that file, each stamped with the last time the tracker heard
//! from it. **Peers** ask the tracker who holds what, then exchange file
//! content directly with each other over a chunk-transfer protocol.
//!
//! Both services speak the same line-oriented text protocol: a request is a
//! single `<command arg1 … argN>` line, and responses are one or more framed
//! lines. See [`protocol`] for the codec.
//!
//! # Services
//!
//! From the end-user perspective the repository provides two programs:
//!
//! - `shoal-tracker`: the tracker server. It answers `createtracker`,
//!   `updatetracker`, `REQ`, `GET` and `HELLO` requests against a directory
//!   of `.track` record files. See [`servers::tracker`] and [`core`].
//! - `shoal-peer`: the peer. It runs a chunk server
//!   ([`servers::chunk`]) serving `GET SEG` byte-range reads, a concurrent
//!   downloader ([`peer::downloader`]) that pulls missing ranges from other
//!   peers, and a refresher ([`peer::refresher`]) that periodically reports
//!   local ownership to the tracker. An interactive console ([`console`])
//!   drives it.
//!
//! # Components
//!
//! ```text
//! Delivery layer           Domain layer
//!
//! tracker TCP server  |>   core tracker (record store)
//!
//! chunk TCP server    |
//! downloader          |>   peer folder (canonical files, .track,
//! refresher           |    .log and .cache files)
//! ```
//!
//! - [`protocol`]: the wire codec shared by every component.
//! - [`core`]: tracker records and the record store with its per-record
//!   write discipline.
//! - [`servers`]: the TCP delivery layer for both sides.
//! - [`peer`]: the peer orchestrator with its downloader, refresher and
//!   tracker client.
//!
//! Timestamps come from the clock in the `shoal-clock` package so that peer
//! freshness can be tested against a frozen instant. Configuration and the
//! shared protocol constants live in `shoal-configuration`.
pub mod app;
pub mod bootstrap;
pub mod console;
pub mod core;
pub mod peer;
pub mod protocol;
pub mod servers;

/// The clock peer timestamps are read from: wall time in production, a
/// frozen thread-local instant under test so that staleness logic can be
/// exercised without sleeping.
#[cfg(not(test))]
pub type CurrentClock = shoal_clock::SystemClock;

#[cfg(test)]
pub type CurrentClock = shoal_clock::FrozenClock;
