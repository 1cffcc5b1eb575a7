//! The peer's chunk server.
//!
//! Serves `GET SEG fname start chunk_size` byte-range reads out of the peer
//! folder, one request per connection. A peer only serves files it hosts: a
//! `<fname>.log` file in the peer folder is the hosting marker.
pub mod handlers;
pub mod server;
