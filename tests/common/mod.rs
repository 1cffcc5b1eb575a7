//! Shared helpers for the end-to-end tests: real servers over throwaway
//! folders, and a raw protocol round trip.
use std::net::{Ipv4Addr, SocketAddrV4};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use shoal::core::Tracker;
use shoal::servers::chunk::server::{ChunkServer, RunningChunkServer};
use shoal::servers::tracker::server::{RunningTrackerServer, TrackerServer};
use shoal_test_helpers::configuration::ephemeral_tracker;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

/// A running tracker server over an empty throwaway shared folder.
pub struct TrackerFixture {
    pub server: RunningTrackerServer,
    pub addr: SocketAddrV4,
    shared_dir: PathBuf,
    _env: shoal_test_helpers::configuration::TrackerFixture,
}

impl TrackerFixture {
    /// The folder holding the tracker's `.track` files.
    #[must_use]
    pub fn shared_dir(&self) -> &Path {
        &self.shared_dir
    }
}

/// Starts a tracker server on an ephemeral port.
pub async fn start_tracker() -> TrackerFixture {
    let env = ephemeral_tracker();
    let shared_dir = env.config.shared_dir.clone();

    let tracker = Arc::new(Tracker::new(&env.config));
    let server = TrackerServer::new(env.config.clone())
        .start(tracker)
        .await
        .expect("the tracker server starts");

    let addr = SocketAddrV4::new(Ipv4Addr::LOCALHOST, server.state.bind_address.port());

    TrackerFixture {
        server,
        addr,
        shared_dir,
        _env: env,
    }
}

/// Starts a chunk server over `peer_dir` on an ephemeral port.
pub async fn start_chunk_server(peer_dir: &Path) -> (RunningChunkServer, SocketAddrV4) {
    let server = ChunkServer::new(peer_dir.to_owned(), 0)
        .start()
        .await
        .expect("the chunk server starts");

    let addr = SocketAddrV4::new(Ipv4Addr::LOCALHOST, server.state.bind_address.port());

    (server, addr)
}

/// One raw protocol round trip: connect, send, half-close, read the whole
/// reply.
pub async fn send_request(addr: SocketAddrV4, line: &str) -> String {
    let mut stream = TcpStream::connect(addr).await.expect("the server accepts connections");

    stream.write_all(line.as_bytes()).await.expect("the request is written");
    stream.shutdown().await.expect("the write half closes");

    let mut reply = String::new();
    stream.read_to_string(&mut reply).await.expect("the reply is read");

    reply
}

/// Seeds a peer folder with a fully owned file: content plus the full-range
/// log that marks it as hosted.
pub fn host_file(peer_dir: &Path, name: &str, content: &[u8]) {
    std::fs::write(peer_dir.join(name), content).expect("the hosted file is written");
    std::fs::write(peer_dir.join(format!("{name}.log")), format!("0:{}\n", content.len()))
        .expect("the log file is written");
}

/// Seconds since the Unix epoch, as written into record peer lines.
pub fn now_unix() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::SystemTime::UNIX_EPOCH)
        .expect("the system time is after the Unix epoch")
        .as_secs()
}
