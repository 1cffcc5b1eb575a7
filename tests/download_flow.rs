//! End-to-end download tests: a real tracker, real chunk servers, and a
//! download worker assembling a file across chunk boundaries.
mod common;

use std::net::{Ipv4Addr, SocketAddrV4, TcpListener};
use std::time::Duration;

use shoal::peer::client::{PeerIdentity, TrackerClient};
use shoal::peer::downloader::cache::digest_file;
use shoal::peer::downloader::worker::Worker;
use shoal_test_helpers::configuration::digest_of;
use shoal_test_helpers::random;
use tempfile::TempDir;
use tokio::sync::{mpsc, watch};

use crate::common::{host_file, now_unix, send_request, start_chunk_server, start_tracker};

/// Runs a download worker for `filename` inside `peer_dir` until it
/// finishes, returning every message it sent.
async fn run_worker(peer_dir: &std::path::Path, filename: &str, tracker_addr: SocketAddrV4) -> Vec<String> {
    let client = TrackerClient::new(
        tracker_addr,
        PeerIdentity {
            ip: Ipv4Addr::LOCALHOST,
            port: 11999,
        },
    );

    // Fetch and store the record, as the console's `gettracker` would.
    let body = client.fetch_record(filename).await.expect("the record is fetched");
    std::fs::write(peer_dir.join(format!("{filename}.track")), body).unwrap();

    let (_cancel_sender, cancel) = watch::channel(false);
    let (sink, mut messages) = mpsc::unbounded_channel();

    let worker = Worker {
        peer_dir: peer_dir.to_owned(),
        filename: filename.to_owned(),
        client,
        cancel,
        sink,
    };

    tokio::time::timeout(Duration::from_secs(60), worker.run())
        .await
        .expect("the download finishes in time");

    let mut sent = Vec::new();
    while let Ok(message) = messages.try_recv() {
        sent.push(message);
    }
    sent
}

#[tokio::test]
async fn it_should_download_a_file_across_chunk_boundaries() {
    let tracker = start_tracker().await;

    // Peer A fully owns a 3000 byte file; 3000 is deliberately not a
    // multiple of the 1024 byte chunk size, and the name carries a space
    // to push the argument encoding through the whole path.
    let seeder_dir = TempDir::new().unwrap();
    let content = random::bytes(3000);
    let digest = digest_of(&content);
    host_file(seeder_dir.path(), "my data.bin", &content);
    let (seeder, seeder_addr) = start_chunk_server(seeder_dir.path()).await;

    let reply = send_request(
        tracker.addr,
        &format!(
            "<createtracker my+data.bin 3000 seeded {digest} 127.0.0.1 {}>",
            seeder_addr.port()
        ),
    )
    .await;
    assert_eq!(reply, "<createtracker succ>");

    // Peer B downloads it.
    let downloader_dir = TempDir::new().unwrap();
    let messages = run_worker(downloader_dir.path(), "my data.bin", tracker.addr).await;

    assert!(
        messages.iter().any(|m| m.contains("Finished downloading 'my data.bin'")),
        "unexpected messages: {messages:?}"
    );
    assert_eq!(digest_file(&downloader_dir.path().join("my data.bin")).await.unwrap(), digest);
    assert!(!downloader_dir.path().join("my data.bin.track").exists());
    assert!(!downloader_dir.path().join("my data.bin.cache").exists());

    drop(seeder.stop().await);
    drop(tracker.server.stop().await);
}

#[tokio::test]
async fn it_should_skip_a_dead_peer_and_complete_from_a_live_one() {
    let tracker = start_tracker().await;

    let seeder_dir = TempDir::new().unwrap();
    let content = random::bytes(3000);
    let digest = digest_of(&content);
    host_file(seeder_dir.path(), "x", &content);
    let (seeder, seeder_addr) = start_chunk_server(seeder_dir.path()).await;

    // A port that refuses connections: bind it, learn it, drop it.
    let dead_port = {
        let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).unwrap();
        listener.local_addr().unwrap().port()
    };

    // The dead peer carries the fresher timestamp, so the scheduler must
    // try it first and fall back to the live seeder.
    let now = now_unix();
    std::fs::write(
        tracker.shared_dir().join("x.track"),
        format!(
            "Filename: x\nFilesize: 3000\nDescription: seeded\nMD5: {digest}\n\
             127.0.0.1:{dead_port}:0:2999:{now}\n127.0.0.1:{}:0:2999:{}\n",
            seeder_addr.port(),
            now - 10,
        ),
    )
    .unwrap();

    let downloader_dir = TempDir::new().unwrap();
    let messages = run_worker(downloader_dir.path(), "x", tracker.addr).await;

    assert!(
        messages.iter().any(|m| m.contains("Dead peer")),
        "unexpected messages: {messages:?}"
    );
    assert!(
        messages.iter().any(|m| m.contains("Finished downloading 'x'")),
        "unexpected messages: {messages:?}"
    );
    assert_eq!(digest_file(&downloader_dir.path().join("x")).await.unwrap(), digest);

    drop(seeder.stop().await);
    drop(tracker.server.stop().await);
}

#[tokio::test]
async fn it_should_resume_from_an_existing_progress_log() {
    let tracker = start_tracker().await;
    let filename = random::file_name();

    let seeder_dir = TempDir::new().unwrap();
    let content = random::bytes(3000);
    let digest = digest_of(&content);
    host_file(seeder_dir.path(), &filename, &content);
    let (seeder, seeder_addr) = start_chunk_server(seeder_dir.path()).await;

    let reply = send_request(
        tracker.addr,
        &format!(
            "<createtracker {filename} 3000 seeded {digest} 127.0.0.1 {}>",
            seeder_addr.port()
        ),
    )
    .await;
    assert_eq!(reply, "<createtracker succ>");

    // A previous run already banked the first 1000 bytes.
    let downloader_dir = TempDir::new().unwrap();
    std::fs::write(downloader_dir.path().join(format!("{filename}.cache")), &content[..1000]).unwrap();
    std::fs::write(downloader_dir.path().join(format!("{filename}.log")), "0:1000\n").unwrap();

    let messages = run_worker(downloader_dir.path(), &filename, tracker.addr).await;

    assert!(
        messages.iter().any(|m| m.contains(&format!("Finished downloading '{filename}'"))),
        "unexpected messages: {messages:?}"
    );
    assert_eq!(digest_file(&downloader_dir.path().join(&filename)).await.unwrap(), digest);

    drop(seeder.stop().await);
    drop(tracker.server.stop().await);
}

#[tokio::test]
async fn it_should_keep_the_cache_when_the_digest_does_not_match() {
    let tracker = start_tracker().await;

    let seeder_dir = TempDir::new().unwrap();
    let content = random::bytes(2000);
    host_file(seeder_dir.path(), "x", &content);
    let (seeder, seeder_addr) = start_chunk_server(seeder_dir.path()).await;

    // The record advertises a digest that cannot match the content.
    let wrong_digest = digest_of(b"something else entirely");
    let reply = send_request(
        tracker.addr,
        &format!(
            "<createtracker x 2000 seeded {wrong_digest} 127.0.0.1 {}>",
            seeder_addr.port()
        ),
    )
    .await;
    assert_eq!(reply, "<createtracker succ>");

    let downloader_dir = TempDir::new().unwrap();
    let messages = run_worker(downloader_dir.path(), "x", tracker.addr).await;

    assert!(
        messages.iter().any(|m| m.contains("failed verification")),
        "unexpected messages: {messages:?}"
    );
    assert!(downloader_dir.path().join("x.cache").exists());
    assert!(downloader_dir.path().join("x.track").exists());
    assert!(!downloader_dir.path().join("x").exists());

    drop(seeder.stop().await);
    drop(tracker.server.stop().await);
}
