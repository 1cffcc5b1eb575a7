//! End-to-end tests for the peer's chunk server.
mod common;

use shoal::protocol::response::{ExceptionKind, Response};
use tempfile::TempDir;

use crate::common::{host_file, send_request, start_chunk_server};

#[tokio::test]
async fn it_should_serve_a_byte_range_as_base64() {
    let dir = TempDir::new().unwrap();
    host_file(dir.path(), "x", b"0123456789");
    let (server, addr) = start_chunk_server(dir.path()).await;

    let reply = send_request(addr, "<GET SEG x 2 4>").await;

    assert_eq!(Response::parse(&reply).unwrap(), Response::Got(b"2345".to_vec()));

    drop(server.stop().await);
}

#[tokio::test]
async fn it_should_serve_a_short_read_at_end_of_file() {
    let dir = TempDir::new().unwrap();
    host_file(dir.path(), "x", b"0123456789");
    let (server, addr) = start_chunk_server(dir.path()).await;

    let reply = send_request(addr, "<GET SEG x 8 1024>").await;

    assert_eq!(Response::parse(&reply).unwrap(), Response::Got(b"89".to_vec()));

    drop(server.stop().await);
}

#[tokio::test]
async fn it_should_answer_an_empty_payload_for_a_zero_chunk() {
    let dir = TempDir::new().unwrap();
    host_file(dir.path(), "x", b"0123456789");
    let (server, addr) = start_chunk_server(dir.path()).await;

    let reply = send_request(addr, "<GET SEG x 0 0>").await;

    assert_eq!(reply, "<GET GOT 0>\n");

    drop(server.stop().await);
}

#[tokio::test]
async fn it_should_reject_a_chunk_size_above_the_maximum() {
    let dir = TempDir::new().unwrap();
    host_file(dir.path(), "x", b"0123456789");
    let (server, addr) = start_chunk_server(dir.path()).await;

    let reply = send_request(addr, "<GET SEG x 0 1025>").await;

    assert_eq!(reply, "<GET invalid>\n");

    drop(server.stop().await);
}

#[tokio::test]
async fn it_should_refuse_to_serve_an_unhosted_file() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("x"), b"0123456789").unwrap();
    let (server, addr) = start_chunk_server(dir.path()).await;

    let reply = send_request(addr, "<GET SEG x 0 4>").await;

    let Response::Exception { kind, .. } = Response::parse(&reply).unwrap() else {
        panic!("expected an exception, got {reply:?}");
    };
    assert_eq!(kind, ExceptionKind::NotHostingFile);

    drop(server.stop().await);
}

#[tokio::test]
async fn it_should_probe_past_an_occupied_port() {
    let dir = TempDir::new().unwrap();
    host_file(dir.path(), "x", b"0123456789");

    // Occupy a port, then ask a second server to start probing from it.
    let (first, first_addr) = start_chunk_server(dir.path()).await;
    let second = shoal::servers::chunk::server::ChunkServer::new(dir.path().to_owned(), first_addr.port())
        .start()
        .await
        .expect("probing finds the next free port");

    assert_ne!(second.state.bind_address.port(), first_addr.port());

    drop(second.stop().await);
    drop(first.stop().await);
}
