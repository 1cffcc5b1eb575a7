//! End-to-end test of the peer orchestrator and its console: handshake,
//! sharing a file, listing it, and cooperative shutdown.
mod common;

use std::time::Duration;

use shoal::console::{self, Outcome};
use shoal::peer::Peer;
use shoal_test_helpers::configuration::{ephemeral_peer, seeded_file};
use tokio::sync::mpsc;

use crate::common::{send_request, start_tracker};

/// Drains every message currently queued on the sink.
fn drain(messages: &mut mpsc::UnboundedReceiver<String>) -> Vec<String> {
    let mut sent = Vec::new();
    while let Ok(message) = messages.try_recv() {
        sent.push(message);
    }
    sent
}

#[tokio::test]
async fn it_should_share_a_file_through_the_console() {
    let tracker = start_tracker().await;

    let env = ephemeral_peer(tracker.addr.port());
    let (path, digest) = seeded_file(&env.config.peer_dir, "shared.bin", 2048);
    assert!(path.exists());

    let (sink, mut messages) = mpsc::unbounded_channel();
    let peer = tokio::time::timeout(Duration::from_secs(30), Peer::start(&env.config, sink.clone()))
        .await
        .expect("the peer starts in time")
        .expect("the handshake and servers come up");

    // Share the file.
    let outcome = console::dispatch("createtracker shared.bin 'an end to end file'", &peer, &env.config, &sink).await;
    assert_eq!(outcome, Outcome::Continue);
    assert!(
        drain(&mut messages)
            .iter()
            .any(|m| m.contains("Created a tracker record for 'shared.bin'")),
        "createtracker did not succeed"
    );

    // The full-range log marks the file as hosted.
    let log = std::fs::read_to_string(env.config.peer_dir.join("shared.bin.log")).unwrap();
    assert_eq!(log, "0:2048\n");

    // The record is listed, with the digest the console computed.
    let reply = send_request(tracker.addr, "<REQ LIST>").await;
    assert!(reply.contains(&format!("shared.bin 2048 {digest}")), "unexpected list: {reply:?}");

    // The console lists it too, and `quit` ends the session.
    console::dispatch("REQ", &peer, &env.config, &sink).await;
    assert!(
        drain(&mut messages).iter().any(|m| m.contains("shared.bin")),
        "REQ did not list the shared file"
    );
    assert_eq!(console::dispatch("quit", &peer, &env.config, &sink).await, Outcome::Quit);

    tokio::time::timeout(Duration::from_secs(30), peer.stop())
        .await
        .expect("the peer stops in time");

    drop(tracker.server.stop().await);
}

#[tokio::test]
async fn it_should_report_unknown_console_commands() {
    let tracker = start_tracker().await;

    let env = ephemeral_peer(tracker.addr.port());
    let (sink, mut messages) = mpsc::unbounded_channel();
    let peer = Peer::start(&env.config, sink.clone()).await.expect("the peer starts");

    console::dispatch("frobnicate now", &peer, &env.config, &sink).await;

    assert!(
        drain(&mut messages).iter().any(|m| m.contains("Unknown command 'frobnicate'")),
        "no unknown-command message"
    );

    peer.stop().await;
    drop(tracker.server.stop().await);
}
