//! Configuration and filesystem fixtures for tests.
//!
//! The fixtures build throwaway peer and tracker folders inside a tempdir
//! and hand back configurations pointing at them. Servers under test bind
//! port `0`, so the configured ports here are placeholders.
use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use md5::{Digest, Md5};
use shoal_configuration::{ClientConfig, TrackerConfig};
use shoal_primitives::md5::Md5Digest;
use tempfile::TempDir;

use crate::random;

/// A throwaway tracker folder plus its configuration.
pub struct TrackerFixture {
    pub config: TrackerConfig,
    // Removes the folder when the fixture is dropped.
    _dir: TempDir,
}

/// A throwaway peer folder plus its configuration.
pub struct PeerFixture {
    pub config: ClientConfig,
    _dir: TempDir,
}

/// Builds a tracker configuration over an empty temporary shared folder.
///
/// # Panics
///
/// Panics if the temporary folder cannot be created.
#[must_use]
pub fn ephemeral_tracker() -> TrackerFixture {
    let dir = TempDir::new().expect("a temporary folder can be created");

    TrackerFixture {
        config: TrackerConfig {
            listen_port: 0,
            shared_dir: dir.path().to_owned(),
        },
        _dir: dir,
    }
}

/// Builds a client configuration over an empty temporary peer folder,
/// pointing at the given tracker port on localhost.
///
/// # Panics
///
/// Panics if the temporary folder cannot be created.
#[must_use]
pub fn ephemeral_peer(server_port: u16) -> PeerFixture {
    let dir = TempDir::new().expect("a temporary folder can be created");

    PeerFixture {
        config: ClientConfig {
            server_port,
            server_ip: Ipv4Addr::LOCALHOST,
            peer_dir: dir.path().to_owned(),
            update_interval: Duration::from_secs(60),
        },
        _dir: dir,
    }
}

/// Writes a file of random content into `dir` and returns its path and MD5.
///
/// # Panics
///
/// Panics if the file cannot be written.
#[must_use]
pub fn seeded_file(dir: &Path, name: &str, size: usize) -> (PathBuf, Md5Digest) {
    let content = random::bytes(size);
    let path = dir.join(name);

    std::fs::write(&path, &content).expect("the seeded file can be written");

    (path, digest_of(&content))
}

/// MD5 digest of a byte buffer.
#[must_use]
pub fn digest_of(content: &[u8]) -> Md5Digest {
    Md5Digest::from_bytes(Md5::digest(content).into())
}
