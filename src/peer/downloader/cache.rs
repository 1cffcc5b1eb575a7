//! The cache file: downloaded bytes at their final offsets.
//!
//! The cache is a sparse file owned exclusively by one download worker
//! until completion, at which point it is digested, verified and renamed to
//! the final filename.
use std::io::SeekFrom;
use std::path::{Path, PathBuf};

use md5::{Digest, Md5};
use shoal_primitives::md5::Md5Digest;
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};

/// Suffix of cache files in the peer folder.
pub const CACHE_SUFFIX: &str = ".cache";

/// An open cache file.
pub struct CacheFile {
    path: PathBuf,
    file: tokio::fs::File,
}

impl CacheFile {
    /// Opens (or creates) the cache file for `filename` in the peer folder.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the file cannot be opened.
    pub async fn open(peer_dir: &Path, filename: &str) -> std::io::Result<Self> {
        let path = peer_dir.join(format!("{filename}{CACHE_SUFFIX}"));

        let file = tokio::fs::OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)
            .await?;

        Ok(Self { path, file })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Writes `payload` at byte offset `offset`.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the seek or write fails.
    pub async fn write_at(&mut self, offset: u64, payload: &[u8]) -> std::io::Result<()> {
        self.file.seek(SeekFrom::Start(offset)).await?;
        self.file.write_all(payload).await?;
        self.file.flush().await
    }

    /// MD5 over the whole cache content.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the file cannot be read back.
    pub async fn digest(&mut self) -> std::io::Result<Md5Digest> {
        self.file.seek(SeekFrom::Start(0)).await?;

        let mut hasher = Md5::new();
        let mut buffer = vec![0u8; 8192];

        loop {
            let n = self.file.read(&mut buffer).await?;
            if n == 0 {
                break;
            }
            hasher.update(&buffer[..n]);
        }

        Ok(Md5Digest::from_bytes(hasher.finalize().into()))
    }
}

/// MD5 of an arbitrary file, read in chunks.
///
/// # Errors
///
/// Returns an I/O error if the file cannot be read.
pub async fn digest_file(path: &Path) -> std::io::Result<Md5Digest> {
    let mut file = tokio::fs::File::open(path).await?;

    let mut hasher = Md5::new();
    let mut buffer = vec![0u8; 8192];

    loop {
        let n = file.read(&mut buffer).await?;
        if n == 0 {
            break;
        }
        hasher.update(&buffer[..n]);
    }

    Ok(Md5Digest::from_bytes(hasher.finalize().into()))
}
