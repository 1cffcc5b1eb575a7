//! Configuration for the shoal tracker and peer.
//!
//! Both programs read a small line-oriented `.cfg` file: one value per line,
//! blank lines and lines starting with `#` ignored. Values are recognised by
//! shape: a line of digits is an integer, a line parsing as a dotted quad is
//! an IPv4 address, anything else is text.
//!
//! The client file carries the tracker's port and IPv4 address (in either
//! order), the peer folder path, and — always on the last line — the tracker
//! refresh interval in seconds:
//!
//! ```text
//! # client.cfg
//! 9999
//! 127.0.0.1
//! ./peerfolder
//! 60
//! ```
//!
//! The tracker file carries the listen port on the first line and the shared
//! folder path on the last:
//!
//! ```text
//! # tracker.cfg
//! 9999
//! ./torrents
//! ```
//!
//! Folders named by a configuration are created if missing when the file is
//! loaded. This package also owns the protocol constants shared by both
//! sides.
use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

/// Maximum accepted length of a request line, in bytes.
pub const MAX_MESSAGE_LENGTH: usize = 4096;

/// Maximum byte count a single `GET SEG` request may ask for.
pub const MAX_CHUNK_SIZE: u64 = 1024;

/// Maximum number of chunk requests a downloader keeps in flight per file.
pub const MAX_INFLIGHT: usize = 5;

/// Peers whose `last_seen` is older than this are dropped on `clean()`.
pub const PEER_UPDATE_INTERVAL: Duration = Duration::from_secs(15 * 60);

/// First port the peer's chunk server tries to bind; probing increases from
/// here on `AddrInUse`.
pub const CHUNK_SERVER_START_PORT: u16 = 11000;

/// Per-connection read timeout, surfaced as a connection-lost error.
pub const READ_TIMEOUT: Duration = Duration::from_secs(30);

/// Minimum pause between tracker refresh attempts when a download cannot
/// make progress.
pub const DOWNLOAD_BACKOFF: Duration = Duration::from_millis(500);

/// Maximum number of bytes read from a configuration file.
const CFG_MAX_READ: usize = 1024;

/// Errors raised while loading a configuration file.
#[derive(Error, Debug)]
pub enum Error {
    #[error("configuration file not found: {path}")]
    NotFound { path: PathBuf },

    #[error("unable to read configuration: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },

    #[error("missing configuration value: {what}")]
    Missing { what: &'static str },

    #[error("invalid configuration value for {what}: {value}")]
    Invalid { what: &'static str, value: String },
}

/// A configuration line, classified by shape.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Value {
    Int(u64),
    Ip(Ipv4Addr),
    Text(String),
}

impl Value {
    fn classify(line: &str) -> Self {
        if !line.is_empty() && line.bytes().all(|b| b.is_ascii_digit()) {
            if let Ok(n) = line.parse::<u64>() {
                return Self::Int(n);
            }
        }

        if let Ok(ip) = line.parse::<Ipv4Addr>() {
            return Self::Ip(ip);
        }

        Self::Text(line.to_owned())
    }
}

fn values_of(contents: &str) -> Vec<Value> {
    contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(Value::classify)
        .collect()
}

fn port_from(value: &Value, what: &'static str) -> Result<u16, Error> {
    match value {
        Value::Int(n) => u16::try_from(*n).map_err(|_| Error::Invalid {
            what,
            value: n.to_string(),
        }),
        Value::Ip(ip) => Err(Error::Invalid {
            what,
            value: ip.to_string(),
        }),
        Value::Text(text) => Err(Error::Invalid {
            what,
            value: text.clone(),
        }),
    }
}

fn read_capped(path: &Path) -> Result<String, Error> {
    if !path.exists() {
        return Err(Error::NotFound { path: path.to_owned() });
    }

    let mut contents = std::fs::read_to_string(path)?;
    contents.truncate(CFG_MAX_READ);

    Ok(contents)
}

/// Configuration of a peer (the client side).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Port of the tracker server.
    pub server_port: u16,
    /// IPv4 address of the tracker server.
    pub server_ip: Ipv4Addr,
    /// Folder holding canonical files, tracker records, logs and caches.
    pub peer_dir: PathBuf,
    /// Interval between periodic ownership reports to the tracker.
    pub update_interval: Duration,
}

impl ClientConfig {
    /// Loads the configuration from a file and creates the peer folder if it
    /// is missing.
    ///
    /// # Errors
    ///
    /// Returns an [`enum@Error`] if the file is missing, unreadable, or any
    /// of the four values is absent or malformed.
    pub fn load(path: &Path) -> Result<Self, Error> {
        let config: Self = read_capped(path)?.parse()?;

        std::fs::create_dir_all(&config.peer_dir)?;

        Ok(config)
    }
}

impl FromStr for ClientConfig {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let values = values_of(s);

        if values.len() < 4 {
            return Err(Error::Missing {
                what: "port, address, peer folder and update interval",
            });
        }

        // Port and address may appear in either order.
        let (server_port, server_ip) = match (&values[0], &values[1]) {
            (Value::Int(_), Value::Ip(ip)) => (port_from(&values[0], "server port")?, *ip),
            (Value::Ip(ip), Value::Int(_)) => (port_from(&values[1], "server port")?, *ip),
            _ => {
                return Err(Error::Missing {
                    what: "server port and IPv4 address in the first two lines",
                })
            }
        };

        let peer_dir = match &values[2] {
            Value::Text(text) => PathBuf::from(text),
            Value::Int(n) => PathBuf::from(n.to_string()),
            Value::Ip(ip) => {
                return Err(Error::Invalid {
                    what: "peer folder",
                    value: ip.to_string(),
                })
            }
        };

        // The refresh interval is always the last value.
        let update_interval = match values.last() {
            Some(Value::Int(seconds)) => Duration::from_secs(*seconds),
            Some(Value::Ip(ip)) => {
                return Err(Error::Invalid {
                    what: "update interval",
                    value: ip.to_string(),
                })
            }
            Some(Value::Text(text)) => {
                return Err(Error::Invalid {
                    what: "update interval",
                    value: text.clone(),
                })
            }
            None => unreachable!("length checked above"),
        };

        Ok(Self {
            server_port,
            server_ip,
            peer_dir,
            update_interval,
        })
    }
}

/// Configuration of the tracker server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackerConfig {
    /// Port the tracker listens on.
    pub listen_port: u16,
    /// Folder holding the `.track` record files.
    pub shared_dir: PathBuf,
}

impl TrackerConfig {
    /// Loads the configuration from a file and creates the shared folder if
    /// it is missing.
    ///
    /// # Errors
    ///
    /// Returns an [`enum@Error`] if the file is missing, unreadable, or the
    /// port or folder is absent or malformed.
    pub fn load(path: &Path) -> Result<Self, Error> {
        let config: Self = read_capped(path)?.parse()?;

        std::fs::create_dir_all(&config.shared_dir)?;

        Ok(config)
    }
}

impl FromStr for TrackerConfig {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let values = values_of(s);

        if values.len() < 2 {
            return Err(Error::Missing {
                what: "listen port and shared folder",
            });
        }

        let listen_port = port_from(&values[0], "listen port")?;

        let shared_dir = match values.last() {
            Some(Value::Text(text)) => PathBuf::from(text),
            Some(Value::Int(n)) => PathBuf::from(n.to_string()),
            Some(Value::Ip(ip)) => {
                return Err(Error::Invalid {
                    what: "shared folder",
                    value: ip.to_string(),
                })
            }
            None => unreachable!("length checked above"),
        };

        Ok(Self { listen_port, shared_dir })
    }
}
