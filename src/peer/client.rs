//! The peer's client side of the protocol.
//!
//! One request, one connection: the client opens a TCP connection, writes a
//! single request line, half-closes the stream and reads the whole reply to
//! end-of-stream before parsing it. The [`TrackerClient`] talks to the
//! tracker; [`fetch_segment`] talks to another peer's chunk server.
//!
//! Connection refusals are surfaced as their own error variant because the
//! downloader treats a refusing peer as dead for the rest of the run.
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};

use shoal_configuration::READ_TIMEOUT;
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::debug;

use crate::core::record::TRACK_SUFFIX;
use crate::protocol::arg;
use crate::protocol::response::{AckStatus, ExceptionKind, ListEntry, Response};

/// The identity a peer reports to the tracker: the IPv4 address learned
/// from the first outbound connection, and the chunk server's listen port.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PeerIdentity {
    pub ip: Ipv4Addr,
    pub port: u16,
}

/// Errors raised by client calls.
#[derive(Error, Debug)]
pub enum ClientError {
    #[error("connection refused by {addr}")]
    Refused { addr: SocketAddrV4 },

    #[error("connection to {addr} failed: {source}")]
    Io { addr: SocketAddrV4, source: std::io::Error },

    #[error("connection to {addr} timed out")]
    TimedOut { addr: SocketAddrV4 },

    #[error("malformed reply from {addr}: {reason}")]
    MalformedReply { addr: SocketAddrV4, reason: String },

    #[error("{addr} answered {kind}: {}", .info.as_deref().unwrap_or("no detail"))]
    Rejected {
        addr: SocketAddrV4,
        kind: ExceptionKind,
        info: Option<String>,
    },

    #[error("{addr} rejected the chunk size")]
    ChunkRefused { addr: SocketAddrV4 },

    #[error("unexpected reply frame from {addr}")]
    UnexpectedFrame { addr: SocketAddrV4 },
}

/// Sends one request line and parses the whole reply.
///
/// Returns the parsed response plus the local address of the connection,
/// which is how a peer learns its own public IPv4 address.
async fn round_trip(addr: SocketAddrV4, request_line: &str) -> Result<(Response, SocketAddr), ClientError> {
    let result = tokio::time::timeout(READ_TIMEOUT, async {
        let mut stream = TcpStream::connect(addr).await.map_err(|source| {
            if source.kind() == std::io::ErrorKind::ConnectionRefused {
                ClientError::Refused { addr }
            } else {
                ClientError::Io { addr, source }
            }
        })?;

        let local_addr = stream.local_addr().map_err(|source| ClientError::Io { addr, source })?;

        stream
            .write_all(request_line.as_bytes())
            .await
            .map_err(|source| ClientError::Io { addr, source })?;
        // Half-close so the server sees end-of-request even without a
        // newline.
        stream.shutdown().await.map_err(|source| ClientError::Io { addr, source })?;

        let mut reply = String::new();
        stream
            .read_to_string(&mut reply)
            .await
            .map_err(|source| ClientError::Io { addr, source })?;

        let response = Response::parse(&reply).map_err(|err| ClientError::MalformedReply {
            addr,
            reason: err.reason,
        })?;

        Ok((response, local_addr))
    })
    .await;

    match result {
        Ok(inner) => inner,
        Err(_elapsed) => Err(ClientError::TimedOut { addr }),
    }
}

fn reject(addr: SocketAddrV4, response: Response) -> ClientError {
    match response {
        Response::Exception { kind, info } => ClientError::Rejected { addr, kind, info },
        Response::InvalidChunk => ClientError::ChunkRefused { addr },
        _ => ClientError::UnexpectedFrame { addr },
    }
}

/// A handle on the tracker, carrying the peer's identity.
#[derive(Debug, Clone, Copy)]
pub struct TrackerClient {
    tracker_addr: SocketAddrV4,
    identity: PeerIdentity,
}

impl TrackerClient {
    #[must_use]
    pub fn new(tracker_addr: SocketAddrV4, identity: PeerIdentity) -> Self {
        Self { tracker_addr, identity }
    }

    #[must_use]
    pub fn tracker_addr(&self) -> SocketAddrV4 {
        self.tracker_addr
    }

    #[must_use]
    pub fn identity(&self) -> PeerIdentity {
        self.identity
    }

    /// The startup handshake: greets the tracker and returns the IPv4
    /// address this peer is seen under.
    ///
    /// # Errors
    ///
    /// Returns a [`ClientError`] if the tracker is unreachable or does not
    /// answer `<HELLO>`.
    pub async fn hello(tracker_addr: SocketAddrV4) -> Result<Ipv4Addr, ClientError> {
        let (response, local_addr) = round_trip(tracker_addr, "<HELLO>\n").await?;

        match (response, local_addr) {
            (Response::Hello, SocketAddr::V4(local)) => Ok(*local.ip()),
            (Response::Hello, SocketAddr::V6(_)) => Err(ClientError::UnexpectedFrame { addr: tracker_addr }),
            (other, _) => Err(reject(tracker_addr, other)),
        }
    }

    /// Sends `<REQ LIST>` and returns the record summaries.
    ///
    /// # Errors
    ///
    /// Returns a [`ClientError`] if the tracker is unreachable or answers
    /// with anything but a list.
    pub async fn list(&self) -> Result<Vec<ListEntry>, ClientError> {
        let (response, _) = round_trip(self.tracker_addr, "<REQ LIST>\n").await?;

        match response {
            Response::List(entries) => Ok(entries),
            other => Err(reject(self.tracker_addr, other)),
        }
    }

    /// Fetches `<filename>.track` and returns the record's text body.
    ///
    /// # Errors
    ///
    /// Returns a [`ClientError`] if the tracker is unreachable, the record
    /// does not exist, or the reply is not a record transfer.
    pub async fn fetch_record(&self, filename: &str) -> Result<String, ClientError> {
        let line = format!("<GET {}{TRACK_SUFFIX}>\n", arg::encode(filename));
        let (response, _) = round_trip(self.tracker_addr, &line).await?;

        match response {
            Response::TrackerBody { body, .. } => Ok(body),
            other => Err(reject(self.tracker_addr, other)),
        }
    }

    /// Sends `createtracker` for a file this peer fully owns.
    ///
    /// # Errors
    ///
    /// Returns a [`ClientError`] if the tracker is unreachable or the reply
    /// is not a `createtracker` acknowledgement.
    pub async fn create_tracker(
        &self,
        filename: &str,
        filesize: u64,
        description: &str,
        md5: &shoal_primitives::md5::Md5Digest,
    ) -> Result<AckStatus, ClientError> {
        let line = format!(
            "<createtracker {} {filesize} {} {md5} {} {}>\n",
            arg::encode(filename),
            arg::encode(description),
            self.identity.ip,
            self.identity.port,
        );
        let (response, _) = round_trip(self.tracker_addr, &line).await?;

        match response {
            Response::Ack { status, .. } => Ok(status),
            other => Err(reject(self.tracker_addr, other)),
        }
    }

    /// Sends `updatetracker` reporting this peer owns `first_byte..=last_byte`.
    ///
    /// # Errors
    ///
    /// Returns a [`ClientError`] if the tracker is unreachable or the reply
    /// is not an `updatetracker` acknowledgement.
    pub async fn update_tracker(&self, filename: &str, first_byte: u64, last_byte: u64) -> Result<AckStatus, ClientError> {
        let line = format!(
            "<updatetracker {} {first_byte} {last_byte} {} {}>\n",
            arg::encode(filename),
            self.identity.ip,
            self.identity.port,
        );
        let (response, _) = round_trip(self.tracker_addr, &line).await?;

        match response {
            Response::Ack { status, .. } => {
                if status != AckStatus::Succ {
                    debug!("tracker answered {status:?} to an update for {filename}");
                }
                Ok(status)
            }
            other => Err(reject(self.tracker_addr, other)),
        }
    }
}

/// Fetches one byte range from another peer's chunk server.
///
/// # Errors
///
/// Returns a [`ClientError`]; `Refused` marks the peer dead for the run,
/// any payload problem surfaces as a malformed reply.
pub async fn fetch_segment(
    peer_addr: SocketAddrV4,
    filename: &str,
    first_byte: u64,
    chunk_size: u64,
) -> Result<Vec<u8>, ClientError> {
    let line = format!("<GET SEG {} {first_byte} {chunk_size}>\n", arg::encode(filename));
    let (response, _) = round_trip(peer_addr, &line).await?;

    match response {
        Response::Got(payload) => Ok(payload),
        other => Err(reject(peer_addr, other)),
    }
}
