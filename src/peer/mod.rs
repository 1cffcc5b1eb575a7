//! The peer: chunk server, downloader and refresher under one roof.
//!
//! [`Peer::start`] performs the startup handshake with the tracker (a
//! `<HELLO>` round trip that doubles as IPv4 self-discovery), binds the
//! chunk server by port probing, and launches the downloader and refresher
//! jobs. The resulting [`Peer`] owns all three and wires their cooperative
//! shutdown: [`Peer::stop`] delivers the downloader's `Exit` event, halts
//! the refresher and stops the chunk server, in that order.
//!
//! User-visible output goes through the [`MessageSink`], an append-only
//! line channel consumed by whoever runs the peer (the binary prints it to
//! stdout).
pub mod client;
pub mod downloader;
pub mod refresher;

use std::net::SocketAddrV4;

use shoal_configuration::{ClientConfig, CHUNK_SERVER_START_PORT};
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::info;

use self::client::{ClientError, PeerIdentity, TrackerClient};
use self::downloader::Event;
use crate::servers::chunk::server::{ChunkServer, RunningChunkServer};
use crate::servers::signals::Halted;

/// The append-only sink for user-visible messages.
pub type MessageSink = mpsc::UnboundedSender<String>;

/// Errors raised while starting or stopping the peer.
#[derive(Error, Debug)]
pub enum Error {
    #[error("tracker handshake failed: {source}")]
    Handshake {
        #[from]
        source: ClientError,
    },

    #[error("chunk server failure: {source}")]
    ChunkServer {
        #[from]
        source: crate::servers::chunk::server::Error,
    },
}

/// A running peer.
pub struct Peer {
    chunk_server: RunningChunkServer,
    downloader: JoinHandle<()>,
    refresher: JoinHandle<()>,
    refresher_halt: oneshot::Sender<Halted>,
    events: mpsc::Sender<Event>,
    client: TrackerClient,
}

impl Peer {
    /// Starts the peer's three jobs.
    ///
    /// # Errors
    ///
    /// Returns an [`enum@Error`] if the tracker does not answer the
    /// handshake or the chunk server cannot bind any port.
    pub async fn start(config: &ClientConfig, sink: MessageSink) -> Result<Self, Error> {
        let tracker_addr = SocketAddrV4::new(config.server_ip, config.server_port);

        let my_ip = TrackerClient::hello(tracker_addr).await?;

        let chunk_server = ChunkServer::new(config.peer_dir.clone(), CHUNK_SERVER_START_PORT).start().await?;
        let my_port = chunk_server.state.bind_address.port();

        let identity = PeerIdentity { ip: my_ip, port: my_port };
        let client = TrackerClient::new(tracker_addr, identity);

        info!("peer identity is {}:{}", identity.ip, identity.port);

        let (events, events_receiver) = mpsc::channel(16);
        let downloader = downloader::start_job(config, client, events_receiver, sink.clone());

        let (refresher_halt, rx_halt) = oneshot::channel();
        let refresher = refresher::start_job(config, client, rx_halt);

        Ok(Self {
            chunk_server,
            downloader,
            refresher,
            refresher_halt,
            events,
            client,
        })
    }

    /// The tracker client carrying this peer's identity.
    #[must_use]
    pub fn client(&self) -> TrackerClient {
        self.client
    }

    /// The channel feeding the downloader supervisor.
    #[must_use]
    pub fn events(&self) -> mpsc::Sender<Event> {
        self.events.clone()
    }

    /// The port the chunk server bound.
    #[must_use]
    pub fn chunk_port(&self) -> u16 {
        self.chunk_server.state.bind_address.port()
    }

    /// Cooperative shutdown: downloader first (it may still be writing
    /// files), then the refresher, then the chunk server.
    pub async fn stop(self) {
        drop(self.events.send(Event::Exit).await);
        drop(self.downloader.await);

        drop(self.refresher_halt.send(Halted::Normal));
        drop(self.refresher.await);

        drop(self.chunk_server.stop().await);
    }
}
