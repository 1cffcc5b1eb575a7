//! Logic to start and stop chunk server instances.
//!
//! Same controller shape as the tracker server, with one difference: the
//! listen port is probed. Binding starts at the configured port and walks
//! upwards on "address already in use" until a free port is found; the port
//! that finally bound becomes part of the peer's identity on the tracker.
use std::net::{Ipv4Addr, SocketAddr};
use std::path::PathBuf;

use futures::future::Future;
use shoal_configuration::READ_TIMEOUT;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::handlers;
use crate::protocol::response::{ExceptionKind, Response};
use crate::protocol::{line, request};
use crate::servers::signals::{shutdown_signal_with_message, Halted};

/// Error that can occur when starting or stopping the chunk server.
#[derive(Error, Debug)]
pub enum Error {
    #[error("no bindable port from {start_port} upwards: {source}")]
    Bind { start_port: u16, source: std::io::Error },

    #[error("unable to obtain the bound address: {source}")]
    BoundAddress { source: std::io::Error },
}

/// A chunk server controller with no instance running.
#[allow(clippy::module_name_repetitions)]
pub type StoppedChunkServer = ChunkServer<Stopped>;

/// A chunk server controller with a running instance.
#[allow(clippy::module_name_repetitions)]
pub type RunningChunkServer = ChunkServer<Running>;

/// A chunk server instance controller.
#[allow(clippy::module_name_repetitions)]
pub struct ChunkServer<S> {
    /// The folder holding the files this peer hosts.
    pub peer_dir: PathBuf,
    /// The first port to try binding.
    pub start_port: u16,
    /// The state of the server: `running` or `stopped`.
    pub state: S,
}

/// A stopped chunk server state.
pub struct Stopped;

/// A running chunk server state.
pub struct Running {
    /// The address where the server is bound.
    pub bind_address: SocketAddr,
    halt_sender: tokio::sync::oneshot::Sender<Halted>,
    task: JoinHandle<()>,
}

impl ChunkServer<Stopped> {
    #[must_use]
    pub fn new(peer_dir: PathBuf, start_port: u16) -> Self {
        Self {
            peer_dir,
            start_port,
            state: Stopped {},
        }
    }

    /// It starts the server and returns a controller in `running` state.
    ///
    /// # Errors
    ///
    /// Will return an [`enum@Error`] if no port from `start_port` upwards
    /// can be bound.
    pub async fn start(self) -> Result<ChunkServer<Running>, Error> {
        let listener = bind_probing(self.start_port).await?;
        let bind_address = listener.local_addr().map_err(|source| Error::BoundAddress { source })?;

        let (halt_sender, rx_halt) = tokio::sync::oneshot::channel::<Halted>();

        let peer_dir = self.peer_dir.clone();
        let task = tokio::spawn(accept_loop(
            listener,
            peer_dir,
            shutdown_signal_with_message(rx_halt, format!("Stopping chunk server on {bind_address} ...")),
        ));

        info!("Chunk server started on {bind_address}");

        Ok(ChunkServer {
            peer_dir: self.peer_dir,
            start_port: self.start_port,
            state: Running {
                bind_address,
                halt_sender,
                task,
            },
        })
    }
}

impl ChunkServer<Running> {
    /// It stops the server and returns a controller in `stopped` state.
    pub async fn stop(self) -> ChunkServer<Stopped> {
        // A send failure means the accept loop already ended (e.g. on the
        // global shutdown signal); either way the task is awaited.
        drop(self.state.halt_sender.send(Halted::Normal));
        drop(self.state.task.await);

        ChunkServer {
            peer_dir: self.peer_dir,
            start_port: self.start_port,
            state: Stopped {},
        }
    }
}

/// Binds the first free port at or above `start_port`.
async fn bind_probing(start_port: u16) -> Result<TcpListener, Error> {
    let mut port = start_port;

    loop {
        match TcpListener::bind(SocketAddr::from((Ipv4Addr::UNSPECIFIED, port))).await {
            Ok(listener) => return Ok(listener),
            Err(source) if source.kind() == std::io::ErrorKind::AddrInUse && port < u16::MAX => {
                debug!("port {port} is in use, trying {}", port + 1);
                port += 1;
            }
            Err(source) => return Err(Error::Bind { start_port, source }),
        }
    }
}

async fn accept_loop<F>(listener: TcpListener, peer_dir: PathBuf, shutdown_signal: F)
where
    F: Future<Output = ()>,
{
    tokio::pin!(shutdown_signal);

    loop {
        tokio::select! {
            () = &mut shutdown_signal => break,
            accepted = listener.accept() => match accepted {
                Ok((stream, remote_addr)) => {
                    let peer_dir = peer_dir.clone();
                    tokio::spawn(async move {
                        handle_connection(stream, remote_addr, &peer_dir).await;
                    });
                }
                Err(err) => warn!("failed to accept a connection: {err}"),
            }
        }
    }
}

async fn handle_connection(mut stream: TcpStream, remote_addr: SocketAddr, peer_dir: &std::path::Path) {
    debug!("chunk request from {remote_addr}");

    let response = match tokio::time::timeout(READ_TIMEOUT, line::read_request_line(&mut stream)).await {
        Err(_elapsed) => Response::exception(ExceptionKind::ConnectionLost, "read timed out"),
        Ok(read) => handlers::handle(read.and_then(|raw| request::parse(&raw)), peer_dir).await,
    };

    if let Err(err) = stream.write_all(response.to_wire().as_bytes()).await {
        debug!("failed to respond to {remote_addr}: {err}");
    }

    drop(stream.shutdown().await);
}
