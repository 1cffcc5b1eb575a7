//! Logic to start and stop tracker server instances.
//!
//! The [`TrackerServer`] is a state machine for a given configuration: it is
//! either stopped or running, and it can be moved between the two states
//! while always keeping the same configuration. Starting binds the TCP
//! listener and spawns the accept loop; stopping delivers a
//! [`Halted`] message through a oneshot channel and waits for the loop to
//! drain.
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;

use futures::future::Future;
use shoal_configuration::{TrackerConfig, READ_TIMEOUT};
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::handlers;
use crate::core::Tracker;
use crate::protocol::response::{ExceptionKind, Response};
use crate::protocol::{line, request};
use crate::servers::signals::{shutdown_signal_with_message, Halted};

/// Error that can occur when starting or stopping the tracker server.
#[derive(Error, Debug)]
pub enum Error {
    #[error("unable to bind to {addr}: {source}")]
    Bind { addr: SocketAddr, source: std::io::Error },

    #[error("unable to obtain the bound address: {source}")]
    BoundAddress { source: std::io::Error },
}

/// A tracker server controller with no instance running.
#[allow(clippy::module_name_repetitions)]
pub type StoppedTrackerServer = TrackerServer<Stopped>;

/// A tracker server controller with a running instance.
#[allow(clippy::module_name_repetitions)]
pub type RunningTrackerServer = TrackerServer<Running>;

/// A tracker server instance controller.
#[allow(clippy::module_name_repetitions)]
pub struct TrackerServer<S> {
    /// The configuration used every time the server is started.
    pub cfg: TrackerConfig,
    /// The state of the server: `running` or `stopped`.
    pub state: S,
}

/// A stopped tracker server state.
pub struct Stopped;

/// A running tracker server state.
pub struct Running {
    /// The address where the server is bound.
    pub bind_address: SocketAddr,
    halt_sender: tokio::sync::oneshot::Sender<Halted>,
    task: JoinHandle<()>,
}

impl TrackerServer<Stopped> {
    #[must_use]
    pub fn new(cfg: TrackerConfig) -> Self {
        Self { cfg, state: Stopped {} }
    }

    /// It starts the server and returns a controller in `running` state.
    ///
    /// # Errors
    ///
    /// Will return an [`enum@Error`] if the listener cannot be bound to the
    /// configured port.
    pub async fn start(self, tracker: Arc<Tracker>) -> Result<TrackerServer<Running>, Error> {
        let addr = SocketAddr::from((Ipv4Addr::UNSPECIFIED, self.cfg.listen_port));

        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| Error::Bind { addr, source })?;
        let bind_address = listener.local_addr().map_err(|source| Error::BoundAddress { source })?;

        let (halt_sender, rx_halt) = tokio::sync::oneshot::channel::<Halted>();

        let task = tokio::spawn(accept_loop(
            listener,
            tracker,
            shutdown_signal_with_message(rx_halt, format!("Stopping tracker server on {bind_address} ...")),
        ));

        info!("Tracker server started on {bind_address}");

        Ok(TrackerServer {
            cfg: self.cfg,
            state: Running {
                bind_address,
                halt_sender,
                task,
            },
        })
    }
}

impl TrackerServer<Running> {
    /// It stops the server and returns a controller in `stopped` state.
    pub async fn stop(self) -> TrackerServer<Stopped> {
        // A send failure means the accept loop already ended (e.g. on the
        // global shutdown signal); either way the task is awaited.
        drop(self.state.halt_sender.send(Halted::Normal));
        drop(self.state.task.await);

        TrackerServer {
            cfg: self.cfg,
            state: Stopped {},
        }
    }
}

/// Accepts connections until the shutdown signal resolves, handling each
/// connection in its own task.
async fn accept_loop<F>(listener: TcpListener, tracker: Arc<Tracker>, shutdown_signal: F)
where
    F: Future<Output = ()>,
{
    tokio::pin!(shutdown_signal);

    loop {
        tokio::select! {
            () = &mut shutdown_signal => break,
            accepted = listener.accept() => match accepted {
                Ok((stream, remote_addr)) => {
                    let tracker = tracker.clone();
                    tokio::spawn(async move {
                        handle_connection(stream, remote_addr, &tracker).await;
                    });
                }
                Err(err) => warn!("failed to accept a connection: {err}"),
            }
        }
    }
}

/// One request per connection: read a bounded line, dispatch, respond,
/// close.
async fn handle_connection(mut stream: TcpStream, remote_addr: SocketAddr, tracker: &Tracker) {
    debug!("connection from {remote_addr}");

    let response = match tokio::time::timeout(READ_TIMEOUT, line::read_request_line(&mut stream)).await {
        Err(_elapsed) => Response::exception(ExceptionKind::ConnectionLost, "read timed out"),
        Ok(read) => handlers::handle(read.and_then(|raw| request::parse(&raw)), tracker).await,
    };

    if let Err(err) = stream.write_all(response.to_wire().as_bytes()).await {
        debug!("failed to respond to {remote_addr}: {err}");
    }

    drop(stream.shutdown().await);
}
