//! Shutdown signal plumbing shared by both servers.
//!
//! Every running server owns a oneshot channel carrying a [`Halted`]
//! message. Its accept loop finishes when either that channel fires (a
//! `stop()` call) or the process-wide shutdown signal arrives.

use derive_more::Display;
use futures::future::BoxFuture;
use futures::FutureExt;
use tracing::info;

/// The message a running server receives from its controller to notify the
/// service to shut down.
#[derive(Copy, Clone, Debug, Display, PartialEq, Eq)]
pub enum Halted {
    Normal,
    Dropped,
}

/// Resolves on `ctrl_c` or, on unix, the terminate signal.
///
/// # Panics
///
/// Panics if a signal handler cannot be installed.
pub async fn global_shutdown_signal() {
    let interrupt: BoxFuture<'_, ()> = async {
        tokio::signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    }
    .boxed();

    #[cfg(unix)]
    let terminate: BoxFuture<'_, ()> = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    }
    .boxed();

    #[cfg(not(unix))]
    let terminate: BoxFuture<'_, ()> = std::future::pending::<()>().boxed();

    tokio::select! {
        () = interrupt => {},
        () = terminate => {}
    }
}

/// Resolves when `rx_halt` or the global shutdown signal resolves.
///
/// # Panics
///
/// Panics if the sending half of `rx_halt` is dropped without a message.
pub async fn shutdown_signal(rx_halt: tokio::sync::oneshot::Receiver<Halted>) {
    let halt = async {
        match rx_halt.await {
            Ok(signal) => signal,
            Err(err) => panic!("failed to install stop signal: {err}"),
        }
    };

    tokio::select! {
        signal = halt => { info!("halt signal processed: {signal}") },
        () = global_shutdown_signal() => { info!("global shutdown signal processed") }
    }
}

/// Same as [`shutdown_signal`], but logs a message when it resolves.
pub async fn shutdown_signal_with_message(rx_halt: tokio::sync::oneshot::Receiver<Halted>, message: String) {
    shutdown_signal(rx_halt).await;

    info!("{message}");
}
