//! The `shoal-peer` binary: chunk server, downloader, refresher and the
//! interactive console.
use std::path::PathBuf;

use anyhow::Context as _;
use clap::Parser;
use shoal::console::{self, Outcome};
use shoal::peer::Peer;
use shoal::servers::signals::global_shutdown_signal;
use shoal::bootstrap;
use shoal_configuration::ClientConfig;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

#[derive(Parser)]
#[command(name = "shoal-peer", about = "A file-sharing peer", version)]
struct Args {
    /// Path to the client configuration file.
    #[arg(long, env = "SHOAL_PEER_CONFIG", default_value = "client.cfg")]
    config: PathBuf,

    /// Log level: off, error, warn, info, debug or trace.
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    bootstrap::logging::setup(&args.log_level);

    let config = ClientConfig::load(&args.config).context("configuration failure")?;

    // The message sink: every user-visible line funnels through this
    // channel and is printed by one task, keeping concurrent jobs from
    // interleaving partial lines.
    let (sink, mut messages) = mpsc::unbounded_channel::<String>();
    let printer = tokio::spawn(async move {
        while let Some(line) = messages.recv().await {
            println!("{line}");
        }
    });

    let peer = Peer::start(&config, sink.clone()).await.context("failed to start the peer")?;

    drop(sink.send(format!("Listening on port {}. Type 'help' for commands.", peer.chunk_port())));

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let shutdown = global_shutdown_signal();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            () = &mut shutdown => break,
            line = lines.next_line() => match line {
                Ok(Some(line)) => {
                    if console::dispatch(&line, &peer, &config, &sink).await == Outcome::Quit {
                        break;
                    }
                }
                Ok(None) | Err(_) => break,
            }
        }
    }

    peer.stop().await;

    drop(sink);
    drop(printer.await);

    Ok(())
}
