//! The peer's interactive console: a line-based command dispatcher.
//!
//! Commands mirror the protocol surface: `REQ`, `gettracker`,
//! `createtracker`, `updatetracker` and a raw `GET` against another peer,
//! plus `help` and `quit`. The tracker address can be overridden per
//! command with `-host H` and `-port P`; quoted arguments keep embedded
//! spaces. Errors print a message through the sink and never terminate the
//! console.
use std::net::{Ipv4Addr, SocketAddrV4};

use shoal_configuration::ClientConfig;
use tracing::debug;

use crate::core::record::TRACK_SUFFIX;
use crate::peer::client::{self, TrackerClient};
use crate::peer::downloader::cache::digest_file;
use crate::peer::downloader::progress::ProgressLog;
use crate::peer::downloader::worker::LOG_SUFFIX;
use crate::peer::downloader::Event;
use crate::peer::{MessageSink, Peer};
use crate::protocol::response::AckStatus;

/// What the caller should do after one dispatched line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Continue,
    Quit,
}

const USAGE: &[(&str, &str)] = &[
    ("help [cmd]", "display this help page"),
    ("REQ [-host H] [-port P]", "request the list of tracker records"),
    ("gettracker fname [-host H] [-port P]", "retrieve a tracker record"),
    ("createtracker fname descrip [-host H] [-port P]", "create a tracker record"),
    ("updatetracker fname start end [-host H] [-port P]", "update a tracker record"),
    ("GET fname start chunk_size host port", "retrieve a segment from a peer"),
    ("quit", "exit the program"),
];

/// Parses and executes one console line.
pub async fn dispatch(line: &str, peer: &Peer, config: &ClientConfig, sink: &MessageSink) -> Outcome {
    let tokens = tokenize(line);

    let Some((command, rest)) = tokens.split_first() else {
        return Outcome::Continue;
    };

    match command.to_ascii_lowercase().as_str() {
        "quit" | "exit" => return Outcome::Quit,
        "help" => help(rest, sink),
        "req" => req(rest, peer, config, sink).await,
        "gettracker" => gettracker(rest, peer, config, sink).await,
        "createtracker" => createtracker(rest, peer, config, sink).await,
        "updatetracker" => updatetracker(rest, peer, config, sink).await,
        "get" => get(rest, sink).await,
        other => say(sink, &format!("Unknown command '{other}'. Try 'help'.")),
    }

    Outcome::Continue
}

fn say(sink: &MessageSink, message: &str) {
    drop(sink.send(message.to_owned()));
}

fn help(args: &[String], sink: &MessageSink) {
    if let Some(wanted) = args.first() {
        match USAGE.iter().find(|(usage, _)| usage.starts_with(wanted.as_str())) {
            Some((usage, description)) => say(sink, &format!("{usage}\n    {description}")),
            None => say(sink, &format!("Unknown command '{wanted}'")),
        }
        return;
    }

    for (usage, description) in USAGE {
        say(sink, &format!("{usage:<50} {description}"));
    }
}

async fn req(args: &[String], peer: &Peer, config: &ClientConfig, sink: &MessageSink) {
    let Some((positional, client)) = with_overrides(args, peer, config, sink) else {
        return;
    };
    if !positional.is_empty() {
        say(sink, "usage: REQ [-host H] [-port P]");
        return;
    }

    say(
        sink,
        &format!("Requesting list of tracker records from {}", client.tracker_addr()),
    );

    match client.list().await {
        Ok(entries) => {
            say(sink, &format!("{} tracker record(s)", entries.len()));
            for (index, entry) in entries.iter().enumerate() {
                say(sink, &format!("{index} {} {} {}", entry.filename, entry.filesize, entry.md5));
            }
        }
        Err(err) => say(sink, &format!("REQ failed: {err}")),
    }
}

async fn gettracker(args: &[String], peer: &Peer, config: &ClientConfig, sink: &MessageSink) {
    let Some((positional, client)) = with_overrides(args, peer, config, sink) else {
        return;
    };
    let [filename] = positional.as_slice() else {
        say(sink, "usage: gettracker fname [-host H] [-port P]");
        return;
    };

    match client.fetch_record(filename).await {
        Ok(body) => {
            let track_name = format!("{filename}{TRACK_SUFFIX}");
            if let Err(err) = tokio::fs::write(config.peer_dir.join(&track_name), &body).await {
                say(sink, &format!("Unable to store {track_name}: {err}"));
                return;
            }

            say(sink, &format!("Stored {track_name}"));

            // Wake the downloader; it decides whether a worker is needed.
            drop(peer.events().send(Event::NewTracker(track_name)).await);
        }
        Err(err) => say(sink, &format!("gettracker failed: {err}")),
    }
}

async fn createtracker(args: &[String], peer: &Peer, config: &ClientConfig, sink: &MessageSink) {
    let Some((positional, client)) = with_overrides(args, peer, config, sink) else {
        return;
    };
    let [filename, description] = positional.as_slice() else {
        say(sink, "usage: createtracker fname descrip [-host H] [-port P]");
        return;
    };

    let path = config.peer_dir.join(filename);

    let filesize = match tokio::fs::metadata(&path).await {
        Ok(metadata) if metadata.len() > 0 => metadata.len(),
        Ok(_) => {
            say(sink, &format!("Unable to share '{filename}': the file is empty"));
            return;
        }
        Err(err) => {
            say(sink, &format!("Unable to find file '{filename}': {err}"));
            return;
        }
    };

    let md5 = match digest_file(&path).await {
        Ok(digest) => digest,
        Err(err) => {
            say(sink, &format!("Unable to hash '{filename}': {err}"));
            return;
        }
    };

    // A full log file marks the whole file as locally available, which is
    // what makes the chunk server serve it and the refresher report it.
    let mut log = ProgressLog::default();
    log.record_write(0, filesize);
    if let Err(err) = tokio::fs::write(config.peer_dir.join(format!("{filename}{LOG_SUFFIX}")), log.render()).await {
        say(sink, &format!("Unable to write the log file for '{filename}': {err}"));
        return;
    }

    match client.create_tracker(filename, filesize, description, &md5).await {
        Ok(AckStatus::Succ) => say(sink, &format!("Created a tracker record for '{filename}'")),
        Ok(AckStatus::Ferr) => say(sink, &format!("A tracker record for '{filename}' already exists")),
        Ok(AckStatus::Fail) => say(sink, &format!("The tracker refused the record for '{filename}'")),
        Err(err) => say(sink, &format!("createtracker failed: {err}")),
    }
}

async fn updatetracker(args: &[String], peer: &Peer, config: &ClientConfig, sink: &MessageSink) {
    let Some((positional, client)) = with_overrides(args, peer, config, sink) else {
        return;
    };
    let [filename, start, end] = positional.as_slice() else {
        say(sink, "usage: updatetracker fname start end [-host H] [-port P]");
        return;
    };

    let (Ok(first_byte), Ok(last_byte)) = (start.parse::<u64>(), end.parse::<u64>()) else {
        say(sink, "start and end must be byte offsets");
        return;
    };

    match client.update_tracker(filename, first_byte, last_byte).await {
        Ok(AckStatus::Succ) => say(sink, "Tracker update successful"),
        Ok(AckStatus::Ferr) => say(sink, &format!("No tracker record for '{filename}'")),
        Ok(AckStatus::Fail) => say(sink, "The tracker refused the update"),
        Err(err) => say(sink, &format!("updatetracker failed: {err}")),
    }
}

async fn get(args: &[String], sink: &MessageSink) {
    let [filename, start, chunk_size, host, port] = args else {
        say(sink, "usage: GET fname start chunk_size host port");
        return;
    };

    let (Ok(first_byte), Ok(chunk_size)) = (start.parse::<u64>(), chunk_size.parse::<u64>()) else {
        say(sink, "start and chunk_size must be integers");
        return;
    };
    let (Ok(host), Ok(port)) = (host.parse::<Ipv4Addr>(), port.parse::<u16>()) else {
        say(sink, "host must be an IPv4 address and port an integer");
        return;
    };

    match client::fetch_segment(SocketAddrV4::new(host, port), filename, first_byte, chunk_size).await {
        Ok(payload) => say(
            sink,
            &format!("Received bytes {first_byte}..{} of '{filename}'", first_byte + payload.len() as u64),
        ),
        Err(err) => say(sink, &format!("GET failed: {err}")),
    }
}

/// Extracts `-host`/`-port` overrides and builds the client to use.
///
/// Returns `None` (after printing a message) when an override is
/// malformed.
fn with_overrides(
    args: &[String],
    peer: &Peer,
    config: &ClientConfig,
    sink: &MessageSink,
) -> Option<(Vec<String>, TrackerClient)> {
    let mut positional = Vec::new();
    let mut host: Option<Ipv4Addr> = None;
    let mut port: Option<u16> = None;

    let mut tokens = args.iter();
    while let Some(token) = tokens.next() {
        match token.as_str() {
            "-host" => match tokens.next().map(|value| value.parse()) {
                Some(Ok(value)) => host = Some(value),
                _ => {
                    say(sink, "-host takes an IPv4 address");
                    return None;
                }
            },
            "-port" => match tokens.next().map(|value| value.parse()) {
                Some(Ok(value)) => port = Some(value),
                _ => {
                    say(sink, "-port takes a port number");
                    return None;
                }
            },
            _ => positional.push(token.clone()),
        }
    }

    let addr = SocketAddrV4::new(host.unwrap_or(config.server_ip), port.unwrap_or(config.server_port));
    let client = if addr == peer.client().tracker_addr() {
        peer.client()
    } else {
        debug!("using tracker override {addr}");
        TrackerClient::new(addr, peer.client().identity())
    };

    Some((positional, client))
}

/// Splits a command line into tokens, giving priority to quotes so that
/// arguments may carry spaces.
fn tokenize(line: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut quote: Option<char> = None;

    for c in line.trim().chars() {
        match quote {
            Some(q) if c == q => quote = None,
            Some(_) => current.push(c),
            None if c == '\'' || c == '"' => quote = Some(c),
            None if c.is_whitespace() => {
                if !current.is_empty() {
                    tokens.push(std::mem::take(&mut current));
                }
            }
            None => current.push(c),
        }
    }

    if !current.is_empty() {
        tokens.push(current);
    }

    tokens
}
