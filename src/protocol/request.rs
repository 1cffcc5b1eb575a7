//! Request line parsing.
//!
//! A request line looks like:
//!
//! ```text
//! <createtracker foo.bin 5 hello+there 5d41402abc4b2a76b9719d911017c592 127.0.0.1 11000>
//! ```
//!
//! The command token is matched case-insensitively. Arguments arrive
//! percent-encoded and are decoded here; numeric and address validation is
//! left to the handlers so that `createtracker`/`updatetracker` can answer
//! `fail` instead of `<EXCEPTION BadRequest>` for malformed values.
use thiserror::Error;

use super::arg;

/// A parsed request, tagged by command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    /// `createtracker fname fsize descrip md5 ip port`
    CreateTracker(CreateTrackerArgs),
    /// `updatetracker fname start end ip port`
    UpdateTracker(UpdateTrackerArgs),
    /// `REQ` — list every tracker record. Arguments are ignored.
    List,
    /// `GET <fname>.track` — stream a tracker record.
    GetTracker { track_name: String },
    /// `GET SEG fname start chunk_size` — read a byte range from a peer.
    GetSegment(GetSegmentArgs),
    /// `HELLO`
    Hello,
}

/// Raw arguments of a `createtracker` request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateTrackerArgs {
    pub filename: String,
    pub filesize: String,
    pub description: String,
    pub md5: String,
    pub ip: String,
    pub port: String,
}

/// Raw arguments of an `updatetracker` request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateTrackerArgs {
    pub filename: String,
    pub first_byte: String,
    pub last_byte: String,
    pub ip: String,
    pub port: String,
}

/// Raw arguments of a `GET SEG` request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GetSegmentArgs {
    pub filename: String,
    pub first_byte: String,
    pub chunk_size: String,
}

/// Errors raised while parsing a request line.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("bad request: {reason}")]
    BadRequest { reason: String },

    #[error("maximum message length is {max}")]
    RequestTooLong { max: usize },
}

impl ParseError {
    fn bad(reason: &str) -> Self {
        Self::BadRequest {
            reason: reason.to_owned(),
        }
    }
}

/// Parses one request line (without its trailing newline).
///
/// # Errors
///
/// Returns [`ParseError::BadRequest`] when the outer `<…>` framing does not
/// match, the command is unknown, or the argument count is wrong.
pub fn parse(line: &str) -> Result<Request, ParseError> {
    let (command, args) = split_command(line)?;

    match command.as_str() {
        "createtracker" => {
            let [filename, filesize, description, md5, ip, port] = take_args(args)?;
            Ok(Request::CreateTracker(CreateTrackerArgs {
                filename,
                filesize,
                description,
                md5,
                ip,
                port,
            }))
        }
        "updatetracker" => {
            let [filename, first_byte, last_byte, ip, port] = take_args(args)?;
            Ok(Request::UpdateTracker(UpdateTrackerArgs {
                filename,
                first_byte,
                last_byte,
                ip,
                port,
            }))
        }
        "req" => Ok(Request::List),
        "get" => parse_get(args),
        "hello" => {
            let [] = take_args(args)?;
            Ok(Request::Hello)
        }
        other => Err(ParseError::BadRequest {
            reason: format!("no such method {other:?}"),
        }),
    }
}

/// Splits the `<command args…>` framing into the lowercased command token
/// and the decoded argument tokens.
fn split_command(line: &str) -> Result<(String, Vec<String>), ParseError> {
    let line = line.strip_suffix('\r').unwrap_or(line);

    let inner = line
        .strip_prefix('<')
        .and_then(|rest| rest.strip_suffix('>'))
        .ok_or_else(|| ParseError::bad("failed to parse request"))?;

    let mut tokens = inner.split_ascii_whitespace();

    let command = tokens.next().ok_or_else(|| ParseError::bad("empty request"))?;
    if command.is_empty() || !command.bytes().all(|b| b.is_ascii_alphabetic()) {
        return Err(ParseError::bad("failed to parse request"));
    }

    let mut args = Vec::new();
    for token in tokens {
        if token.contains('>') {
            return Err(ParseError::bad("failed to parse request"));
        }
        args.push(arg::decode(token).map_err(|_| ParseError::bad("undecodable argument"))?);
    }

    Ok((command.to_ascii_lowercase(), args))
}

fn parse_get(args: Vec<String>) -> Result<Request, ParseError> {
    match args.len() {
        1 => {
            let mut args = args;
            Ok(Request::GetTracker {
                track_name: args.remove(0),
            })
        }
        4 => {
            let mut args = args.into_iter();
            let seg = args.next().expect("length checked above");
            if seg != "SEG" {
                return Err(ParseError::bad("'SEG' expected"));
            }
            Ok(Request::GetSegment(GetSegmentArgs {
                filename: args.next().expect("length checked above"),
                first_byte: args.next().expect("length checked above"),
                chunk_size: args.next().expect("length checked above"),
            }))
        }
        n => Err(ParseError::BadRequest {
            reason: format!("GET takes 1 or 4 arguments, got {n}"),
        }),
    }
}

fn take_args<const N: usize>(args: Vec<String>) -> Result<[String; N], ParseError> {
    let got = args.len();
    args.try_into().map_err(|_| ParseError::BadRequest {
        reason: format!("expected {N} arguments, got {got}"),
    })
}
