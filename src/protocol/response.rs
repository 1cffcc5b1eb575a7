//! Response frames: serialisation for the servers, parsing for the peer.
//!
//! Every frame the protocol defines is a [`Response`] variant. Servers build
//! a variant and ship [`Response::to_wire`]; the peer's client reads a whole
//! reply and recovers the variant with [`Response::parse`]. The two are
//! inverses for every frame.
use std::fmt::Write as _;
use std::str::FromStr;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use shoal_primitives::md5::Md5Digest;
use thiserror::Error;

use super::arg;

/// The command an acknowledgement echoes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckCommand {
    CreateTracker,
    UpdateTracker,
}

impl AckCommand {
    fn as_str(self) -> &'static str {
        match self {
            Self::CreateTracker => "createtracker",
            Self::UpdateTracker => "updatetracker",
        }
    }
}

/// Outcome of a `createtracker` or `updatetracker` request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckStatus {
    /// The request was applied.
    Succ,
    /// The record existed on create, or was missing on update.
    Ferr,
    /// The request was malformed or could not be applied.
    Fail,
}

impl AckStatus {
    fn as_str(self) -> &'static str {
        match self {
            Self::Succ => "succ",
            Self::Ferr => "ferr",
            Self::Fail => "fail",
        }
    }
}

/// The `Kind` tag of an `<EXCEPTION Kind>` frame.
#[derive(Debug, Clone, PartialEq, Eq, derive_more::Display)]
pub enum ExceptionKind {
    #[display("BadRequest")]
    BadRequest,
    #[display("RequestTooLong")]
    RequestTooLong,
    #[display("FileNotFound")]
    FileNotFound,
    #[display("NotHostingFile")]
    NotHostingFile,
    #[display("FileException")]
    FileException,
    #[display("ConnectionLost")]
    ConnectionLost,
    #[display("{_0}")]
    Other(String),
}

impl From<&str> for ExceptionKind {
    fn from(tag: &str) -> Self {
        match tag {
            "BadRequest" => Self::BadRequest,
            "RequestTooLong" => Self::RequestTooLong,
            "FileNotFound" => Self::FileNotFound,
            "NotHostingFile" => Self::NotHostingFile,
            "FileException" => Self::FileException,
            "ConnectionLost" => Self::ConnectionLost,
            other => Self::Other(other.to_owned()),
        }
    }
}

/// One row of a `<REP LIST …>` response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListEntry {
    pub filename: String,
    pub filesize: u64,
    pub md5: Md5Digest,
}

/// A response, tagged by frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    /// `<createtracker succ>`, `<updatetracker ferr>`, …
    Ack { command: AckCommand, status: AckStatus },
    /// `<REP LIST N>` + one `<i fname fsize md5>` row per record + `<REP LIST END>`.
    List(Vec<ListEntry>),
    /// `<REP GET BEGIN>` + the record text + `<REP GET END md5>`.
    TrackerBody { body: String, md5: Md5Digest },
    /// `<GET GOT n>` + base64 of the payload.
    Got(Vec<u8>),
    /// `<GET invalid>` — the requested chunk size is not supported.
    InvalidChunk,
    /// `<HELLO>`
    Hello,
    /// `<EXCEPTION Kind>` + optional encoded info line + `<EXCEPTION END>`.
    Exception {
        kind: ExceptionKind,
        info: Option<String>,
    },
}

/// Error returned when a reply cannot be recognised as any frame.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("malformed response: {reason}")]
pub struct ResponseParseError {
    pub reason: String,
}

impl ResponseParseError {
    fn new(reason: &str) -> Self {
        Self {
            reason: reason.to_owned(),
        }
    }
}

impl Response {
    /// Convenience constructor for an exception frame.
    #[must_use]
    pub fn exception(kind: ExceptionKind, info: &str) -> Self {
        let info = if info.is_empty() { None } else { Some(info.to_owned()) };
        Self::Exception { kind, info }
    }

    /// Serialises the response for the wire.
    #[must_use]
    pub fn to_wire(&self) -> String {
        let mut out = String::new();

        match self {
            Self::Ack { command, status } => {
                write!(out, "<{} {}>", command.as_str(), status.as_str()).expect("writing to a string cannot fail");
            }
            Self::List(entries) => {
                writeln!(out, "<REP LIST {}>", entries.len()).expect("writing to a string cannot fail");
                for (index, entry) in entries.iter().enumerate() {
                    writeln!(
                        out,
                        "<{index} {} {} {}>",
                        arg::encode(&entry.filename),
                        entry.filesize,
                        entry.md5
                    )
                    .expect("writing to a string cannot fail");
                }
                out.push_str("<REP LIST END>\n");
            }
            Self::TrackerBody { body, md5 } => {
                out.push_str("<REP GET BEGIN>\n");
                out.push_str(body);
                if !body.ends_with('\n') {
                    out.push('\n');
                }
                writeln!(out, "<REP GET END {md5}>").expect("writing to a string cannot fail");
            }
            Self::Got(payload) => {
                writeln!(out, "<GET GOT {}>", payload.len()).expect("writing to a string cannot fail");
                out.push_str(&BASE64.encode(payload));
            }
            Self::InvalidChunk => out.push_str("<GET invalid>\n"),
            Self::Hello => out.push_str("<HELLO>\n"),
            Self::Exception { kind, info } => {
                writeln!(out, "<EXCEPTION {kind}>").expect("writing to a string cannot fail");
                if let Some(info) = info {
                    writeln!(out, "{}", arg::encode(info)).expect("writing to a string cannot fail");
                }
                out.push_str("<EXCEPTION END>\n");
            }
        }

        out
    }

    /// Parses a complete reply back into its frame.
    ///
    /// # Errors
    ///
    /// Returns a [`ResponseParseError`] when the reply matches no known
    /// frame or a frame is internally inconsistent.
    pub fn parse(text: &str) -> Result<Self, ResponseParseError> {
        let mut lines = text.lines();
        let first = lines.next().ok_or_else(|| ResponseParseError::new("empty response"))?;
        let first = first.trim_end_matches('\r');

        if let Some(rest) = strip_frame(first, "createtracker") {
            return parse_ack(AckCommand::CreateTracker, rest);
        }
        if let Some(rest) = strip_frame(first, "updatetracker") {
            return parse_ack(AckCommand::UpdateTracker, rest);
        }
        if first == "<HELLO>" {
            return Ok(Self::Hello);
        }
        if first == "<GET invalid>" {
            return Ok(Self::InvalidChunk);
        }
        if let Some(rest) = strip_frame(first, "GET GOT") {
            return parse_got(rest, lines);
        }
        if let Some(rest) = strip_frame(first, "REP LIST") {
            return parse_list(rest, lines);
        }
        if first == "<REP GET BEGIN>" {
            return parse_tracker_body(lines);
        }
        if let Some(rest) = strip_frame(first, "EXCEPTION") {
            return parse_exception(rest, lines);
        }

        Err(ResponseParseError::new("unrecognised frame"))
    }
}

/// Strips `<prefix ` and the closing `>` off a frame line.
fn strip_frame<'a>(line: &'a str, prefix: &str) -> Option<&'a str> {
    line.strip_prefix('<')
        .and_then(|rest| rest.strip_suffix('>'))
        .and_then(|inner| inner.strip_prefix(prefix))
        .and_then(|rest| rest.strip_prefix(' '))
}

fn parse_ack(command: AckCommand, status: &str) -> Result<Response, ResponseParseError> {
    let status = match status {
        "succ" => AckStatus::Succ,
        "ferr" => AckStatus::Ferr,
        "fail" => AckStatus::Fail,
        other => return Err(ResponseParseError::new(&format!("unknown ack status {other:?}"))),
    };

    Ok(Response::Ack { command, status })
}

fn parse_got<'a>(count: &str, lines: impl Iterator<Item = &'a str>) -> Result<Response, ResponseParseError> {
    let count: usize = count
        .parse()
        .map_err(|_| ResponseParseError::new("non-numeric payload length"))?;

    let encoded: String = lines.map(str::trim).collect();
    let payload = BASE64
        .decode(encoded.as_bytes())
        .map_err(|_| ResponseParseError::new("payload is not valid base64"))?;

    if payload.len() != count {
        return Err(ResponseParseError::new("payload length does not match the GOT count"));
    }

    Ok(Response::Got(payload))
}

fn parse_list<'a>(count: &str, lines: impl Iterator<Item = &'a str>) -> Result<Response, ResponseParseError> {
    let count: usize = count
        .parse()
        .map_err(|_| ResponseParseError::new("non-numeric list length"))?;

    let mut entries = Vec::with_capacity(count);
    let mut terminated = false;

    for line in lines {
        let line = line.trim_end_matches('\r');
        if line == "<REP LIST END>" {
            terminated = true;
            break;
        }

        let inner = line
            .strip_prefix('<')
            .and_then(|rest| rest.strip_suffix('>'))
            .ok_or_else(|| ResponseParseError::new("unframed list row"))?;

        let mut tokens = inner.split_ascii_whitespace();
        let _index = tokens.next().ok_or_else(|| ResponseParseError::new("empty list row"))?;
        let filename = tokens.next().ok_or_else(|| ResponseParseError::new("list row without a filename"))?;
        let filesize = tokens
            .next()
            .and_then(|t| t.parse::<u64>().ok())
            .ok_or_else(|| ResponseParseError::new("list row without a file size"))?;
        let md5 = tokens
            .next()
            .and_then(|t| Md5Digest::from_str(t).ok())
            .ok_or_else(|| ResponseParseError::new("list row without a digest"))?;

        entries.push(ListEntry {
            filename: arg::decode(filename).map_err(|_| ResponseParseError::new("undecodable filename"))?,
            filesize,
            md5,
        });
    }

    if !terminated {
        return Err(ResponseParseError::new("list response is not terminated"));
    }
    if entries.len() != count {
        return Err(ResponseParseError::new("list length does not match the row count"));
    }

    Ok(Response::List(entries))
}

fn parse_tracker_body<'a>(lines: impl Iterator<Item = &'a str>) -> Result<Response, ResponseParseError> {
    let mut body = String::new();

    for line in lines {
        let line = line.trim_end_matches('\r');
        if let Some(md5) = strip_frame(line, "REP GET END") {
            let md5 = Md5Digest::from_str(md5).map_err(|_| ResponseParseError::new("invalid digest in END frame"))?;
            return Ok(Response::TrackerBody { body, md5 });
        }

        body.push_str(line);
        body.push('\n');
    }

    Err(ResponseParseError::new("record transfer is not terminated"))
}

fn parse_exception<'a>(kind: &str, lines: impl Iterator<Item = &'a str>) -> Result<Response, ResponseParseError> {
    let mut info = None;

    for line in lines {
        let line = line.trim_end_matches('\r');
        if line == "<EXCEPTION END>" {
            return Ok(Response::Exception {
                kind: ExceptionKind::from(kind),
                info,
            });
        }
        info = Some(arg::decode(line).map_err(|_| ResponseParseError::new("undecodable exception info"))?);
    }

    Err(ResponseParseError::new("exception frame is not terminated"))
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use shoal_primitives::md5::Md5Digest;

    use super::{AckCommand, AckStatus, ExceptionKind, ListEntry, Response};

    fn digest() -> Md5Digest {
        Md5Digest::from_str("5d41402abc4b2a76b9719d911017c592").unwrap()
    }

    #[test]
    fn it_should_serialise_acknowledgements() {
        let response = Response::Ack {
            command: AckCommand::CreateTracker,
            status: AckStatus::Succ,
        };

        assert_eq!(response.to_wire(), "<createtracker succ>");
    }

    #[test]
    fn it_should_serialise_a_list_with_contiguous_indices() {
        let response = Response::List(vec![
            ListEntry {
                filename: "foo.bin".to_owned(),
                filesize: 5,
                md5: digest(),
            },
            ListEntry {
                filename: "my file".to_owned(),
                filesize: 9,
                md5: digest(),
            },
        ]);

        assert_eq!(
            response.to_wire(),
            "<REP LIST 2>\n\
             <0 foo.bin 5 5d41402abc4b2a76b9719d911017c592>\n\
             <1 my+file 9 5d41402abc4b2a76b9719d911017c592>\n\
             <REP LIST END>\n"
        );
    }

    #[test]
    fn it_should_serialise_a_zero_length_payload() {
        assert_eq!(Response::Got(Vec::new()).to_wire(), "<GET GOT 0>\n");
    }

    #[test]
    fn it_should_round_trip_every_frame() {
        let frames = vec![
            Response::Ack {
                command: AckCommand::UpdateTracker,
                status: AckStatus::Ferr,
            },
            Response::List(vec![ListEntry {
                filename: "foo.bin".to_owned(),
                filesize: 5,
                md5: digest(),
            }]),
            Response::List(Vec::new()),
            Response::TrackerBody {
                body: "Filename: foo.bin\nFilesize: 5\nDescription: hello\nMD5: 5d41402abc4b2a76b9719d911017c592\n"
                    .to_owned(),
                md5: digest(),
            },
            Response::Got(b"hello".to_vec()),
            Response::Got(Vec::new()),
            Response::InvalidChunk,
            Response::Hello,
            Response::exception(ExceptionKind::FileNotFound, "no such record"),
            Response::exception(ExceptionKind::BadRequest, ""),
        ];

        for frame in frames {
            assert_eq!(Response::parse(&frame.to_wire()).unwrap(), frame, "frame: {frame:?}");
        }
    }

    #[test]
    fn it_should_reject_a_payload_that_contradicts_the_got_count() {
        assert!(Response::parse("<GET GOT 99>\naGVsbG8=").is_err());
    }

    #[test]
    fn it_should_reject_an_unterminated_record_transfer() {
        assert!(Response::parse("<REP GET BEGIN>\nFilename: x\n").is_err());
    }

    #[test]
    fn it_should_keep_unknown_exception_kinds() {
        let parsed = Response::parse("<EXCEPTION SomethingOdd>\n<EXCEPTION END>\n").unwrap();

        assert_eq!(
            parsed,
            Response::Exception {
                kind: ExceptionKind::Other("SomethingOdd".to_owned()),
                info: None,
            }
        );
    }
}
