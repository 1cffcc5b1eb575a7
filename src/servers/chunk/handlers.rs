//! Mapping of `GET SEG` requests onto file reads and protocol frames.
use std::io::SeekFrom;
use std::path::Path;

use shoal_configuration::MAX_CHUNK_SIZE;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tracing::debug;

use crate::protocol::request::{GetSegmentArgs, ParseError, Request};
use crate::protocol::response::{ExceptionKind, Response};

/// Dispatches one parsed (or unparsable) request against the peer folder.
pub async fn handle(request: Result<Request, ParseError>, peer_dir: &Path) -> Response {
    match request {
        Ok(Request::GetSegment(args)) => serve_segment(&args, peer_dir).await,
        Ok(_) => Response::exception(ExceptionKind::BadRequest, "peers only serve GET SEG"),
        Err(ParseError::RequestTooLong { max }) => Response::exception(
            ExceptionKind::RequestTooLong,
            &format!("Maximum message length is {max}"),
        ),
        Err(ParseError::BadRequest { reason }) => Response::exception(ExceptionKind::BadRequest, &reason),
    }
}

/// Reads up to `chunk_size` bytes of `<fname>` starting at `first_byte`.
///
/// Short reads are valid and indicate end-of-file; a zero `chunk_size`
/// yields an empty payload.
async fn serve_segment(args: &GetSegmentArgs, peer_dir: &Path) -> Response {
    let Ok(first_byte) = args.first_byte.parse::<u64>() else {
        return Response::exception(ExceptionKind::BadRequest, "start byte is not an integer");
    };
    let Ok(chunk_size) = args.chunk_size.parse::<u64>() else {
        return Response::exception(ExceptionKind::BadRequest, "chunk size is not an integer");
    };

    if args.filename.is_empty() || args.filename.contains('/') || args.filename.contains('\\') {
        return Response::exception(ExceptionKind::BadRequest, "not a hosted file name");
    }

    if chunk_size > MAX_CHUNK_SIZE {
        return Response::InvalidChunk;
    }

    // The log file is the marker that this peer actually hosts the file.
    if !peer_dir.join(format!("{}.log", args.filename)).is_file() {
        return Response::exception(
            ExceptionKind::NotHostingFile,
            &format!("no log file for {:?}", args.filename),
        );
    }

    match read_segment(&peer_dir.join(&args.filename), first_byte, chunk_size).await {
        Ok(payload) => {
            debug!(
                "serving bytes {}..{} of {}",
                first_byte,
                first_byte + payload.len() as u64,
                args.filename
            );
            Response::Got(payload)
        }
        Err(err) => {
            debug!("failed to read {}: {err}", args.filename);
            Response::exception(
                ExceptionKind::FileException,
                &format!("could not read file for {:?}", args.filename),
            )
        }
    }
}

async fn read_segment(path: &Path, first_byte: u64, chunk_size: u64) -> std::io::Result<Vec<u8>> {
    let mut file = tokio::fs::File::open(path).await?;

    file.seek(SeekFrom::Start(first_byte)).await?;

    let mut payload = vec![0u8; usize::try_from(chunk_size).expect("chunk size is bounded by MAX_CHUNK_SIZE")];
    let mut filled = 0;

    while filled < payload.len() {
        let n = file.read(&mut payload[filled..]).await?;
        if n == 0 {
            break;
        }
        filled += n;
    }

    payload.truncate(filled);

    Ok(payload)
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use crate::protocol::request;
    use crate::protocol::response::{ExceptionKind, Response};

    use super::handle;

    async fn host_file(dir: &Path, name: &str, content: &[u8]) {
        tokio::fs::write(dir.join(name), content).await.unwrap();
        tokio::fs::write(dir.join(format!("{name}.log")), format!("0:{}\n", content.len()))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn it_should_serve_a_chunk_from_the_middle_of_a_file() {
        let dir = tempfile::tempdir().unwrap();
        host_file(dir.path(), "x", b"0123456789").await;

        let response = handle(request::parse("<GET SEG x 2 4>"), dir.path()).await;

        assert_eq!(response, Response::Got(b"2345".to_vec()));
    }

    #[tokio::test]
    async fn it_should_serve_a_short_read_at_end_of_file() {
        let dir = tempfile::tempdir().unwrap();
        host_file(dir.path(), "x", b"0123456789").await;

        let response = handle(request::parse("<GET SEG x 8 1024>"), dir.path()).await;

        assert_eq!(response, Response::Got(b"89".to_vec()));
    }

    #[tokio::test]
    async fn it_should_serve_an_empty_payload_for_a_zero_chunk() {
        let dir = tempfile::tempdir().unwrap();
        host_file(dir.path(), "x", b"0123456789").await;

        let response = handle(request::parse("<GET SEG x 0 0>"), dir.path()).await;

        assert_eq!(response, Response::Got(Vec::new()));
    }

    #[tokio::test]
    async fn it_should_reject_an_oversized_chunk_request() {
        let dir = tempfile::tempdir().unwrap();
        host_file(dir.path(), "x", b"0123456789").await;

        let response = handle(request::parse("<GET SEG x 0 1025>"), dir.path()).await;

        assert_eq!(response, Response::InvalidChunk);
    }

    #[tokio::test]
    async fn it_should_refuse_files_it_does_not_host() {
        let dir = tempfile::tempdir().unwrap();
        tokio::fs::write(dir.path().join("x"), b"0123456789").await.unwrap();

        let response = handle(request::parse("<GET SEG x 0 4>"), dir.path()).await;

        assert!(matches!(
            response,
            Response::Exception {
                kind: ExceptionKind::NotHostingFile,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn it_should_answer_a_file_exception_when_the_file_is_gone() {
        let dir = tempfile::tempdir().unwrap();
        tokio::fs::write(dir.path().join("x.log"), "0:10\n").await.unwrap();

        let response = handle(request::parse("<GET SEG x 0 4>"), dir.path()).await;

        assert!(matches!(
            response,
            Response::Exception {
                kind: ExceptionKind::FileException,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn it_should_refuse_other_commands() {
        let dir = tempfile::tempdir().unwrap();

        let response = handle(request::parse("<REQ LIST>"), dir.path()).await;

        assert!(matches!(
            response,
            Response::Exception {
                kind: ExceptionKind::BadRequest,
                ..
            }
        ));
    }
}
