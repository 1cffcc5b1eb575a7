//! Bounded reading of request lines.
use shoal_configuration::MAX_MESSAGE_LENGTH;
use tokio::io::{AsyncRead, AsyncReadExt};

use super::request::ParseError;

/// Reads one request line from `reader`: up to the first newline or the end
/// of the stream, whichever comes first. The trailing newline is not part of
/// the returned line (`request` handles an optional `\r`).
///
/// # Errors
///
/// Returns [`ParseError::RequestTooLong`] when the line exceeds
/// [`MAX_MESSAGE_LENGTH`] bytes, and [`ParseError::BadRequest`] when the
/// stream fails or the line is not valid UTF-8.
pub async fn read_request_line<R>(reader: &mut R) -> Result<String, ParseError>
where
    R: AsyncRead + Unpin,
{
    let mut raw = Vec::with_capacity(128);
    let mut byte = [0u8; 1];

    while raw.len() <= MAX_MESSAGE_LENGTH {
        match reader.read(&mut byte).await {
            Ok(0) => break,
            Ok(_) => {
                if byte[0] == b'\n' {
                    break;
                }
                raw.push(byte[0]);
            }
            Err(_) => {
                return Err(ParseError::BadRequest {
                    reason: "failed to read request".to_owned(),
                })
            }
        }
    }

    if raw.len() > MAX_MESSAGE_LENGTH {
        return Err(ParseError::RequestTooLong {
            max: MAX_MESSAGE_LENGTH,
        });
    }

    String::from_utf8(raw).map_err(|_| ParseError::BadRequest {
        reason: "request is not valid utf-8".to_owned(),
    })
}

#[cfg(test)]
mod tests {
    use shoal_configuration::MAX_MESSAGE_LENGTH;

    use super::read_request_line;
    use crate::protocol::request::ParseError;

    #[tokio::test]
    async fn it_should_read_a_line_up_to_the_newline() {
        let mut input = "<HELLO>\nleftovers".as_bytes();

        assert_eq!(read_request_line(&mut input).await.unwrap(), "<HELLO>");
    }

    #[tokio::test]
    async fn it_should_read_a_line_terminated_by_end_of_stream() {
        let mut input = "<HELLO>".as_bytes();

        assert_eq!(read_request_line(&mut input).await.unwrap(), "<HELLO>");
    }

    #[tokio::test]
    async fn it_should_reject_an_oversized_line() {
        let oversized = format!("<req {}>", "x".repeat(MAX_MESSAGE_LENGTH));
        let mut input = oversized.as_bytes();

        let err = read_request_line(&mut input).await.unwrap_err();

        assert!(matches!(err, ParseError::RequestTooLong { .. }));
    }
}
