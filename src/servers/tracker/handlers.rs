//! Mapping of tracker requests onto record store operations and protocol
//! frames.
use tracing::error;

use crate::core::error::Error;
use crate::core::Tracker;
use crate::protocol::request::{ParseError, Request};
use crate::protocol::response::{AckCommand, AckStatus, ExceptionKind, ListEntry, Response};

/// Dispatches one parsed (or unparsable) request against the record store.
///
/// A handler produces exactly one response; a request that already failed
/// with `fail`/`ferr` never grows an additional `<EXCEPTION>` frame.
pub async fn handle(request: Result<Request, ParseError>, tracker: &Tracker) -> Response {
    match request {
        Ok(Request::CreateTracker(args)) => {
            let status = match tracker.create(&args).await {
                Ok(()) => AckStatus::Succ,
                Err(Error::AlreadyExists { .. }) => AckStatus::Ferr,
                Err(err) => {
                    error!("createtracker failed: {err}");
                    AckStatus::Fail
                }
            };
            Response::Ack {
                command: AckCommand::CreateTracker,
                status,
            }
        }
        Ok(Request::UpdateTracker(args)) => {
            let status = match tracker.update(&args).await {
                Ok(()) => AckStatus::Succ,
                Err(Error::NotFound { .. }) => AckStatus::Ferr,
                Err(err) => {
                    error!("updatetracker failed: {err}");
                    AckStatus::Fail
                }
            };
            Response::Ack {
                command: AckCommand::UpdateTracker,
                status,
            }
        }
        Ok(Request::List) => match tracker.list().await {
            Ok(summaries) => Response::List(
                summaries
                    .into_iter()
                    .map(|summary| ListEntry {
                        filename: summary.filename,
                        filesize: summary.filesize,
                        md5: summary.md5,
                    })
                    .collect(),
            ),
            Err(err) => {
                error!("REQ failed: {err}");
                Response::exception(ExceptionKind::FileException, "failed to list tracker records")
            }
        },
        Ok(Request::GetTracker { track_name }) => match tracker.fetch(&track_name).await {
            Ok(fetched) => Response::TrackerBody {
                body: fetched.body,
                md5: fetched.md5,
            },
            Err(Error::NotFound { track_name }) => Response::exception(ExceptionKind::FileNotFound, &track_name),
            Err(Error::InvalidArgument { .. }) => {
                Response::exception(ExceptionKind::BadRequest, "not a tracker record name")
            }
            Err(err) => {
                error!("GET failed: {err}");
                Response::exception(ExceptionKind::FileException, "failed to load the tracker record")
            }
        },
        Ok(Request::Hello) => Response::Hello,
        Ok(Request::GetSegment(_)) => {
            Response::exception(ExceptionKind::BadRequest, "GET SEG is served by peers, not the tracker")
        }
        Err(ParseError::RequestTooLong { max }) => Response::exception(
            ExceptionKind::RequestTooLong,
            &format!("Maximum message length is {max}"),
        ),
        Err(ParseError::BadRequest { reason }) => Response::exception(ExceptionKind::BadRequest, &reason),
    }
}
