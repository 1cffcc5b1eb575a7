//! The line-oriented wire codec shared by the tracker and the peers.
//!
//! A *request* is a single line of the form `<command arg1 arg2 … argN>`,
//! optionally followed by a carriage return. The command token is
//! alphabetic and case-insensitive. Arguments are whitespace-separated
//! tokens; arguments that must carry spaces or special characters are
//! percent-encoded (see [`arg`]).
//!
//! Responses are one or more framed lines, from the plain
//! `<createtracker succ>` acknowledgements up to the multi-line
//! `<REP GET BEGIN>` … `<REP GET END md5>` record transfer (see
//! [`response`]).
//!
//! [`request`] parses request lines into a tagged [`Request`](request::Request)
//! variant; each server matches on the variants it serves and answers
//! `<EXCEPTION BadRequest>` for the rest.
pub mod arg;
pub mod line;
pub mod request;
pub mod response;
