//! Percent-coding of request and response argument tokens.
//!
//! Tokens on the wire may not contain spaces or `>`. Arguments that need
//! them are encoded the `application/x-www-form-urlencoded` way: a space
//! becomes `+`, any other byte outside `[0-9A-Za-z*\-._]` becomes `%HH`.
//! Decoding reverses both steps, so `decode(encode(x)) == x` for any
//! argument.
use std::borrow::Cow;

use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use thiserror::Error;

/// Bytes escaped by the form encoding. Everything non-alphanumeric except
/// the four characters the form encoding leaves bare.
const FORM: &AsciiSet = &NON_ALPHANUMERIC.remove(b'*').remove(b'-').remove(b'.').remove(b'_');

/// Error returned when a token does not decode to valid UTF-8.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("argument is not valid utf-8 after percent-decoding")]
pub struct DecodeError;

/// Encodes an argument for the wire.
#[must_use]
pub fn encode(arg: &str) -> String {
    // A literal space encodes to `%20` first, then folds to `+`. A literal
    // `%` was already escaped to `%25`, so the fold cannot clash.
    utf8_percent_encode(arg, FORM).to_string().replace("%20", "+")
}

/// Decodes an argument received from the wire.
///
/// Stray `%` sequences that do not form valid escapes are passed through
/// unchanged, matching the lenient form decoders on the other side of the
/// wire.
///
/// # Errors
///
/// Returns a [`DecodeError`] if the decoded bytes are not valid UTF-8.
pub fn decode(arg: &str) -> Result<String, DecodeError> {
    let spaced = arg.replace('+', " ");

    match percent_decode_str(&spaced).decode_utf8() {
        Ok(Cow::Borrowed(_)) => Ok(spaced),
        Ok(Cow::Owned(decoded)) => Ok(decoded),
        Err(_) => Err(DecodeError),
    }
}
