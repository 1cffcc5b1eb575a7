//! MD5 digest newtype.
//!
//! Tracker records carry the MD5 of the canonical file as a 32 character
//! lowercase hex string. The newtype keeps the digest as raw bytes and takes
//! care of the hex conversion in both directions:
//!
//! ```rust
//! use std::str::FromStr;
//! use shoal_primitives::md5::Md5Digest;
//!
//! let digest = Md5Digest::from_str("5d41402abc4b2a76b9719d911017c592").unwrap();
//!
//! assert_eq!(digest.to_string(), "5d41402abc4b2a76b9719d911017c592");
//! ```
//!
//! Parsing is case-insensitive; rendering is always lowercase.
use thiserror::Error;

/// Number of raw bytes in an MD5 digest.
pub const MD5_BYTES_LEN: usize = 16;

/// Number of characters in the hex form of an MD5 digest.
pub const MD5_HEX_LEN: usize = 32;

/// An MD5 digest, as carried by tracker records.
#[derive(PartialEq, Eq, Hash, Clone, Copy, Debug, PartialOrd, Ord)]
pub struct Md5Digest {
    data: [u8; MD5_BYTES_LEN],
}

/// Error returned when a string is not a valid MD5 hex digest.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DigestParseError {
    #[error("expected {MD5_HEX_LEN} hex characters, got {len}")]
    InvalidLength { len: usize },
    #[error("invalid hex character")]
    InvalidHex,
}

impl Md5Digest {
    /// Builds a digest from its raw bytes.
    #[must_use]
    pub fn from_bytes(data: [u8; MD5_BYTES_LEN]) -> Self {
        Self { data }
    }

    /// Returns the raw digest bytes.
    #[must_use]
    pub fn bytes(&self) -> [u8; MD5_BYTES_LEN] {
        self.data
    }
}

impl std::fmt::Display for Md5Digest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut chars = [0u8; MD5_HEX_LEN];
        binascii::bin2hex(&self.data, &mut chars).expect("output buffer has the exact size");
        write!(f, "{}", std::str::from_utf8(&chars).expect("hex is valid utf-8"))
    }
}

impl std::str::FromStr for Md5Digest {
    type Err = DigestParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() != MD5_HEX_LEN {
            return Err(DigestParseError::InvalidLength { len: s.len() });
        }

        let mut data = [0u8; MD5_BYTES_LEN];
        binascii::hex2bin(s.to_ascii_lowercase().as_bytes(), &mut data).map_err(|_| DigestParseError::InvalidHex)?;

        Ok(Self { data })
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use super::{DigestParseError, Md5Digest};

    #[test]
    fn it_should_round_trip_through_the_hex_form() {
        let hex = "5d41402abc4b2a76b9719d911017c592";

        let digest = Md5Digest::from_str(hex).unwrap();

        assert_eq!(digest.to_string(), hex);
    }

    #[test]
    fn it_should_accept_uppercase_hex_and_render_lowercase() {
        let digest = Md5Digest::from_str("5D41402ABC4B2A76B9719D911017C592").unwrap();

        assert_eq!(digest.to_string(), "5d41402abc4b2a76b9719d911017c592");
    }

    #[test]
    fn it_should_reject_a_digest_with_the_wrong_length() {
        assert_eq!(
            Md5Digest::from_str("5d41402a"),
            Err(DigestParseError::InvalidLength { len: 8 })
        );
    }

    #[test]
    fn it_should_reject_non_hex_characters() {
        assert_eq!(
            Md5Digest::from_str("zz41402abc4b2a76b9719d911017c592"),
            Err(DigestParseError::InvalidHex)
        );
    }
}
