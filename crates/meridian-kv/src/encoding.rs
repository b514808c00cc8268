// SPDX-License-Identifier: Apache-2.0
//! Inbound value encodings.

use base64::Engine as _;

use meridian_core::{codes, PlaneError, PlaneResult};

/// How a client submitted a value. The store always persists bytes.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub enum ValueEncoding {
    /// Raw bytes, passed through unchanged.
    #[default]
    Raw,
    /// UTF-8 text; persisted as its byte encoding.
    Utf8,
    /// Base64 text; decoded before persistence.
    Base64,
}

impl ValueEncoding {
    /// Parse the wire name of an encoding.
    #[must_use]
    pub fn from_name(raw: &str) -> Option<Self> {
        match raw {
            "raw" => Some(Self::Raw),
            "utf8" => Some(Self::Utf8),
            "base64" => Some(Self::Base64),
            _ => None,
        }
    }

    /// Decode a submitted value into the bytes to persist.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` when a base64 payload does not decode.
    pub fn decode(self, raw: &[u8]) -> PlaneResult<Vec<u8>> {
        match self {
            Self::Raw | Self::Utf8 => Ok(raw.to_vec()),
            Self::Base64 => base64::engine::general_purpose::STANDARD
                .decode(raw)
                .map_err(|err| {
                    PlaneError::invalid_argument(
                        codes::FIELD_INVALID,
                        "kv.decode",
                        format!("invalid base64 value: {err}"),
                    )
                }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_base64_and_passes_raw() {
        assert_eq!(ValueEncoding::Base64.decode(b"aGVsbG8=").unwrap(), b"hello");
        assert_eq!(ValueEncoding::Raw.decode(b"hello").unwrap(), b"hello");
        assert_eq!(ValueEncoding::Utf8.decode("héllo".as_bytes()).unwrap(), "héllo".as_bytes());
        assert!(ValueEncoding::Base64.decode(b"!!").is_err());
    }

    #[test]
    fn names_round_trip() {
        assert_eq!(ValueEncoding::from_name("base64"), Some(ValueEncoding::Base64));
        assert_eq!(ValueEncoding::from_name("gzip"), None);
    }
}
