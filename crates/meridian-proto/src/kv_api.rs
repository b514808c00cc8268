// SPDX-License-Identifier: Apache-2.0
//! JSON bodies of the per-service KV surface.

use serde::{Deserialize, Serialize};

use meridian_core::{codes, PlaneError, PlaneResult};
use meridian_kv::{KvEntry, ValueEncoding};

/// `GET /kv/{serviceId}/{*path}` response.
#[derive(Clone, PartialEq, Eq, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KvReadResponse {
    /// Service-relative path.
    pub path: String,
    /// Base64 projection of the value bytes.
    pub value_base64: String,
    /// CAS token of the entry.
    pub modify_index: u64,
    /// Index/revision of the creating write.
    pub create_index: u64,
    /// Opaque caller metadata.
    pub flags: u64,
}

impl KvReadResponse {
    /// Project a stored entry under its service-relative path.
    #[must_use]
    pub fn from_entry(relative_path: impl Into<String>, entry: &KvEntry) -> Self {
        Self {
            path: relative_path.into(),
            value_base64: entry.value_base64(),
            modify_index: entry.modify_index,
            create_index: entry.create_index,
            flags: entry.flags,
        }
    }
}

/// `PUT /kv/{serviceId}/{*path}` body.
#[derive(Clone, PartialEq, Eq, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct KvWriteBody {
    /// The value, in the declared encoding.
    pub value: String,
    /// One of `base64`, `utf8`, `raw`. Defaults to `utf8`.
    #[serde(default)]
    pub encoding: Option<String>,
    /// Compare-and-set token from a prior read.
    #[serde(default)]
    pub cas: Option<u64>,
    /// Opaque caller metadata to persist.
    #[serde(default)]
    pub flags: Option<u64>,
}

impl KvWriteBody {
    /// Decode the submitted value into the bytes to persist.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` for an unknown encoding name or an undecodable
    /// payload.
    pub fn decode_value(&self) -> PlaneResult<Vec<u8>> {
        let encoding = match self.encoding.as_deref() {
            None => ValueEncoding::Utf8,
            Some(name) => ValueEncoding::from_name(name).ok_or_else(|| {
                PlaneError::invalid_argument(
                    codes::WIRE_INVALID,
                    "kv.write.decode",
                    format!("unknown encoding {name:?}"),
                )
            })?,
        };
        encoding.decode(self.value.as_bytes())
    }
}

/// `PUT` response: whether the write (or its CAS guard) succeeded.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KvWriteResponse {
    /// Whether the write was applied.
    pub success: bool,
    /// The key's modify index after the call.
    pub modify_index: u64,
}

/// Prefix listing response with full entries.
#[derive(Clone, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub struct KvItemsResponse {
    /// Entries in ascending key order.
    pub items: Vec<KvReadResponse>,
}

/// Prefix listing response with keys only.
#[derive(Clone, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub struct KvKeysResponse {
    /// Keys in ascending order.
    pub keys: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_body_decodes_by_declared_encoding() {
        let body = KvWriteBody {
            value: "aGVsbG8=".into(),
            encoding: Some("base64".into()),
            cas: None,
            flags: None,
        };
        assert_eq!(body.decode_value().unwrap(), b"hello");

        let body = KvWriteBody { value: "hello".into(), encoding: None, cas: None, flags: None };
        assert_eq!(body.decode_value().unwrap(), b"hello");

        let body = KvWriteBody {
            value: "x".into(),
            encoding: Some("gzip".into()),
            cas: None,
            flags: None,
        };
        assert!(body.decode_value().is_err());
    }

    #[test]
    fn read_response_projects_base64() {
        let entry = KvEntry {
            key: "services/billing/db/url".into(),
            value: b"jdbc:x".to_vec(),
            create_index: 3,
            modify_index: 9,
            flags: 7,
        };
        let response = KvReadResponse::from_entry("db/url", &entry);
        assert_eq!(response.path, "db/url");
        assert_eq!(response.value_base64, "amRiYzp4");
        assert_eq!(response.modify_index, 9);
    }
}
