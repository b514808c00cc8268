// SPDX-License-Identifier: Apache-2.0
//! The stored entry and its transport projection.

use base64::Engine as _;

/// One key-value entry as read from a backend.
///
/// `modify_index` is monotonic per key and is the CAS token;
/// `create_index` is the index at which the key was (re)created. `flags`
/// are opaque caller metadata persisted with the value.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct KvEntry {
    /// Normalized key path.
    pub key: String,
    /// Opaque value bytes.
    pub value: Vec<u8>,
    /// Index/revision of the creating write.
    pub create_index: u64,
    /// Index/revision of the latest write; the CAS token.
    pub modify_index: u64,
    /// Opaque caller metadata.
    pub flags: u64,
}

impl KvEntry {
    /// Base64 projection of the value for transport.
    #[must_use]
    pub fn value_base64(&self) -> String {
        base64::engine::general_purpose::STANDARD.encode(&self.value)
    }

    /// The value as UTF-8, when it is valid UTF-8.
    #[must_use]
    pub fn value_utf8(&self) -> Option<&str> {
        std::str::from_utf8(&self.value).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base64_projection() {
        let entry = KvEntry {
            key: "a/b".into(),
            value: b"hello".to_vec(),
            create_index: 1,
            modify_index: 1,
            flags: 0,
        };
        assert_eq!(entry.value_base64(), "aGVsbG8=");
        assert_eq!(entry.value_utf8(), Some("hello"));
    }
}
