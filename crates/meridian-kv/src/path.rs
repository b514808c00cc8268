// SPDX-License-Identifier: Apache-2.0
//! Key path normalization, validation, and the per-service prefix policy.

use meridian_core::{codes, PlaneError, PlaneResult, ServiceId};

/// Longest accepted normalized path.
const MAX_PATH_LEN: usize = 512;

/// Normalize and validate a key path.
///
/// Normalization strips leading slashes and collapses repeated slashes.
/// The result must be non-empty, at most 512 bytes, drawn from
/// `[A-Za-z0-9._/-]`, and free of `..` segments (no traversal, even inside
/// an in-memory tree — keys are also used to build audit trails and URLs).
///
/// # Errors
///
/// Returns `InvalidArgument` with code `KV_PATH_INVALID` on any violation.
pub fn normalize_path(raw: &str) -> PlaneResult<String> {
    const OP: &str = "kv.path";
    let mut normalized = String::with_capacity(raw.len());
    let mut last_was_slash = true; // strips leading slashes too
    for ch in raw.chars() {
        if ch == '/' {
            if !last_was_slash {
                normalized.push('/');
            }
            last_was_slash = true;
            continue;
        }
        last_was_slash = false;
        if !(ch.is_ascii_alphanumeric() || matches!(ch, '.' | '_' | '-')) {
            return Err(PlaneError::invalid_argument(
                codes::KV_PATH_INVALID,
                OP,
                format!("character {ch:?} is outside [A-Za-z0-9._/-]"),
            ));
        }
        normalized.push(ch);
    }
    if normalized.ends_with('/') {
        normalized.pop();
    }
    if normalized.is_empty() {
        return Err(PlaneError::invalid_argument(codes::KV_PATH_INVALID, OP, "empty path"));
    }
    if normalized.len() > MAX_PATH_LEN {
        return Err(PlaneError::invalid_argument(
            codes::KV_PATH_INVALID,
            OP,
            format!("path exceeds {MAX_PATH_LEN} bytes"),
        ));
    }
    if normalized.split('/').any(|segment| segment == "..") {
        return Err(PlaneError::invalid_argument(
            codes::KV_PATH_INVALID,
            OP,
            "`..` segments are rejected",
        ));
    }
    Ok(normalized)
}

/// Maps service identities onto their key subtree.
///
/// Every service owns the subtree `<root>/<service-id>/…`; nothing outside
/// it is reachable through the per-service API.
#[derive(Clone, Debug)]
pub struct KeyPolicy {
    root: String,
}

impl KeyPolicy {
    /// A policy rooted at `root` (itself a valid path).
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` when `root` fails path validation.
    pub fn new(root: &str) -> PlaneResult<Self> {
        Ok(Self { root: normalize_path(root)? })
    }

    /// The subtree prefix for a service, with a trailing slash.
    #[must_use]
    pub fn service_prefix(&self, service_id: &ServiceId) -> String {
        format!("{}/{}/", self.root, service_id)
    }

    /// Build the full key for a service-relative path.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` when the relative path fails validation.
    pub fn full_key(&self, service_id: &ServiceId, relative: &str) -> PlaneResult<String> {
        let relative = normalize_path(relative)?;
        normalize_path(&format!("{}/{}/{relative}", self.root, service_id))
    }

    /// Recover the service-relative path from a full key.
    ///
    /// Returns `None` when the key is outside the service's subtree.
    #[must_use]
    pub fn extract_relative_path(&self, service_id: &ServiceId, full_key: &str) -> Option<String> {
        let prefix = self.service_prefix(service_id);
        let rest = full_key.strip_prefix(&prefix)?;
        if rest.is_empty() {
            return None;
        }
        Some(rest.to_owned())
    }
}

impl Default for KeyPolicy {
    fn default() -> Self {
        // "services" always passes validation.
        Self { root: "services".to_owned() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalization_strips_and_collapses_slashes() {
        assert_eq!(normalize_path("//a///b/c/").unwrap(), "a/b/c");
        assert_eq!(normalize_path("a").unwrap(), "a");
    }

    #[test]
    fn rejects_bad_paths() {
        assert!(normalize_path("").is_err());
        assert!(normalize_path("///").is_err());
        assert!(normalize_path("a/../b").is_err());
        assert!(normalize_path("a b").is_err());
        assert!(normalize_path("a\u{e9}").is_err());
        assert!(normalize_path(&"x/".repeat(300)).is_err());
    }

    #[test]
    fn service_subtree_round_trip() {
        let policy = KeyPolicy::default();
        let svc = ServiceId::parse("billing").unwrap();
        let key = policy.full_key(&svc, "/db/url").unwrap();
        assert_eq!(key, "services/billing/db/url");
        assert_eq!(policy.extract_relative_path(&svc, &key).unwrap(), "db/url");
        assert!(policy.extract_relative_path(&svc, "services/other/db/url").is_none());
    }
}
