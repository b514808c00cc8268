// SPDX-License-Identifier: Apache-2.0
//! The key filter: what never enters the canonical snapshot.

/// Substrings that mark a key as secret-bearing, matched case-insensitively.
const SECRET_MARKERS: [&str; 4] = ["password", "secret", "token", "credential"];

/// Prefixes of keys that are per-process or per-host ephemera.
const EPHEMERAL_PREFIXES: [&str; 12] = [
    "random.",
    "local.server.port",
    "local.management.port",
    "management.metrics",
    "logging.",
    "spring.application.instance_id",
    "info.",
    "server.address",
    "server.port",
    "java.",
    "sun.",
    "user.",
];

/// Whether `key` is excluded from the canonical snapshot.
///
/// A key is filtered when its lowercased form contains a secret marker, or
/// when it starts with one of the ephemeral prefixes. Filtered keys never
/// influence the digest, so rotating a secret or restarting a process does
/// not read as drift.
#[must_use]
pub fn is_filtered_key(key: &str) -> bool {
    let lowered = key.to_lowercase();
    if SECRET_MARKERS.iter().any(|marker| lowered.contains(marker)) {
        return true;
    }
    EPHEMERAL_PREFIXES
        .iter()
        .any(|prefix| lowered.starts_with(prefix))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn secret_markers_match_anywhere_case_insensitively() {
        assert!(is_filtered_key("db.PASSWORD"));
        assert!(is_filtered_key("api.client-Secret"));
        assert!(is_filtered_key("oauth.access_token"));
        assert!(is_filtered_key("aws.CredentialPath"));
        assert!(!is_filtered_key("db.url"));
    }

    #[test]
    fn ephemeral_prefixes_match_at_start_only() {
        assert!(is_filtered_key("random.int.max"));
        assert!(is_filtered_key("logging.level.root"));
        assert!(is_filtered_key("local.server.port"));
        assert!(is_filtered_key("user.home"));
        assert!(is_filtered_key("server.port"));
        assert!(!is_filtered_key("server.servlet.context-path"));
        assert!(!is_filtered_key("app.logging-enabled"));
    }
}
