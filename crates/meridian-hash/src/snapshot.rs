// SPDX-License-Identifier: Apache-2.0
//! Folding property sources into a canonical snapshot.

use std::collections::BTreeMap;

use crate::digest::sha256_hex;
use crate::filter::is_filtered_key;
use crate::source::PropertySource;

/// The canonical view of a service's effective configuration.
///
/// Header fields are optional metadata lines; `properties` is already
/// filtered and precedence-resolved, keyed in ascending order.
#[derive(Clone, PartialEq, Eq, Debug, Default)]
pub struct ConfigSnapshot {
    /// Application name header line, when known.
    pub application: Option<String>,
    /// Profile header line, when known.
    pub profile: Option<String>,
    /// Label header line, when known.
    pub label: Option<String>,
    /// Source version header line, when known.
    pub version: Option<String>,
    /// Filtered, precedence-resolved properties in key order.
    pub properties: BTreeMap<String, String>,
}

impl ConfigSnapshot {
    /// Render the canonical string.
    ///
    /// Optional header lines first (each omitted entirely when `None`),
    /// then every `key=value\n` pair in ascending key order. This exact
    /// byte sequence is what both the plane and the instance hash.
    #[must_use]
    pub fn canonical_string(&self) -> String {
        let mut out = String::new();
        for (header, value) in [
            ("application", self.application.as_ref()),
            ("profile", self.profile.as_ref()),
            ("label", self.label.as_ref()),
            ("version", self.version.as_ref()),
        ] {
            if let Some(value) = value {
                out.push_str(header);
                out.push('=');
                out.push_str(value);
                out.push('\n');
            }
        }
        for (key, value) in &self.properties {
            out.push_str(key);
            out.push('=');
            out.push_str(value);
            out.push('\n');
        }
        out
    }

    /// Lowercase hex SHA-256 of the canonical string.
    #[must_use]
    pub fn digest(&self) -> String {
        sha256_hex(&self.canonical_string())
    }
}

/// Builds a [`ConfigSnapshot`] from prioritized property sources.
///
/// Sources are added highest-precedence first. Within the fold, the first
/// value seen for a key wins; non-central sources and filtered keys are
/// dropped before they can influence the result.
#[derive(Clone, Debug, Default)]
pub struct SnapshotBuilder {
    application: Option<String>,
    profile: Option<String>,
    label: Option<String>,
    version: Option<String>,
    properties: BTreeMap<String, String>,
}

impl SnapshotBuilder {
    /// Start an empty builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the application header.
    #[must_use]
    pub fn application(mut self, value: impl Into<String>) -> Self {
        self.application = Some(value.into());
        self
    }

    /// Set the profile header.
    #[must_use]
    pub fn profile(mut self, value: impl Into<String>) -> Self {
        self.profile = Some(value.into());
        self
    }

    /// Set the label header.
    #[must_use]
    pub fn label(mut self, value: impl Into<String>) -> Self {
        self.label = Some(value.into());
        self
    }

    /// Set the version header.
    #[must_use]
    pub fn version(mut self, value: impl Into<String>) -> Self {
        self.version = Some(value.into());
        self
    }

    /// Fold one source in. Call in precedence order, highest first.
    #[must_use]
    pub fn source(mut self, source: &PropertySource) -> Self {
        self.add_source(source);
        self
    }

    /// Non-consuming variant of [`source`](Self::source).
    pub fn add_source(&mut self, source: &PropertySource) {
        if !source.origin.is_canonical() {
            return;
        }
        for (key, value) in &source.properties {
            if is_filtered_key(key) {
                continue;
            }
            self.properties
                .entry(key.clone())
                .or_insert_with(|| value.clone());
        }
    }

    /// Finish the fold.
    #[must_use]
    pub fn build(self) -> ConfigSnapshot {
        ConfigSnapshot {
            application: self.application,
            profile: self.profile,
            label: self.label,
            version: self.version,
            properties: self.properties,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::PropertyOrigin;

    fn central(name: &str, pairs: &[(&str, &str)]) -> PropertySource {
        PropertySource::new(
            name,
            PropertyOrigin::Central,
            pairs.iter().map(|(k, v)| ((*k).to_owned(), (*v).to_owned())),
        )
    }

    #[test]
    fn filters_secrets_and_ephemera() {
        let source = central(
            "app/prod",
            &[("db.url", "x"), ("db.password", "secret"), ("server.port", "8080")],
        );
        let snapshot = SnapshotBuilder::new().source(&source).build();
        let canonical = snapshot.canonical_string();
        assert_eq!(canonical, "db.url=x\n");
        assert_eq!(snapshot.digest(), crate::sha256_hex("db.url=x\n"));
    }

    #[test]
    fn first_seen_value_wins_across_sources() {
        let high = central("app/prod", &[("db.pool", "20")]);
        let low = central("app/default", &[("db.pool", "5"), ("db.url", "x")]);
        let snapshot = SnapshotBuilder::new().source(&high).source(&low).build();
        assert_eq!(snapshot.properties["db.pool"], "20");
        assert_eq!(snapshot.properties["db.url"], "x");
    }

    #[test]
    fn non_central_sources_are_excluded() {
        let env = PropertySource::new(
            "env",
            PropertyOrigin::Environment,
            [("db.url".to_owned(), "overridden".to_owned())],
        );
        let snapshot = SnapshotBuilder::new()
            .source(&env)
            .source(&central("app", &[("db.url", "x")]))
            .build();
        assert_eq!(snapshot.properties["db.url"], "x");
    }

    #[test]
    fn null_headers_are_omitted() {
        let snapshot = SnapshotBuilder::new()
            .application("billing")
            .version("v42")
            .source(&central("app", &[("a", "1")]))
            .build();
        assert_eq!(snapshot.canonical_string(), "application=billing\nversion=v42\na=1\n");
    }

    #[test]
    fn values_keep_their_source_text_form() {
        let source = central("app", &[("flag.enabled", "true"), ("retry.max", "007")]);
        let snapshot = SnapshotBuilder::new().source(&source).build();
        assert_eq!(snapshot.canonical_string(), "flag.enabled=true\nretry.max=007\n");
    }
}
