// SPDX-License-Identifier: Apache-2.0
//! Property sources and their origins.

/// Where a property source comes from.
///
/// Only [`Central`](PropertyOrigin::Central) sources participate in the
/// canonical snapshot. Everything else is per-process or per-host state
/// that would make the digest diverge between the plane and the instance.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum PropertyOrigin {
    /// Served by the central configuration source; included in the digest.
    Central,
    /// Local overrides on the instance.
    Local,
    /// JVM-/process-level system properties.
    System,
    /// Process environment variables.
    Environment,
    /// Per-boot random values.
    Random,
}

impl PropertyOrigin {
    /// Whether properties of this origin enter the canonical snapshot.
    #[must_use]
    pub fn is_canonical(self) -> bool {
        matches!(self, Self::Central)
    }
}

/// One named property source, ordered by precedence (first seen wins).
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct PropertySource {
    /// Source name, for diagnostics only — never part of the digest.
    pub name: String,
    /// Origin classification.
    pub origin: PropertyOrigin,
    /// Properties in source order. Later duplicates within one source lose,
    /// exactly as a later source loses to an earlier one.
    pub properties: Vec<(String, String)>,
}

impl PropertySource {
    /// Build a source from any iterable of key/value pairs.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        origin: PropertyOrigin,
        properties: impl IntoIterator<Item = (String, String)>,
    ) -> Self {
        Self {
            name: name.into(),
            origin,
            properties: properties.into_iter().collect(),
        }
    }
}
