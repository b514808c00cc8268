// SPDX-License-Identifier: Apache-2.0
//! The service-instance entity and the drift invariant.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ident::{InstanceId, ServiceId, TeamId};

/// Health/drift state of a [`ServiceInstance`].
#[derive(Clone, Copy, PartialEq, Eq, Debug, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InstanceStatus {
    /// Heartbeating and configured as expected.
    Healthy,
    /// Heartbeating but reported unhealthy by its own checks.
    Unhealthy,
    /// Heartbeating with a config hash that diverges from the expected one.
    Drift,
    /// No heartbeat within the staleness threshold.
    Unknown,
}

/// The drift predicate: both hashes known and unequal.
///
/// This is the single source of truth for `has_drift`; every writer of an
/// instance record must keep `has_drift` equal to this function applied to
/// the record's own hash slots.
#[must_use]
pub fn drift_between(expected: Option<&str>, reported: Option<&str>) -> bool {
    match (expected, reported) {
        (Some(e), Some(r)) => e != r,
        _ => false,
    }
}

/// One running instance of a service, upserted by heartbeats.
///
/// Invariants
/// - `has_drift ⇔ drift_between(expected_hash, config_hash)`.
/// - `status == Drift` iff `has_drift`.
/// - `status == Unknown` iff `last_seen_at` is older than the staleness
///   threshold (flipped by the periodic sweeper, not by the pipeline).
/// - `last_seen_at` is non-decreasing: a heartbeat carrying an older
///   `received_at` than the stored value is dropped.
///
/// The expected hash is owned by the plane; the reported hash is owned by
/// the instance.
#[derive(Clone, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub struct ServiceInstance {
    /// Globally unique instance identity (the document primary key).
    pub instance_id: InstanceId,
    /// Back-reference to the owning service.
    pub service_id: ServiceId,
    /// Display name of the service, as reported in heartbeats.
    pub service_name: String,
    /// Denormalized owning team, rewritten by the ownership cascade.
    pub team_id: Option<TeamId>,
    /// Reported host, if any.
    pub host: Option<String>,
    /// Reported port, if any.
    pub port: Option<u16>,
    /// Deployment environment (e.g. `prod`).
    pub environment: Option<String>,
    /// Reported build/release version.
    pub version: Option<String>,
    /// Authoritative target digest, owned by the plane.
    pub expected_hash: Option<String>,
    /// Currently reported digest, owned by the instance.
    pub config_hash: Option<String>,
    /// Previously reported digest (shifted on every accepted heartbeat).
    pub last_applied_hash: Option<String>,
    /// Current health/drift state.
    pub status: InstanceStatus,
    /// Instant of the latest accepted heartbeat.
    pub last_seen_at: DateTime<Utc>,
    /// Whether the instance currently diverges from its expected config.
    pub has_drift: bool,
    /// When the current drift episode was first detected.
    pub drift_detected_at: Option<DateTime<Utc>>,
    /// Creation instant (first heartbeat).
    pub created_at: DateTime<Utc>,
    /// Last mutation instant.
    pub updated_at: DateTime<Utc>,
}

impl ServiceInstance {
    /// Recompute `has_drift`, `status`, and `drift_detected_at` from the
    /// hash slots, preserving the detection instant of an ongoing episode.
    ///
    /// `Unhealthy` and `Unknown` are not decided here: the first comes from
    /// the instance's own report, the second from the staleness sweeper.
    pub fn refresh_drift(&mut self, now: DateTime<Utc>) {
        let drifting = drift_between(self.expected_hash.as_deref(), self.config_hash.as_deref());
        if drifting && !self.has_drift {
            self.drift_detected_at = Some(now);
        }
        if !drifting {
            self.drift_detected_at = None;
        }
        self.has_drift = drifting;
        self.status = if drifting { InstanceStatus::Drift } else { InstanceStatus::Healthy };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drift_requires_both_hashes() {
        assert!(!drift_between(None, None));
        assert!(!drift_between(Some("aaa"), None));
        assert!(!drift_between(None, Some("bbb")));
        assert!(!drift_between(Some("aaa"), Some("aaa")));
        assert!(drift_between(Some("aaa"), Some("bbb")));
    }
}
