// SPDX-License-Identifier: Apache-2.0
//! Drift events: the persisted record of a detected divergence.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{codes, PlaneError, PlaneResult};
use crate::ident::{EventId, InstanceId, ServiceId, TeamId};

/// Operational severity of a drift event.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Debug, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DriftSeverity {
    /// Drift in a production environment.
    Critical,
    /// Drift in a staging environment.
    High,
    /// Drift anywhere else.
    Medium,
    /// Explicitly downgraded drift (tag override only).
    Low,
}

impl DriftSeverity {
    /// Parse a severity name as used in service tags. Case-insensitive.
    #[must_use]
    pub fn from_tag(raw: &str) -> Option<Self> {
        match raw.to_ascii_lowercase().as_str() {
            "critical" => Some(Self::Critical),
            "high" => Some(Self::High),
            "medium" => Some(Self::Medium),
            "low" => Some(Self::Low),
            _ => None,
        }
    }
}

/// Workflow state of a drift event.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DriftStatus {
    /// Freshly raised by the pipeline.
    Detected,
    /// An operator has seen it.
    Acknowledged,
    /// Remediation in progress.
    Resolving,
    /// Closed; the record is immutable except for `notes`.
    Resolved,
    /// Deliberately left open and silenced.
    Ignored,
}

/// A detected divergence between expected and applied configuration.
///
/// Events are created by the pipeline, resolved by operators (or by the
/// pipeline itself when the instance converges), and never deleted.
///
/// Invariants
/// - Once `status == Resolved`, `resolved_at` and `resolved_by` are set and
///   every field except `notes` is frozen.
/// - `{service_name, instance_id, detected_at}` truncated to the millisecond
///   is the idempotency key for inserts.
#[derive(Clone, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub struct DriftEvent {
    /// Event identity.
    pub id: EventId,
    /// Back-reference to the drifting service.
    pub service_id: ServiceId,
    /// Display name of the service at detection time.
    pub service_name: String,
    /// The drifting instance.
    pub instance_id: InstanceId,
    /// Environment the instance reported at detection time.
    pub environment: Option<String>,
    /// The digest the plane expected.
    pub expected_hash: String,
    /// The digest the instance actually applied.
    pub applied_hash: String,
    /// Derived (or overridden) severity.
    pub severity: DriftSeverity,
    /// Workflow state.
    pub status: DriftStatus,
    /// Detection instant (millisecond precision is the dedup key).
    pub detected_at: DateTime<Utc>,
    /// Resolution instant; set exactly when `status` becomes `Resolved`.
    pub resolved_at: Option<DateTime<Utc>>,
    /// Who raised the event (`"system"` for the pipeline).
    pub detected_by: String,
    /// Who resolved it (`"system"` for auto-resolution).
    pub resolved_by: Option<String>,
    /// Owning team at creation time, denormalized for authorization;
    /// rewritten by the ownership cascade.
    pub team_id: Option<TeamId>,
    /// Free-form operator notes; writable even after resolution.
    pub notes: Option<String>,
    /// Last mutation instant.
    pub updated_at: DateTime<Utc>,
}

impl DriftEvent {
    /// Whether the event still counts as open for auto-resolution purposes.
    #[must_use]
    pub fn is_unresolved(&self) -> bool {
        !matches!(self.status, DriftStatus::Resolved | DriftStatus::Ignored)
    }

    /// Close the event.
    ///
    /// # Errors
    ///
    /// Returns `Conflict` when the event is already resolved — resolved
    /// events are immutable except for `notes`.
    pub fn resolve(&mut self, by: impl Into<String>, at: DateTime<Utc>) -> PlaneResult<()> {
        if self.status == DriftStatus::Resolved {
            return Err(PlaneError::conflict(
                codes::LIFECYCLE_CONFLICT,
                "drift.resolve",
                format!("event {} is already resolved", self.id),
            ));
        }
        self.status = DriftStatus::Resolved;
        self.resolved_at = Some(at);
        self.resolved_by = Some(by.into());
        self.updated_at = at;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event() -> DriftEvent {
        let now = Utc::now();
        DriftEvent {
            id: EventId::generate(),
            service_id: ServiceId::parse("svc-a").unwrap(),
            service_name: "svc-a".into(),
            instance_id: InstanceId::parse("i-1").unwrap(),
            environment: Some("prod".into()),
            expected_hash: "aaa".into(),
            applied_hash: "bbb".into(),
            severity: DriftSeverity::Critical,
            status: DriftStatus::Detected,
            detected_at: now,
            resolved_at: None,
            detected_by: "system".into(),
            resolved_by: None,
            team_id: None,
            notes: None,
            updated_at: now,
        }
    }

    #[test]
    fn resolve_sets_audit_fields_and_freezes() {
        let mut ev = event();
        let at = Utc::now();
        ev.resolve("system", at).unwrap();
        assert_eq!(ev.status, DriftStatus::Resolved);
        assert_eq!(ev.resolved_at, Some(at));
        assert_eq!(ev.resolved_by.as_deref(), Some("system"));
        assert!(ev.resolve("ops", at).is_err());
    }

    #[test]
    fn severity_tag_parsing() {
        assert_eq!(DriftSeverity::from_tag("HIGH"), Some(DriftSeverity::High));
        assert_eq!(DriftSeverity::from_tag("nope"), None);
    }
}
