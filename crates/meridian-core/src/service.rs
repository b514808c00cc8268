// SPDX-License-Identifier: Apache-2.0
//! The service registry entity.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{codes, PlaneError, PlaneResult};
use crate::ident::{ServiceId, TeamId, UserId};

/// Lifecycle state of an [`ApplicationService`].
#[derive(Clone, Copy, PartialEq, Eq, Debug, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ServiceLifecycle {
    /// In service; accepts instances, shares, and ownership transfers.
    Active,
    /// Still running but flagged for replacement.
    Deprecated,
    /// Shut down. A retired service cannot gain new instances or new shares.
    Retired,
}

/// A registered service under configuration control.
///
/// Invariants
/// - `display_name` is non-empty and at most 200 characters.
/// - `environments` is non-empty.
/// - `owner_team_id = None` marks an orphan awaiting claim through the
///   approval workflow.
/// - A `Retired` service never gains new instances or shares; enforcement
///   sits at the operation entry points, not in this record.
#[derive(Clone, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub struct ApplicationService {
    /// Stable identity, referenced by instances, drift events, and shares.
    pub id: ServiceId,
    /// Human-facing name; heartbeats address services by this.
    pub display_name: String,
    /// Owning team, or `None` for an orphan awaiting claim.
    pub owner_team_id: Option<TeamId>,
    /// Environments the service runs in (non-empty).
    pub environments: BTreeSet<String>,
    /// Current lifecycle state.
    pub lifecycle: ServiceLifecycle,
    /// Free-form labels. The key `drift.severity` overrides derived drift
    /// severity when it parses to a valid severity name.
    pub tags: BTreeMap<String, String>,
    /// Optimistic-concurrency version; bumped on every persisted write.
    pub version: u64,
    /// Creation instant.
    pub created_at: DateTime<Utc>,
    /// Last mutation instant.
    pub updated_at: DateTime<Utc>,
    /// Operator who registered the service.
    pub created_by: UserId,
}

impl ApplicationService {
    /// Register a new service record.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` when `display_name` violates its bound or
    /// `environments` is empty.
    pub fn new(
        id: ServiceId,
        display_name: impl Into<String>,
        environments: impl IntoIterator<Item = String>,
        created_by: UserId,
        now: DateTime<Utc>,
    ) -> PlaneResult<Self> {
        let display_name = display_name.into();
        if display_name.is_empty() || display_name.chars().count() > 200 {
            return Err(PlaneError::invalid_argument(
                codes::FIELD_INVALID,
                "service.new",
                "display_name must be 1..=200 characters",
            ));
        }
        let environments: BTreeSet<String> = environments.into_iter().collect();
        if environments.is_empty() {
            return Err(PlaneError::invalid_argument(
                codes::FIELD_INVALID,
                "service.new",
                "environments must be non-empty",
            ));
        }
        Ok(Self {
            id,
            display_name,
            owner_team_id: None,
            environments,
            lifecycle: ServiceLifecycle::Active,
            tags: BTreeMap::new(),
            version: 0,
            created_at: now,
            updated_at: now,
            created_by,
        })
    }

    /// Whether the service may accept new instances and shares.
    #[must_use]
    pub fn accepts_attachments(&self) -> bool {
        self.lifecycle != ServiceLifecycle::Retired
    }

    /// The severity-override tag value, if a well-formed one is set.
    #[must_use]
    pub fn severity_override(&self) -> Option<&str> {
        self.tags.get("drift.severity").map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn now() -> DateTime<Utc> {
        Utc::now()
    }

    #[test]
    fn rejects_empty_environments() {
        let id = ServiceId::parse("svc-a").unwrap();
        let user = UserId::parse("alice").unwrap();
        assert!(ApplicationService::new(id, "Service A", [], user, now()).is_err());
    }

    #[test]
    fn retired_rejects_attachments() {
        let id = ServiceId::parse("svc-a").unwrap();
        let user = UserId::parse("alice").unwrap();
        let mut svc =
            ApplicationService::new(id, "Service A", ["prod".into()], user, now()).unwrap();
        assert!(svc.accepts_attachments());
        svc.lifecycle = ServiceLifecycle::Retired;
        assert!(!svc.accepts_attachments());
    }
}
