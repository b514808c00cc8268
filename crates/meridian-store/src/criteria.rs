// SPDX-License-Identifier: Apache-2.0
//! Declarative listing criteria.
//!
//! A criteria record is filters plus an [`AuthScope`]. The scope is
//! computed once per request by the authorization evaluator and pushed
//! down here so unauthorized rows are never materialized, paged, or
//! counted.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};

use meridian_core::{
    ApprovalStatus, DriftSeverity, DriftStatus, InstanceId, InstanceStatus, ServiceId,
    ServiceLifecycle, TeamId, UserId,
};

/// Which services a listing may reveal.
#[derive(Clone, PartialEq, Eq, Debug, Default)]
pub enum AuthScope {
    /// No filtering (sys-admins only).
    #[default]
    Unrestricted,
    /// Only rows belonging to these services.
    ServiceIds(BTreeSet<ServiceId>),
}

impl AuthScope {
    /// Whether rows of `service_id` are visible under this scope.
    #[must_use]
    pub fn admits(&self, service_id: &ServiceId) -> bool {
        match self {
            Self::Unrestricted => true,
            Self::ServiceIds(ids) => ids.contains(service_id),
        }
    }
}

/// Filters for listing services.
#[derive(Clone, Debug, Default)]
pub struct ServiceCriteria {
    /// Restrict to one lifecycle state.
    pub lifecycle: Option<ServiceLifecycle>,
    /// Restrict to one owning team.
    pub owner_team_id: Option<TeamId>,
    /// Case-sensitive substring match on the display name.
    pub name_contains: Option<String>,
    /// Authorization scope.
    pub scope: AuthScope,
}

/// Filters for listing instances.
#[derive(Clone, Debug, Default)]
pub struct InstanceCriteria {
    /// Restrict to one service.
    pub service_id: Option<ServiceId>,
    /// Restrict to one status.
    pub status: Option<InstanceStatus>,
    /// Restrict to one environment.
    pub environment: Option<String>,
    /// Only instances last seen strictly before this instant.
    pub last_seen_before: Option<DateTime<Utc>>,
    /// Authorization scope.
    pub scope: AuthScope,
}

/// Filters for listing drift events.
#[derive(Clone, Debug, Default)]
pub struct DriftCriteria {
    /// Restrict to one service name.
    pub service_name: Option<String>,
    /// Restrict to one instance.
    pub instance_id: Option<InstanceId>,
    /// Restrict to one workflow status.
    pub status: Option<DriftStatus>,
    /// Restrict to one severity.
    pub severity: Option<DriftSeverity>,
    /// Restrict to one environment.
    pub environment: Option<String>,
    /// Only events detected at or after this instant.
    pub detected_after: Option<DateTime<Utc>>,
    /// Only events detected strictly before this instant.
    pub detected_before: Option<DateTime<Utc>>,
    /// Authorization scope.
    pub scope: AuthScope,
}

/// Filters for listing approval requests.
#[derive(Clone, Debug, Default)]
pub struct ApprovalCriteria {
    /// Restrict to one target service.
    pub target_service_id: Option<ServiceId>,
    /// Restrict to one candidate team.
    pub target_team_id: Option<TeamId>,
    /// Restrict to one lifecycle status.
    pub status: Option<ApprovalStatus>,
    /// Restrict to one requester.
    pub requester_user_id: Option<UserId>,
    /// Authorization scope.
    pub scope: AuthScope,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scope_admission() {
        let svc = ServiceId::parse("svc-a").unwrap();
        let other = ServiceId::parse("svc-b").unwrap();
        assert!(AuthScope::Unrestricted.admits(&svc));
        let scoped = AuthScope::ServiceIds([svc.clone()].into_iter().collect());
        assert!(scoped.admits(&svc));
        assert!(!scoped.admits(&other));
    }
}
