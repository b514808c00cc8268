// SPDX-License-Identifier: Apache-2.0
//! Scoped permission grants (shares).

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{codes, PlaneError, PlaneResult};
use crate::ident::{InstanceId, ServiceId, ShareId, UserId};
use crate::permission::{Actor, Permission, SHAREABLE_PERMISSIONS};

/// Whether a share covers the whole service or a single instance.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResourceLevel {
    /// The share applies to the service and all of its instances.
    Service,
    /// The share applies to one named instance.
    Instance,
}

/// Kind of principal a share grants to.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Debug, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GranteeType {
    /// Grant to every member of a team.
    Team,
    /// Grant to a single user.
    User,
}

/// The principal a share grants to.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Debug, Serialize, Deserialize)]
pub struct Grantee {
    /// Team or user.
    pub kind: GranteeType,
    /// Raw principal identifier (team ID or user ID, matching `kind`).
    pub id: String,
}

/// A scoped permission grant to a team or user.
///
/// Invariants
/// - `permissions` is a non-empty subset of [`SHAREABLE_PERMISSIONS`].
/// - An expired share is ignored by the evaluator but retained for audit.
/// - No two active shares may carry the same
///   `{service_id, grantee, environments}` — enforced at the repository.
#[derive(Clone, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub struct ServiceShare {
    /// Share identity.
    pub id: ShareId,
    /// Scope of the grant.
    pub resource_level: ResourceLevel,
    /// The shared service.
    pub service_id: ServiceId,
    /// The shared instance, when `resource_level` is `Instance`.
    pub instance_id: Option<InstanceId>,
    /// Who the grant is for.
    pub grantee: Grantee,
    /// Granted actions.
    pub permissions: BTreeSet<Permission>,
    /// Environment filter; empty means all environments.
    pub environments: BTreeSet<String>,
    /// Expiry instant; `None` means the share does not expire.
    pub expires_at: Option<DateTime<Utc>>,
    /// Creation instant.
    pub created_at: DateTime<Utc>,
    /// Operator who created the grant.
    pub created_by: UserId,
}

impl ServiceShare {
    /// Validate the permission set of a share under construction.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` when the set is empty or contains a
    /// non-shareable permission.
    pub fn validate_permissions(permissions: &BTreeSet<Permission>) -> PlaneResult<()> {
        if permissions.is_empty() {
            return Err(PlaneError::invalid_argument(
                codes::FIELD_INVALID,
                "share.validate",
                "a share must grant at least one permission",
            ));
        }
        for perm in permissions {
            if !SHAREABLE_PERMISSIONS.contains(perm) {
                return Err(PlaneError::invalid_argument(
                    codes::FIELD_INVALID,
                    "share.validate",
                    format!("{perm:?} cannot be delegated through a share"),
                ));
            }
        }
        Ok(())
    }

    /// Whether the share is active at `now` (not yet expired).
    #[must_use]
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_none_or(|at| at > now)
    }

    /// Whether the share's environment filter admits `environment`.
    ///
    /// An empty filter admits every environment; a request without an
    /// environment is only admitted by an unfiltered share.
    #[must_use]
    pub fn covers_environment(&self, environment: Option<&str>) -> bool {
        if self.environments.is_empty() {
            return true;
        }
        environment.is_some_and(|env| self.environments.contains(env))
    }

    /// Whether the share grants to `actor` (directly or via a team).
    #[must_use]
    pub fn grants_to(&self, actor: &Actor) -> bool {
        match self.grantee.kind {
            GranteeType::User => self.grantee.id == actor.user_id.as_str(),
            GranteeType::Team => actor
                .team_ids
                .iter()
                .any(|team| team.as_str() == self.grantee.id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn share(expires_at: Option<DateTime<Utc>>) -> ServiceShare {
        ServiceShare {
            id: ShareId::generate(),
            resource_level: ResourceLevel::Service,
            service_id: ServiceId::parse("svc-a").unwrap(),
            instance_id: None,
            grantee: Grantee { kind: GranteeType::Team, id: "team-b".into() },
            permissions: [Permission::ViewService].into_iter().collect(),
            environments: BTreeSet::new(),
            expires_at,
            created_at: Utc::now(),
            created_by: UserId::parse("alice").unwrap(),
        }
    }

    #[test]
    fn expired_share_is_inactive_but_kept() {
        let now = Utc::now();
        let sh = share(Some(now - Duration::seconds(1)));
        assert!(!sh.is_active(now));
        let sh = share(Some(now + Duration::seconds(1)));
        assert!(sh.is_active(now));
        let sh = share(None);
        assert!(sh.is_active(now));
    }

    #[test]
    fn environment_filter_semantics() {
        let mut sh = share(None);
        assert!(sh.covers_environment(Some("prod")));
        assert!(sh.covers_environment(None));
        sh.environments = ["prod".to_owned()].into_iter().collect();
        assert!(sh.covers_environment(Some("prod")));
        assert!(!sh.covers_environment(Some("dev")));
        assert!(!sh.covers_environment(None));
    }

    #[test]
    fn rejects_non_shareable_permissions() {
        let perms: BTreeSet<Permission> = [Permission::ManageShares].into_iter().collect();
        assert!(ServiceShare::validate_permissions(&perms).is_err());
        assert!(ServiceShare::validate_permissions(&BTreeSet::new()).is_err());
    }
}
