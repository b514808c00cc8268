// SPDX-License-Identifier: Apache-2.0
//! Permission model: actions, roles, and the acting principal.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::ident::{TeamId, UserId};

/// A grantable action on a service or one of its instances.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Permission {
    /// Read the service record and its metadata.
    ViewService,
    /// Read instance records for the service.
    ViewInstance,
    /// Read drift events for the service.
    ViewDrift,
    /// Modify the service record.
    EditService,
    /// Modify instance records (expected hash, environment assignment).
    EditInstance,
    /// Trigger a restart of an instance.
    RestartInstance,
    /// Create, modify, and revoke shares for the service.
    ManageShares,
    /// Acknowledge and resolve drift events.
    ResolveDrift,
}

/// Everything an owner (or creator) may do on their own service.
pub const OWNER_BUNDLE: [Permission; 8] = [
    Permission::ViewService,
    Permission::ViewInstance,
    Permission::ViewDrift,
    Permission::EditService,
    Permission::EditInstance,
    Permission::RestartInstance,
    Permission::ManageShares,
    Permission::ResolveDrift,
];

/// The subset of permissions that may be delegated through a share.
///
/// `ManageShares` and `ResolveDrift` stay with the owner: delegating the
/// ability to delegate (or to close out drift on someone else's service)
/// is an ownership transfer, not a share.
pub const SHAREABLE_PERMISSIONS: [Permission; 6] = [
    Permission::ViewService,
    Permission::ViewInstance,
    Permission::ViewDrift,
    Permission::EditService,
    Permission::EditInstance,
    Permission::RestartInstance,
];

/// A global role attached to an actor by the identity layer.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    /// Bypasses the authorization evaluator entirely.
    SysAdmin,
}

/// The acting principal of a request: a user plus resolved team memberships
/// and roles.
///
/// Membership resolution happens upstream (identity-provider sync is outside
/// this plane); the evaluator treats the sets as ground truth for the
/// duration of one request.
#[derive(Clone, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub struct Actor {
    /// The acting user.
    pub user_id: UserId,
    /// Teams the user belongs to.
    pub team_ids: BTreeSet<TeamId>,
    /// Global roles attached to the user.
    pub roles: BTreeSet<Role>,
}

impl Actor {
    /// Build an actor from its parts.
    #[must_use]
    pub fn new(user_id: UserId, team_ids: impl IntoIterator<Item = TeamId>, roles: impl IntoIterator<Item = Role>) -> Self {
        Self {
            user_id,
            team_ids: team_ids.into_iter().collect(),
            roles: roles.into_iter().collect(),
        }
    }

    /// Whether the actor carries the [`Role::SysAdmin`] role.
    #[must_use]
    pub fn is_sys_admin(&self) -> bool {
        self.roles.contains(&Role::SysAdmin)
    }

    /// Whether the actor is a member of `team`.
    #[must_use]
    pub fn in_team(&self, team: &TeamId) -> bool {
        self.team_ids.contains(team)
    }
}
