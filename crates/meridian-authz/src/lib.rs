// SPDX-License-Identifier: Apache-2.0
//! Authorization evaluator for the Meridian control plane.
//!
//! Every read and write funnels through one evaluator answering "may this
//! actor do this action on this resource?". The decision rules run in
//! order, first match wins:
//!
//! 1. `SysAdmin` role → allow anything.
//! 2. Ownership path (resource creator, or member of the owning team) →
//!    allow any action in the owner bundle.
//! 3. Active shares matching the actor, the service, and the requested
//!    environment → allow when the union of their permissions contains
//!    the action.
//! 4. Deny.
//!
//! Listings never re-run per-row authorization. Instead [`AuthzEvaluator::
//! list_scope`] computes the visible service set once per request and the
//! repositories push it down as criteria.

use std::collections::BTreeSet;
use std::sync::Arc;

use tracing::debug;

use meridian_core::{
    codes, Actor, InstanceId, Permission, PlaneError, PlaneResult, ResourceLevel, ServiceId,
    ServiceShare, OWNER_BUNDLE,
};
use meridian_resilience::Clock;
use meridian_store::{AuthScope, ServiceRepository, ShareRepository};

/// One authorization question.
#[derive(Clone, Debug)]
pub struct AccessRequest {
    /// The action being attempted.
    pub action: Permission,
    /// The service the resource belongs to.
    pub service_id: ServiceId,
    /// The specific instance, for instance-scoped actions.
    pub instance_id: Option<InstanceId>,
    /// The environment the action touches, if any.
    pub environment: Option<String>,
}

impl AccessRequest {
    /// A service-scoped request.
    #[must_use]
    pub fn service(action: Permission, service_id: ServiceId) -> Self {
        Self { action, service_id, instance_id: None, environment: None }
    }

    /// Narrow the request to one environment.
    #[must_use]
    pub fn in_environment(mut self, environment: impl Into<String>) -> Self {
        self.environment = Some(environment.into());
        self
    }

    /// Narrow the request to one instance.
    #[must_use]
    pub fn on_instance(mut self, instance_id: InstanceId) -> Self {
        self.instance_id = Some(instance_id);
        self
    }
}

/// The evaluator. Cheap to clone per request via the shared ports.
pub struct AuthzEvaluator {
    services: Arc<dyn ServiceRepository>,
    shares: Arc<dyn ShareRepository>,
    clock: Arc<dyn Clock>,
}

impl AuthzEvaluator {
    /// Build an evaluator over the given ports.
    #[must_use]
    pub fn new(
        services: Arc<dyn ServiceRepository>,
        shares: Arc<dyn ShareRepository>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self { services, shares, clock }
    }

    /// Whether a share applies to this actor and request, right now.
    fn share_applies(&self, share: &ServiceShare, actor: &Actor, request: &AccessRequest) -> bool {
        if share.service_id != request.service_id {
            return false;
        }
        if !share.is_active(self.clock.wall_now()) {
            return false;
        }
        if !share.grants_to(actor) {
            return false;
        }
        if !share.covers_environment(request.environment.as_deref()) {
            return false;
        }
        // An instance-level share only covers its own instance.
        if share.resource_level == ResourceLevel::Instance
            && share.instance_id != request.instance_id
        {
            return false;
        }
        true
    }

    /// Answer one authorization question.
    ///
    /// # Errors
    ///
    /// `NotFound` when the service does not exist; `Forbidden` with code
    /// `ACCESS_DENIED` when every rule falls through.
    pub fn authorize(&self, actor: &Actor, request: &AccessRequest) -> PlaneResult<()> {
        const OP: &str = "authz.authorize";
        if actor.is_sys_admin() {
            return Ok(());
        }
        let Some(service) = self.services.find_by_id(&request.service_id)? else {
            return Err(PlaneError::not_found(
                codes::ENTITY_NOT_FOUND,
                OP,
                format!("service {} does not exist", request.service_id),
            ));
        };
        let is_owner = service.created_by == actor.user_id
            || service
                .owner_team_id
                .as_ref()
                .is_some_and(|team| actor.in_team(team));
        if is_owner && OWNER_BUNDLE.contains(&request.action) {
            return Ok(());
        }
        let granted = self
            .shares
            .find_by_service(&request.service_id)?
            .iter()
            .filter(|share| self.share_applies(share, actor, request))
            .any(|share| share.permissions.contains(&request.action));
        if granted {
            return Ok(());
        }
        debug!(
            user = actor.user_id.as_str(),
            service = request.service_id.as_str(),
            action = ?request.action,
            "access denied"
        );
        Err(PlaneError::forbidden(
            codes::ACCESS_DENIED,
            OP,
            format!(
                "user {} may not {:?} on service {}",
                actor.user_id, request.action, request.service_id
            ),
        ))
    }

    /// The union of everything `actor` may do on `service_id`, for UI
    /// gating and batch authorization.
    pub fn effective_permissions(
        &self,
        actor: &Actor,
        service_id: &ServiceId,
        environment: Option<&str>,
    ) -> PlaneResult<BTreeSet<Permission>> {
        if actor.is_sys_admin() {
            return Ok(OWNER_BUNDLE.into_iter().collect());
        }
        let mut permissions = BTreeSet::new();
        if let Some(service) = self.services.find_by_id(service_id)? {
            let is_owner = service.created_by == actor.user_id
                || service
                    .owner_team_id
                    .as_ref()
                    .is_some_and(|team| actor.in_team(team));
            if is_owner {
                permissions.extend(OWNER_BUNDLE);
            }
        }
        let probe = AccessRequest {
            action: Permission::ViewService,
            service_id: service_id.clone(),
            instance_id: None,
            environment: environment.map(str::to_owned),
        };
        for share in self.shares.find_by_service(service_id)? {
            if self.share_applies(&share, actor, &probe) {
                permissions.extend(share.permissions.iter().copied());
            }
        }
        Ok(permissions)
    }

    /// The service set a listing may reveal, computed once per request.
    ///
    /// Sys-admins bypass filtering entirely; everyone else sees owned
    /// services plus services with at least one live matching share.
    pub fn list_scope(&self, actor: &Actor) -> PlaneResult<AuthScope> {
        if actor.is_sys_admin() {
            return Ok(AuthScope::Unrestricted);
        }
        let mut visible: BTreeSet<ServiceId> = self
            .services
            .find_owned(&actor.user_id, &actor.team_ids)?
            .into_iter()
            .collect();
        let now = self.clock.wall_now();
        for share in self.shares.find_all()? {
            if share.is_active(now) && share.grants_to(actor) {
                visible.insert(share.service_id.clone());
            }
        }
        Ok(AuthScope::ServiceIds(visible))
    }
}
