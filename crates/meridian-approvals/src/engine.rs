// SPDX-License-Identifier: Apache-2.0
//! The approval engine.

use std::sync::Arc;

use tracing::{info, warn};

use meridian_authz::{AccessRequest, AuthzEvaluator};
use meridian_core::{
    codes, Actor, ApprovalDecision, ApprovalGate, ApprovalRequest, ApprovalStatus, DecisionKind,
    Permission, PlaneError, PlaneResult, RequestId, ServiceId, ServiceLifecycle, TeamId, UserId,
};
use meridian_resilience::Clock;
use meridian_store::{
    ApprovalRepository, DriftRepository, InstanceRepository, ServiceRepository,
};

/// Command to open an ownership-transfer request.
#[derive(Clone, Debug)]
pub struct CreateApproval {
    /// The service whose ownership should change.
    pub service_id: ServiceId,
    /// The candidate new owner.
    pub target_team_id: TeamId,
    /// The requesting user.
    pub requester_user_id: UserId,
    /// The requester's team, for the audit trail.
    pub requester_team_id: Option<TeamId>,
    /// Gates that must all pass.
    pub required: Vec<ApprovalGate>,
    /// Free-form note.
    pub note: Option<String>,
}

/// The approval state machine over its ports.
pub struct ApprovalEngine {
    approvals: Arc<dyn ApprovalRepository>,
    services: Arc<dyn ServiceRepository>,
    instances: Arc<dyn InstanceRepository>,
    drift: Arc<dyn DriftRepository>,
    authz: Arc<AuthzEvaluator>,
    clock: Arc<dyn Clock>,
    max_retries: u32,
}

impl ApprovalEngine {
    /// Wire an engine over the given ports. `max_retries` bounds every
    /// optimistic-concurrency loop in this engine.
    #[must_use]
    pub fn new(
        approvals: Arc<dyn ApprovalRepository>,
        services: Arc<dyn ServiceRepository>,
        instances: Arc<dyn InstanceRepository>,
        drift: Arc<dyn DriftRepository>,
        authz: Arc<AuthzEvaluator>,
        clock: Arc<dyn Clock>,
        max_retries: u32,
    ) -> Self {
        Self {
            approvals,
            services,
            instances,
            drift,
            authz,
            clock,
            max_retries: max_retries.max(1),
        }
    }

    /// Open a new request.
    ///
    /// # Errors
    ///
    /// `NotFound` when the service does not exist, `Conflict` when it is
    /// retired or the requester already has a pending request for it,
    /// `InvalidArgument` when the gate list is empty or malformed.
    pub fn create(&self, command: CreateApproval) -> PlaneResult<ApprovalRequest> {
        const OP: &str = "approval.create";
        let Some(service) = self.services.find_by_id(&command.service_id)? else {
            return Err(PlaneError::not_found(
                codes::ENTITY_NOT_FOUND,
                OP,
                format!("service {} does not exist", command.service_id),
            ));
        };
        if service.lifecycle == ServiceLifecycle::Retired {
            return Err(PlaneError::conflict(
                codes::LIFECYCLE_CONFLICT,
                OP,
                format!("service {} is retired", service.id),
            ));
        }
        let request = ApprovalRequest::new(
            command.service_id,
            command.target_team_id,
            command.requester_user_id,
            command.requester_team_id,
            command.required,
            command.note,
            self.clock.wall_now(),
        )?;
        let stored = self.approvals.insert(request)?;
        info!(request = %stored.id, service = stored.target_service_id.as_str(), "approval request opened");
        Ok(stored)
    }

    /// Record one actor's vote on one gate, then run the evaluator.
    ///
    /// # Errors
    ///
    /// `NotFound` for an unknown request, `Conflict` for a non-pending
    /// request, a double vote, or a lost optimistic race past the retry
    /// bound, `InvalidArgument` for a gate the request does not require.
    pub fn submit_decision(
        &self,
        request_id: &RequestId,
        gate: &str,
        actor_user_id: UserId,
        actor_team_id: Option<TeamId>,
        decision: DecisionKind,
        note: Option<String>,
    ) -> PlaneResult<ApprovalRequest> {
        const OP: &str = "approval.submit_decision";
        let request = self.load_pending(request_id, OP)?;
        if request.gate(gate).is_none() {
            return Err(PlaneError::invalid_argument(
                codes::APPROVAL_UNKNOWN_GATE,
                OP,
                format!("request {} has no gate {gate:?}", request.id),
            ));
        }
        self.approvals.add_decision(ApprovalDecision {
            id: uuid::Uuid::new_v4(),
            request_id: *request_id,
            gate: gate.to_owned(),
            decision,
            actor_user_id,
            actor_team_id,
            note,
            created_at: self.clock.wall_now(),
        })?;
        self.evaluate(request_id)
    }

    /// Withdraw a pending request. Allowed for the requester and for
    /// actors holding owner permission on the target service.
    pub fn cancel(&self, request_id: &RequestId, actor: &Actor) -> PlaneResult<ApprovalRequest> {
        const OP: &str = "approval.cancel";
        let request = self.load_pending(request_id, OP)?;
        if request.requester_user_id != actor.user_id {
            self.authz.authorize(
                actor,
                &AccessRequest::service(Permission::EditService, request.target_service_id.clone()),
            )?;
        }
        self.transition(request_id, ApprovalStatus::Cancelled, || {
            format!("Cancelled by {}", actor.user_id)
        })
    }

    /// Run the evaluator for a request and apply any resulting transition.
    ///
    /// First REJECT wins regardless of gate; otherwise the request is
    /// approved exactly when every gate's distinct APPROVE count has
    /// reached its threshold.
    fn evaluate(&self, request_id: &RequestId) -> PlaneResult<ApprovalRequest> {
        const OP: &str = "approval.evaluate";
        let request = match self.load_pending(request_id, OP) {
            Ok(request) => request,
            // Settled concurrently between our decision and this pass;
            // the recorded decision stands, the settled state wins.
            Err(err) if err.code() == codes::LIFECYCLE_CONFLICT => {
                return self
                    .approvals
                    .find_by_id(request_id)?
                    .ok_or_else(|| missing(request_id, OP));
            }
            Err(err) => return Err(err),
        };
        let decisions = self.approvals.decisions_for(request_id)?;

        if let Some(reject) = decisions
            .iter()
            .filter(|decision| decision.decision == DecisionKind::Reject)
            .min_by_key(|decision| decision.created_at)
        {
            let gate = reject.gate.clone();
            return self.transition(request_id, ApprovalStatus::Rejected, move || {
                format!("Rejected by {gate}")
            });
        }

        let satisfied = request.required.iter().all(|gate| {
            let approvals = decisions
                .iter()
                .filter(|decision| {
                    decision.gate == gate.name && decision.decision == DecisionKind::Approve
                })
                .count();
            u32::try_from(approvals).unwrap_or(u32::MAX) >= gate.min_approvals
        });
        if !satisfied {
            return Ok(request);
        }
        let approved = self.transition(request_id, ApprovalStatus::Approved, || {
            "All gates satisfied".to_owned()
        })?;
        self.cascade(&approved)?;
        Ok(approved)
    }

    /// Apply the knock-on effects of a completed approval.
    fn cascade(&self, approved: &ApprovalRequest) -> PlaneResult<()> {
        let service_id = &approved.target_service_id;
        let new_team = &approved.target_team_id;

        self.assign_owner(service_id, new_team)?;
        let instances = self
            .instances
            .bulk_update_team_id_by_service_id(service_id, Some(new_team))?;
        let events = self
            .drift
            .bulk_update_team_id_by_service_id(service_id, Some(new_team))?;
        info!(
            service = service_id.as_str(),
            team = new_team.as_str(),
            instances,
            drift_events = events,
            "ownership cascade applied"
        );

        for competitor in self.approvals.find_pending_for_service(service_id)? {
            if competitor.id == approved.id {
                continue;
            }
            if competitor.target_team_id == *new_team {
                self.transition(&competitor.id, ApprovalStatus::Approved, || {
                    "Cascade approval: same target team".to_owned()
                })?;
            } else {
                let team = new_team.clone();
                self.transition(&competitor.id, ApprovalStatus::Rejected, move || {
                    format!("Ownership cascade: service now owned by {team}")
                })?;
            }
        }
        Ok(())
    }

    /// Rewrite the service owner under its own optimistic-version loop.
    fn assign_owner(&self, service_id: &ServiceId, new_team: &TeamId) -> PlaneResult<()> {
        const OP: &str = "approval.cascade.owner";
        let mut attempt = 0;
        loop {
            let Some(mut service) = self.services.find_by_id(service_id)? else {
                return Err(PlaneError::not_found(
                    codes::ENTITY_NOT_FOUND,
                    OP,
                    format!("service {service_id} vanished mid-cascade"),
                ));
            };
            service.owner_team_id = Some(new_team.clone());
            service.updated_at = self.clock.wall_now();
            match self.services.save(service) {
                Ok(_) => return Ok(()),
                Err(err) if err.code() == codes::VERSION_CONFLICT && attempt < self.max_retries => {
                    attempt += 1;
                    warn!(service = service_id.as_str(), attempt, "owner write raced; retrying");
                }
                Err(err) => return Err(err),
            }
        }
    }

    /// Move a pending request into a terminal state, retrying lost
    /// optimistic races up to the bound.
    fn transition(
        &self,
        request_id: &RequestId,
        status: ApprovalStatus,
        reason: impl Fn() -> String,
    ) -> PlaneResult<ApprovalRequest> {
        const OP: &str = "approval.transition";
        let mut attempt = 0;
        loop {
            let Some(stored) = self.approvals.find_by_id(request_id)? else {
                return Err(missing(request_id, OP));
            };
            if stored.status != ApprovalStatus::Pending {
                // Someone else settled it first; cascades treat that as done.
                return Ok(stored);
            }
            let mut next = stored.clone();
            next.status = status;
            next.reason = Some(reason());
            next.updated_at = self.clock.wall_now();
            match self.approvals.compare_and_save(next, stored.version) {
                Ok(saved) => {
                    info!(request = %saved.id, status = ?saved.status, "approval transition");
                    return Ok(saved);
                }
                Err(err) if err.code() == codes::VERSION_CONFLICT && attempt < self.max_retries => {
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }

    /// Load a request and require it to be pending.
    fn load_pending(&self, request_id: &RequestId, op: &'static str) -> PlaneResult<ApprovalRequest> {
        let Some(request) = self.approvals.find_by_id(request_id)? else {
            return Err(missing(request_id, op));
        };
        if request.status != ApprovalStatus::Pending {
            return Err(PlaneError::conflict(
                codes::LIFECYCLE_CONFLICT,
                op,
                format!("request {} is {:?}, not pending", request.id, request.status),
            ));
        }
        Ok(request)
    }
}

fn missing(request_id: &RequestId, op: &'static str) -> PlaneError {
    PlaneError::not_found(
        codes::ENTITY_NOT_FOUND,
        op,
        format!("approval request {request_id} does not exist"),
    )
}
