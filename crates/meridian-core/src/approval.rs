// SPDX-License-Identifier: Apache-2.0
//! Ownership-transfer approval requests and decisions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{codes, PlaneError, PlaneResult};
use crate::ident::{RequestId, ServiceId, TeamId, UserId};

/// A named approval checkpoint with a minimum APPROVE count.
#[derive(Clone, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub struct ApprovalGate {
    /// Gate name, unique within one request's `required` list.
    pub name: String,
    /// Distinct APPROVE decisions needed to pass this gate.
    pub min_approvals: u32,
}

/// Lifecycle state of an [`ApprovalRequest`].
#[derive(Clone, Copy, PartialEq, Eq, Debug, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ApprovalStatus {
    /// Awaiting decisions.
    Pending,
    /// All gates satisfied; the cascade has run.
    Approved,
    /// Rejected by a decision or by the ownership cascade.
    Rejected,
    /// Withdrawn by the requester or a service owner.
    Cancelled,
}

impl ApprovalStatus {
    /// Whether the request can still change state.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        self != Self::Pending
    }
}

/// A request to transfer ownership of a service to another team.
///
/// Invariants
/// - At most one `Pending` request per `{requester_user_id,
///   target_service_id}` pair — enforced transactionally at the repository.
/// - All state transitions go through optimistic concurrency on `version`.
#[derive(Clone, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub struct ApprovalRequest {
    /// Request identity.
    pub id: RequestId,
    /// The service whose ownership would change.
    pub target_service_id: ServiceId,
    /// Candidate new owner.
    pub target_team_id: TeamId,
    /// The requesting user.
    pub requester_user_id: UserId,
    /// The requester's team at creation time.
    pub requester_team_id: Option<TeamId>,
    /// Ordered list of gates that must all pass.
    pub required: Vec<ApprovalGate>,
    /// Current lifecycle state.
    pub status: ApprovalStatus,
    /// Terminal-state reason (set on rejection, cascade, or cancel).
    pub reason: Option<String>,
    /// Free-form note from the requester.
    pub note: Option<String>,
    /// Optimistic-concurrency version; bumped on every persisted write.
    pub version: u64,
    /// Creation instant.
    pub created_at: DateTime<Utc>,
    /// Last mutation instant.
    pub updated_at: DateTime<Utc>,
}

impl ApprovalRequest {
    /// Build a new `Pending` request.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` when `required` is empty or names a gate
    /// twice — a duplicate gate would make its threshold ambiguous.
    pub fn new(
        target_service_id: ServiceId,
        target_team_id: TeamId,
        requester_user_id: UserId,
        requester_team_id: Option<TeamId>,
        required: Vec<ApprovalGate>,
        note: Option<String>,
        now: DateTime<Utc>,
    ) -> PlaneResult<Self> {
        if required.is_empty() {
            return Err(PlaneError::invalid_argument(
                codes::FIELD_INVALID,
                "approval.create",
                "required gates must be non-empty",
            ));
        }
        for (i, gate) in required.iter().enumerate() {
            if gate.name.is_empty() || gate.min_approvals == 0 {
                return Err(PlaneError::invalid_argument(
                    codes::FIELD_INVALID,
                    "approval.create",
                    format!("gate #{i} must have a name and min_approvals >= 1"),
                ));
            }
            if required[..i].iter().any(|g| g.name == gate.name) {
                return Err(PlaneError::invalid_argument(
                    codes::FIELD_INVALID,
                    "approval.create",
                    format!("gate {:?} listed twice", gate.name),
                ));
            }
        }
        Ok(Self {
            id: RequestId::generate(),
            target_service_id,
            target_team_id,
            requester_user_id,
            requester_team_id,
            required,
            status: ApprovalStatus::Pending,
            reason: None,
            note,
            version: 0,
            created_at: now,
            updated_at: now,
        })
    }

    /// Look up a gate by name.
    #[must_use]
    pub fn gate(&self, name: &str) -> Option<&ApprovalGate> {
        self.required.iter().find(|g| g.name == name)
    }
}

/// APPROVE or REJECT.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DecisionKind {
    /// Counts toward the gate's threshold.
    Approve,
    /// Terminates the request immediately (first REJECT wins).
    Reject,
}

/// One actor's vote on one gate of a request.
///
/// Invariant: at most one decision per `{request_id, gate, actor_user_id}` —
/// an actor cannot double-vote on the same gate.
#[derive(Clone, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub struct ApprovalDecision {
    /// Decision identity.
    pub id: Uuid,
    /// The request voted on.
    pub request_id: RequestId,
    /// Name of the gate voted on (member of the request's `required`).
    pub gate: String,
    /// The vote.
    pub decision: DecisionKind,
    /// Voting user.
    pub actor_user_id: UserId,
    /// Voting user's team at decision time.
    pub actor_team_id: Option<TeamId>,
    /// Free-form note from the voter.
    pub note: Option<String>,
    /// Decision instant.
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gates(spec: &[(&str, u32)]) -> Vec<ApprovalGate> {
        spec.iter()
            .map(|(name, min)| ApprovalGate { name: (*name).to_owned(), min_approvals: *min })
            .collect()
    }

    #[test]
    fn rejects_empty_and_duplicate_gates() {
        let svc = ServiceId::parse("svc-x").unwrap();
        let team = TeamId::parse("t1").unwrap();
        let user = UserId::parse("alice").unwrap();
        let now = Utc::now();
        assert!(ApprovalRequest::new(
            svc.clone(), team.clone(), user.clone(), None, vec![], None, now
        )
        .is_err());
        assert!(ApprovalRequest::new(
            svc.clone(), team.clone(), user.clone(), None, gates(&[("g1", 1), ("g1", 2)]), None, now
        )
        .is_err());
        let req = ApprovalRequest::new(
            svc, team, user, None, gates(&[("g1", 1), ("g2", 2)]), None, now
        )
        .unwrap();
        assert_eq!(req.status, ApprovalStatus::Pending);
        assert_eq!(req.gate("g2").map(|g| g.min_approvals), Some(2));
    }
}
