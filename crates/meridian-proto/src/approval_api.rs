// SPDX-License-Identifier: Apache-2.0
//! JSON bodies of the approval surface.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use meridian_core::{
    codes, ApprovalRequest, ApprovalStatus, DecisionKind, PlaneError, PlaneResult,
};

/// `POST /approvals` body.
#[derive(Clone, PartialEq, Eq, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct CreateApprovalBody {
    /// The service whose ownership should change.
    pub service_id: String,
    /// The candidate new owner team.
    pub target_team_id: String,
    /// Free-form note.
    #[serde(default)]
    pub note: Option<String>,
}

/// `POST /approvals/{id}/decisions` body.
#[derive(Clone, PartialEq, Eq, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct DecisionBody {
    /// Gate being voted on.
    pub gate: String,
    /// `APPROVE` or `REJECT`.
    pub decision: String,
    /// Free-form note.
    #[serde(default)]
    pub note: Option<String>,
}

impl DecisionBody {
    /// Parse the decision keyword.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` for anything but `APPROVE` or `REJECT`.
    pub fn decision_kind(&self) -> PlaneResult<DecisionKind> {
        match self.decision.as_str() {
            "APPROVE" => Ok(DecisionKind::Approve),
            "REJECT" => Ok(DecisionKind::Reject),
            other => Err(PlaneError::invalid_argument(
                codes::WIRE_INVALID,
                "approval.decision.parse",
                format!("decision must be APPROVE or REJECT, not {other:?}"),
            )),
        }
    }
}

/// Outbound view of a request.
#[derive(Clone, PartialEq, Eq, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApprovalView {
    /// Request identity.
    pub id: String,
    /// Target service.
    pub service_id: String,
    /// Candidate owner team.
    pub target_team_id: String,
    /// Requesting user.
    pub requester_user_id: String,
    /// Current state.
    pub status: ApprovalStatus,
    /// Terminal-state reason, when settled.
    pub reason: Option<String>,
    /// Creation instant.
    pub created_at: DateTime<Utc>,
    /// Last transition instant.
    pub updated_at: DateTime<Utc>,
}

impl From<&ApprovalRequest> for ApprovalView {
    fn from(request: &ApprovalRequest) -> Self {
        Self {
            id: request.id.to_string(),
            service_id: request.target_service_id.to_string(),
            target_team_id: request.target_team_id.to_string(),
            requester_user_id: request.requester_user_id.to_string(),
            status: request.status,
            reason: request.reason.clone(),
            created_at: request.created_at,
            updated_at: request.updated_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decision_keyword_parsing() {
        let body = DecisionBody { gate: "g1".into(), decision: "APPROVE".into(), note: None };
        assert_eq!(body.decision_kind().unwrap(), DecisionKind::Approve);
        let body = DecisionBody { gate: "g1".into(), decision: "approve".into(), note: None };
        assert!(body.decision_kind().is_err());
    }
}
